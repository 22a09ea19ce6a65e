//! In-process toolchain built on the `openssl` crate.
//!
//! Produces the same files and the same stdout text as the `openssl` CLI for
//! every [`ToolchainCommand`], so it can stand in for [`super::OpensslCli`]
//! on hosts without the executable.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::x509::extension::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509NameRef, X509Req, X509ReqBuilder, X509StoreContext, X509};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{CryptoToolchain, ToolchainCommand};
use crate::error::{ProvisionError, Result};

#[derive(Debug, thiserror::Error)]
enum NativeError {
    #[error(transparent)]
    Ssl(#[from] ErrorStack),
    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Failed(String),
}

type NativeResult<T> = std::result::Result<T, NativeError>;

/// Toolchain that never spawns a process
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeToolchain;

impl NativeToolchain {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CryptoToolchain for NativeToolchain {
    async fn execute(&self, command: &ToolchainCommand) -> Result<String> {
        let subcommand = command.subcommand();
        let command = command.clone();
        // Key generation is CPU bound
        let outcome = tokio::task::spawn_blocking(move || run(&command))
            .await
            .map_err(|e| ProvisionError::Toolchain {
                subcommand,
                message: e.to_string(),
            })?;
        outcome.map_err(|e| ProvisionError::Toolchain {
            subcommand,
            message: e.to_string(),
        })
    }

    async fn is_available(&self) -> bool {
        true
    }
}

fn run(command: &ToolchainCommand) -> NativeResult<String> {
    match command {
        ToolchainCommand::GenerateKey { out, bits } => generate_key(out, *bits),
        ToolchainCommand::SelfSignedCertificate {
            key,
            subject,
            days,
            out,
        } => self_signed_certificate(key, subject, *days, out),
        ToolchainCommand::SigningRequest { key, subject, out } => {
            signing_request(key, subject, out)
        }
        ToolchainCommand::SignRequest {
            csr,
            ca_cert,
            ca_key,
            serial,
            days,
            out,
        } => sign_request(csr, ca_cert, ca_key, serial, *days, out.as_deref()),
        ToolchainCommand::CheckEnd { cert, seconds } => check_end(cert, *seconds),
        ToolchainCommand::EndDate { cert } => {
            let cert = X509::from_pem(&read(cert)?)?;
            Ok(format!("notAfter={}\n", cert.not_after()))
        }
        ToolchainCommand::RequestSubject { csr } => {
            let req = X509Req::from_pem(&read(csr)?)?;
            Ok(format!("subject={}\n", rfc2253(req.subject_name())?))
        }
        ToolchainCommand::CertificateSubject { cert } => {
            let cert = X509::from_pem(&read(cert)?)?;
            Ok(format!("subject={}\n", rfc2253(cert.subject_name())?))
        }
        ToolchainCommand::Verify { ca_file, cert } => verify(ca_file, cert),
    }
}

fn generate_key(out: &Path, bits: u32) -> NativeResult<String> {
    let key = PKey::from_rsa(Rsa::generate(bits)?)?;
    write(out, &key.private_key_to_pem_pkcs8()?)?;
    Ok(String::new())
}

fn self_signed_certificate(
    key: &Path,
    subject: &str,
    days: u32,
    out: &Path,
) -> NativeResult<String> {
    let key = read_private_key(key)?;
    let name = slash_subject(subject)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&*random_serial()?.to_asn1_integer()?)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    builder.set_not_before(&*Asn1Time::days_from_now(0)?)?;
    builder.set_not_after(&*Asn1Time::days_from_now(days)?)?;
    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .key_cert_sign()
            .crl_sign()
            .digital_signature()
            .build()?,
    )?;
    let key_id = SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
    builder.append_extension(key_id)?;
    builder.sign(&key, MessageDigest::sha256())?;

    write(out, &builder.build().to_pem()?)?;
    Ok(String::new())
}

fn signing_request(key: &Path, subject: &str, out: &Path) -> NativeResult<String> {
    let key = read_private_key(key)?;
    let name = slash_subject(subject)?;

    let mut builder = X509ReqBuilder::new()?;
    builder.set_version(0)?;
    builder.set_subject_name(&name)?;
    builder.set_pubkey(&key)?;
    builder.sign(&key, MessageDigest::sha256())?;

    write(out, &builder.build().to_pem()?)?;
    Ok(String::new())
}

fn sign_request(
    csr: &Path,
    ca_cert: &Path,
    ca_key: &Path,
    serial: &Path,
    days: u32,
    out: Option<&Path>,
) -> NativeResult<String> {
    let req = X509Req::from_pem(&read(csr)?)?;
    let req_key = req.public_key()?;
    if !req.verify(&req_key)? {
        return Err(NativeError::Failed(
            "Certificate request self-signature did not match".to_string(),
        ));
    }

    let ca = X509::from_pem(&read(ca_cert)?)?;
    let ca_key = read_private_key(ca_key)?;
    let serial_number = next_serial(serial)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&*serial_number.to_asn1_integer()?)?;
    builder.set_subject_name(req.subject_name())?;
    builder.set_issuer_name(ca.subject_name())?;
    builder.set_pubkey(&req_key)?;
    builder.set_not_before(&*Asn1Time::days_from_now(0)?)?;
    builder.set_not_after(&*Asn1Time::days_from_now(days)?)?;
    builder.append_extension(
        KeyUsage::new()
            .digital_signature()
            .key_encipherment()
            .build()?,
    )?;
    builder.append_extension(
        ExtendedKeyUsage::new()
            .server_auth()
            .client_auth()
            .build()?,
    )?;
    builder.sign(&ca_key, MessageDigest::sha256())?;

    let pem = builder.build().to_pem()?;
    match out {
        Some(path) => {
            write(path, &pem)?;
            Ok(String::new())
        }
        None => String::from_utf8(pem)
            .map_err(|e| NativeError::Failed(format!("certificate PEM is not UTF-8: {e}"))),
    }
}

fn check_end(cert: &Path, seconds: u64) -> NativeResult<String> {
    let cert = X509::from_pem(&read(cert)?)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| NativeError::Failed(e.to_string()))?
        .as_secs();
    let threshold = Asn1Time::from_unix((now + seconds) as _)?;

    match cert.not_after().compare(&threshold)? {
        Ordering::Greater => Ok("Certificate will not expire\n".to_string()),
        _ => Err(NativeError::Failed("Certificate will expire".to_string())),
    }
}

fn verify(ca_file: &Path, cert: &Path) -> NativeResult<String> {
    let ca = X509::from_pem(&read(ca_file)?)?;
    let leaf = X509::from_pem(&read(cert)?)?;

    let mut store = X509StoreBuilder::new()?;
    store.add_cert(ca)?;
    let store = store.build();
    let chain: Stack<X509> = Stack::new()?;

    let mut context = X509StoreContext::new()?;
    let (verified, result) = context.init(&store, &leaf, &chain, |ctx| {
        let verified = ctx.verify_cert()?;
        Ok((verified, ctx.error()))
    })?;

    if verified {
        Ok(format!("{}: OK\n", cert.display()))
    } else {
        Err(NativeError::Failed(format!(
            "{}: verification failed: {}",
            cert.display(),
            result.error_string()
        )))
    }
}

// Sessions signing at the same time share one serial file
static SERIAL_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

// The serial file holds the last serial issued, in hex
fn next_serial(serial: &Path) -> NativeResult<BigNum> {
    let _guard = SERIAL_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let current = match std::fs::read_to_string(serial) {
        Ok(text) => BigNum::from_hex_str(text.trim())?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => random_serial()?,
        Err(source) => {
            return Err(NativeError::File {
                path: serial.to_path_buf(),
                source,
            })
        }
    };
    let mut next = BigNum::new()?;
    next.checked_add(&current, &*BigNum::from_u32(1)?)?;
    write(serial, format!("{}\n", &*next.to_hex_str()?).as_bytes())?;
    Ok(next)
}

fn random_serial() -> NativeResult<BigNum> {
    let mut serial = BigNum::new()?;
    serial.rand(64, MsbOption::MAYBE_ZERO, false)?;
    Ok(serial)
}

/// Parse an openssl `-subj` string such as `/C=US/O=Example/CN=localhost`
fn slash_subject(subject: &str) -> NativeResult<X509Name> {
    let mut builder = X509NameBuilder::new()?;
    for component in subject.split('/').filter(|c| !c.is_empty()) {
        let (field, value) = component.split_once('=').ok_or_else(|| {
            NativeError::Failed(format!("malformed subject component '{component}' in {subject}"))
        })?;
        builder.append_entry_by_text(field.trim(), value.trim())?;
    }
    Ok(builder.build())
}

/// Render a name the way `-nameopt RFC2253` does: most specific RDN first
fn rfc2253(name: &X509NameRef) -> NativeResult<String> {
    let mut parts = Vec::new();
    for entry in name.entries() {
        let field = entry.object().nid().short_name()?;
        let value = entry.data().as_utf8()?;
        parts.push(format!("{}={}", field, escape_rfc2253(&value)));
    }
    parts.reverse();
    Ok(parts.join(","))
}

fn escape_rfc2253(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let special = matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (i == 0 && (c == '#' || c == ' '))
            || (i == last && c == ' ');
        if special {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn read_private_key(path: &Path) -> NativeResult<PKey<Private>> {
    Ok(PKey::private_key_from_pem(&read(path)?)?)
}

fn read(path: &Path) -> NativeResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| NativeError::File {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, contents: &[u8]) -> NativeResult<()> {
    std::fs::write(path, contents).map_err(|source| NativeError::File {
        path: path.to_path_buf(),
        source,
    })
}
