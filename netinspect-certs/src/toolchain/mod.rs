//! PKI toolchain capability.
//!
//! The provider never touches key material directly: it asks a
//! [`CryptoToolchain`] to run one of a fixed set of [`ToolchainCommand`]s and
//! reads back the textual output, exactly as the `openssl` CLI would print it.

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

use crate::error::Result;

pub mod cli;
pub mod native;

pub use cli::OpensslCli;
pub use native::NativeToolchain;

/// Operations the provider needs from the toolchain, with their named
/// parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainCommand {
    /// `genrsa -out <out> <bits>`
    GenerateKey { out: PathBuf, bits: u32 },
    /// `req -new -x509 -subj <subject> -key <key> -days <days> -out <out>`
    SelfSignedCertificate {
        key: PathBuf,
        subject: String,
        days: u32,
        out: PathBuf,
    },
    /// `req -new -key <key> -subj <subject> -out <out>`
    SigningRequest {
        key: PathBuf,
        subject: String,
        out: PathBuf,
    },
    /// `x509 -req -in <csr> -CA <ca_cert> -CAkey <ca_key> -CAcreateserial
    /// -CAserial <serial> -days <days> [-out <out>]`; prints the PEM when no
    /// output file is given
    SignRequest {
        csr: PathBuf,
        ca_cert: PathBuf,
        ca_key: PathBuf,
        serial: PathBuf,
        days: u32,
        out: Option<PathBuf>,
    },
    /// `x509 -checkend <seconds> -in <cert> -noout`
    CheckEnd { cert: PathBuf, seconds: u64 },
    /// `x509 -enddate -in <cert> -noout`
    EndDate { cert: PathBuf },
    /// `req -in <csr> -noout -subject -nameopt RFC2253`
    RequestSubject { csr: PathBuf },
    /// `x509 -in <cert> -noout -subject -nameopt RFC2253`
    CertificateSubject { cert: PathBuf },
    /// `verify -CAfile <ca_file> <cert>`
    Verify { ca_file: PathBuf, cert: PathBuf },
}

impl ToolchainCommand {
    pub fn subcommand(&self) -> &'static str {
        match self {
            ToolchainCommand::GenerateKey { .. } => "genrsa",
            ToolchainCommand::SelfSignedCertificate { .. }
            | ToolchainCommand::SigningRequest { .. }
            | ToolchainCommand::RequestSubject { .. } => "req",
            ToolchainCommand::SignRequest { .. }
            | ToolchainCommand::CheckEnd { .. }
            | ToolchainCommand::EndDate { .. }
            | ToolchainCommand::CertificateSubject { .. } => "x509",
            ToolchainCommand::Verify { .. } => "verify",
        }
    }

    /// Full `openssl` argument list, subcommand first
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![self.subcommand().into()];
        match self {
            ToolchainCommand::GenerateKey { out, bits } => {
                option(&mut args, "-out", out);
                args.push(bits.to_string().into());
            }
            ToolchainCommand::SelfSignedCertificate {
                key,
                subject,
                days,
                out,
            } => {
                args.push("-new".into());
                args.push("-x509".into());
                args.push("-sha256".into());
                option(&mut args, "-subj", subject);
                option(&mut args, "-key", key);
                option(&mut args, "-days", days.to_string());
                option(&mut args, "-out", out);
            }
            ToolchainCommand::SigningRequest { key, subject, out } => {
                args.push("-new".into());
                option(&mut args, "-key", key);
                option(&mut args, "-subj", subject);
                option(&mut args, "-out", out);
            }
            ToolchainCommand::SignRequest {
                csr,
                ca_cert,
                ca_key,
                serial,
                days,
                out,
            } => {
                args.push("-req".into());
                args.push("-sha256".into());
                option(&mut args, "-in", csr);
                option(&mut args, "-CA", ca_cert);
                option(&mut args, "-CAkey", ca_key);
                args.push("-CAcreateserial".into());
                option(&mut args, "-CAserial", serial);
                option(&mut args, "-days", days.to_string());
                if let Some(out) = out {
                    option(&mut args, "-out", out);
                }
            }
            ToolchainCommand::CheckEnd { cert, seconds } => {
                option(&mut args, "-checkend", seconds.to_string());
                option(&mut args, "-in", cert);
                args.push("-noout".into());
            }
            ToolchainCommand::EndDate { cert } => {
                args.push("-enddate".into());
                option(&mut args, "-in", cert);
                args.push("-noout".into());
            }
            ToolchainCommand::RequestSubject { csr: path }
            | ToolchainCommand::CertificateSubject { cert: path } => {
                option(&mut args, "-in", path);
                args.push("-noout".into());
                args.push("-subject".into());
                option(&mut args, "-nameopt", "RFC2253");
            }
            ToolchainCommand::Verify { ca_file, cert } => {
                option(&mut args, "-CAfile", ca_file);
                args.push(cert.as_os_str().to_os_string());
            }
        }
        args
    }
}

fn option(args: &mut Vec<OsString>, name: &str, value: impl AsRef<OsStr>) {
    args.push(name.into());
    args.push(value.as_ref().to_os_string());
}

/// Executes PKI operations on behalf of the provider
#[async_trait]
pub trait CryptoToolchain: Send + Sync {
    /// Run a command, returning its standard output
    async fn execute(&self, command: &ToolchainCommand) -> Result<String>;

    /// Whether the toolchain can be used at all on this host
    async fn is_available(&self) -> bool;
}
