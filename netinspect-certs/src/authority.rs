//! Certificate authority and server identity lifecycle.
//!
//! The CA and the server certificate are created lazily, validated on every
//! provisioning call and regenerated whenever validation fails. Regeneration
//! is destructive: a new CA invalidates every client certificate issued
//! before it.
//!
//! Two sessions regenerating at the same time both write the fixed store
//! paths; the last writer wins and the loser's client certificate no longer
//! chains to the live CA. Each artifact is still replaced atomically.

use chrono::{DateTime, Utc};
use netinspect_common::logging::{Component, Logger};
use netinspect_common::{log_error, log_info, log_warn};
use rustls_pemfile::{read_all, Item};
use rustls_pki_types::{
    CertificateDer, PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer,
};
use std::path::Path;
use std::sync::Arc;

use crate::config::CertificatePolicy;
use crate::error::{ProvisionError, Result};
use crate::parse;
use crate::store::{Artifact, CertificateStore};
use crate::toolchain::{CryptoToolchain, ToolchainCommand};

/// Subject and expiry of a stored certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    pub expires_at: DateTime<Utc>,
}

/// Server identity bundle for a TLS endpoint that requires client
/// certificates issued by the local CA
#[derive(Clone)]
pub struct SecureServerConfig {
    pub private_key: String,
    pub certificate: String,
    pub ca_certificate: String,
    pub request_client_cert: bool,
    pub reject_unverified_client: bool,
}

impl std::fmt::Debug for SecureServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureServerConfig")
            .field("private_key", &"<redacted>")
            .field("certificate", &self.certificate)
            .field("ca_certificate", &self.ca_certificate)
            .field("request_client_cert", &self.request_client_cert)
            .field("reject_unverified_client", &self.reject_unverified_client)
            .finish()
    }
}

impl SecureServerConfig {
    /// Build a rustls server configuration that only accepts clients holding
    /// a certificate issued by the local CA.
    pub fn to_rustls_server_config(&self) -> Result<rustls::ServerConfig> {
        let chain = pem_certificates(&self.certificate)?;
        let key = pem_private_key(&self.private_key)?;

        let mut roots = rustls::RootCertStore::empty();
        for ca in pem_certificates(&self.ca_certificate)? {
            roots.add(ca)?;
        }

        let builder = rustls::ServerConfig::builder();
        let config = if self.request_client_cert {
            let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots));
            let verifier = if self.reject_unverified_client {
                verifier
            } else {
                verifier.allow_unauthenticated()
            };
            let verifier = verifier
                .build()
                .map_err(|e| ProvisionError::Tls(format!("Failed to build client verifier: {e}")))?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(chain, key)?
        } else {
            builder.with_no_client_auth().with_single_cert(chain, key)?
        };
        Ok(config)
    }
}

fn pem_certificates(pem: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs: Vec<_> = read_all(&mut pem.as_bytes())?
        .into_iter()
        .filter_map(|item| match item {
            Item::X509Certificate(der) => Some(CertificateDer::from(der)),
            _ => None,
        })
        .collect();
    if certs.is_empty() {
        return Err(ProvisionError::Tls("no certificates in PEM".to_string()));
    }
    Ok(certs)
}

fn pem_private_key(pem: &str) -> Result<PrivateKeyDer<'static>> {
    for item in read_all(&mut pem.as_bytes())? {
        match item {
            Item::PKCS8Key(der) => return Ok(PrivatePkcs8KeyDer::from(der).into()),
            Item::RSAKey(der) => return Ok(PrivatePkcs1KeyDer::from(der).into()),
            Item::ECKey(der) => return Ok(PrivateSec1KeyDer::from(der).into()),
            _ => {}
        }
    }
    Err(ProvisionError::Tls("no private key in PEM".to_string()))
}

/// Owns the CA and server artifacts in a [`CertificateStore`]
#[derive(Clone)]
pub struct AuthorityManager {
    store: CertificateStore,
    toolchain: Arc<dyn CryptoToolchain>,
    policy: CertificatePolicy,
    logger: Logger,
}

impl AuthorityManager {
    pub fn new(
        store: CertificateStore,
        toolchain: Arc<dyn CryptoToolchain>,
        policy: CertificatePolicy,
        logger: &Logger,
    ) -> Self {
        Self {
            store,
            toolchain,
            policy,
            logger: logger.with_component(Component::Authority),
        }
    }

    /// Same manager, logging under `session_id`
    pub fn with_session(&self, session_id: &str) -> Self {
        Self {
            logger: self.logger.with_session(session_id),
            ..self.clone()
        }
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    pub fn policy(&self) -> &CertificatePolicy {
        &self.policy
    }

    /// Create the CA if its key is missing, or replace it if the certificate
    /// is unreadable or inside the expiry window.
    pub async fn ensure_certificate_authority_exists(&self) -> Result<()> {
        if !self.store.exists(Artifact::CaKey) {
            return self.generate_certificate_authority().await;
        }
        if let Err(e) = self.check_cert_is_valid(&self.store.path(Artifact::CaCert)).await {
            log_warn!(self.logger, "CA certificate is not valid, regenerating: {e}");
            return self.generate_certificate_authority().await;
        }
        Ok(())
    }

    /// Make sure a valid server certificate issued by the current CA exists.
    pub async fn ensure_server_cert_exists(&self) -> Result<()> {
        if !self.toolchain.is_available().await {
            return Err(ProvisionError::ToolchainUnavailable);
        }

        if !self
            .store
            .all_exist(&[Artifact::ServerKey, Artifact::ServerCert, Artifact::CaCert])
        {
            return self.generate_server_certificate().await;
        }

        let checked = match self
            .check_cert_is_valid(&self.store.path(Artifact::ServerCert))
            .await
        {
            Ok(()) => self.verify_server_cert_issued_by_ca().await,
            Err(e) => Err(e),
        };
        if let Err(e) = checked {
            log_warn!(self.logger, "Not all certs are valid, generating new ones: {e}");
            return self.generate_server_certificate().await;
        }
        Ok(())
    }

    /// Fail unless `file` exists and expires later than the configured
    /// window from now.
    pub async fn check_cert_is_valid(&self, file: &Path) -> Result<()> {
        if !file.is_file() {
            return Err(ProvisionError::CertificateValidation(format!(
                "{} does not exist",
                file.display()
            )));
        }

        let window = self.policy.expiry_window_secs;
        if let Err(e) = self
            .toolchain
            .execute(&ToolchainCommand::CheckEnd {
                cert: file.to_path_buf(),
                seconds: window,
            })
            .await
        {
            log_warn!(self.logger, "Certificate will expire soon: {}", file.display());
            return Err(ProvisionError::CertificateValidation(format!(
                "Certificate will expire soon: {} ({e})",
                file.display()
            )));
        }

        let output = self
            .toolchain
            .execute(&ToolchainCommand::EndDate {
                cert: file.to_path_buf(),
            })
            .await?;
        let expires_at = match parse::end_date(&output) {
            Ok(date) => date,
            Err(e) => {
                log_error!(
                    self.logger,
                    "Cannot parse certificate expiry date. Assuming it has expired."
                );
                return Err(e);
            }
        };

        let threshold = Utc::now() + chrono::Duration::seconds(window as i64);
        if expires_at <= threshold {
            return Err(ProvisionError::CertificateValidation(
                "Certificate has expired or will expire soon.".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn verify_server_cert_issued_by_ca(&self) -> Result<()> {
        let not_issued = || {
            ProvisionError::CertificateValidation(
                "Current server cert was not issued by current CA".to_string(),
            )
        };
        let output = self
            .toolchain
            .execute(&ToolchainCommand::Verify {
                ca_file: self.store.path(Artifact::CaCert),
                cert: self.store.path(Artifact::ServerCert),
            })
            .await
            .map_err(|_| not_issued())?;

        if parse::verify_succeeded(&output) {
            Ok(())
        } else {
            Err(not_issued())
        }
    }

    /// PEM text of the current CA certificate
    pub async fn ca_certificate(&self) -> Result<String> {
        self.store.read_to_string(Artifact::CaCert).await
    }

    pub async fn certificate_info(&self, artifact: Artifact) -> Result<CertificateInfo> {
        let cert = self.store.path(artifact);
        if !cert.is_file() {
            return Err(ProvisionError::CertificateValidation(format!(
                "{} does not exist",
                cert.display()
            )));
        }

        let subject = self
            .toolchain
            .execute(&ToolchainCommand::CertificateSubject { cert: cert.clone() })
            .await?;
        let end = self
            .toolchain
            .execute(&ToolchainCommand::EndDate { cert })
            .await?;

        let subject = subject.trim();
        let subject = subject
            .strip_prefix("subject=")
            .unwrap_or(subject)
            .trim()
            .to_string();
        Ok(CertificateInfo {
            subject,
            expires_at: parse::end_date(&end)?,
        })
    }

    /// Ensure the server identity and return it with the CA certificate
    pub async fn load_secure_server_config(&self) -> Result<SecureServerConfig> {
        self.ensure_certificate_authority_exists().await?;
        self.ensure_server_cert_exists().await?;

        Ok(SecureServerConfig {
            private_key: self.store.read_to_string(Artifact::ServerKey).await?,
            certificate: self.store.read_to_string(Artifact::ServerCert).await?,
            ca_certificate: self.store.read_to_string(Artifact::CaCert).await?,
            request_client_cert: true,
            reject_unverified_client: true,
        })
    }

    async fn generate_certificate_authority(&self) -> Result<()> {
        self.store.ensure_dir().await?;
        log_info!(
            self.logger,
            "Generating new CA in {}",
            self.store.root().display()
        );

        let key = self.store.pending_path(Artifact::CaKey);
        self.toolchain
            .execute(&ToolchainCommand::GenerateKey {
                out: key.clone(),
                bits: self.policy.key_bits,
            })
            .await?;
        self.toolchain
            .execute(&ToolchainCommand::SelfSignedCertificate {
                key,
                subject: self.policy.ca_subject.clone(),
                days: self.policy.ca_validity_days,
                out: self.store.pending_path(Artifact::CaCert),
            })
            .await?;

        self.store.commit(Artifact::CaKey).await?;
        self.store.commit(Artifact::CaCert).await
    }

    async fn generate_server_certificate(&self) -> Result<()> {
        self.ensure_certificate_authority_exists().await?;
        log_info!(self.logger, "Creating new server cert");

        let key = self.store.pending_path(Artifact::ServerKey);
        let csr = self.store.pending_path(Artifact::ServerCsr);
        let cert = self.store.pending_path(Artifact::ServerCert);

        self.toolchain
            .execute(&ToolchainCommand::GenerateKey {
                out: key.clone(),
                bits: self.policy.key_bits,
            })
            .await?;
        self.toolchain
            .execute(&ToolchainCommand::SigningRequest {
                key,
                subject: self.policy.server_subject.clone(),
                out: csr.clone(),
            })
            .await?;
        self.toolchain
            .execute(&ToolchainCommand::SignRequest {
                csr,
                ca_cert: self.store.path(Artifact::CaCert),
                ca_key: self.store.path(Artifact::CaKey),
                serial: self.store.path(Artifact::ServerSerial),
                days: self.policy.server_validity_days,
                out: Some(cert),
            })
            .await?;

        self.store.commit(Artifact::ServerKey).await?;
        self.store.commit(Artifact::ServerCsr).await?;
        self.store.commit(Artifact::ServerCert).await
    }
}
