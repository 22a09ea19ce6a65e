use netinspect_common::logging::{Component, Logger};
use netinspect_common::log_debug;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

use crate::config::CertificatePolicy;
use crate::error::{ProvisionError, Result};
use crate::parse;
use crate::store::{Artifact, CertificateStore};
use crate::toolchain::{CryptoToolchain, ToolchainCommand};

/// Reads and signs certificate signing requests submitted by apps.
///
/// CSR text only ever touches disk as a [`NamedTempFile`], which is removed
/// when the operation returns, successful or not.
#[derive(Clone)]
pub struct CsrProcessor {
    store: CertificateStore,
    toolchain: Arc<dyn CryptoToolchain>,
    validity_days: u32,
    logger: Logger,
}

impl CsrProcessor {
    pub fn new(
        store: CertificateStore,
        toolchain: Arc<dyn CryptoToolchain>,
        policy: &CertificatePolicy,
        logger: &Logger,
    ) -> Self {
        Self {
            store,
            toolchain,
            validity_days: policy.client_validity_days,
            logger: logger.with_component(Component::Csr),
        }
    }

    pub fn with_session(&self, session_id: &str) -> Self {
        Self {
            logger: self.logger.with_session(session_id),
            ..self.clone()
        }
    }

    pub fn sanitize(csr: &str) -> String {
        parse::sanitize(csr)
    }

    /// App identifier carried in the CSR subject CN
    pub async fn extract_app_name(&self, csr: &str) -> Result<String> {
        let file = write_temp(csr)?;
        let subject = self
            .toolchain
            .execute(&ToolchainCommand::RequestSubject {
                csr: file.path().to_path_buf(),
            })
            .await;
        drop(file);

        let subject = subject?;
        let subject = subject.trim();
        let app_name = parse::subject_common_name(subject)
            .ok_or_else(|| ProvisionError::MissingCommonName(subject.to_string()))?;

        if !parse::is_allowed_app_name(&app_name) {
            return Err(ProvisionError::DisallowedAppName(app_name));
        }
        log_debug!(self.logger, "CSR belongs to {app_name}");
        Ok(app_name)
    }

    /// Sign `csr` with the current CA, returning the client certificate PEM
    pub async fn sign(&self, csr: &str) -> Result<String> {
        let csr = parse::sanitize(csr);
        if csr.is_empty() {
            return Err(ProvisionError::EmptyCsr(None));
        }

        let file = write_temp(&csr)?;
        self.toolchain
            .execute(&ToolchainCommand::SignRequest {
                csr: file.path().to_path_buf(),
                ca_cert: self.store.path(Artifact::CaCert),
                ca_key: self.store.path(Artifact::CaKey),
                serial: self.store.path(Artifact::ServerSerial),
                days: self.validity_days,
                out: None,
            })
            .await
    }
}

fn write_temp(contents: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("deviceCSR")
        .suffix(".csr")
        .tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}
