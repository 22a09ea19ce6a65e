//! `netinspect ensure`: create or repair the CA and server identity.

use anyhow::{Context, Result};
use netinspect_certs::{Artifact, CertificateProvider, ProviderConfig};
use netinspect_common::logging::Logger;
use netinspect_common::log_info;
use std::path::PathBuf;

pub struct EnsureCommand {
    config_dir: PathBuf,
    logger: Logger,
}

impl EnsureCommand {
    pub fn new(config_dir: PathBuf, logger: &Logger) -> Self {
        Self {
            config_dir,
            logger: logger.clone(),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let config = crate::load_config(&self.config_dir)?;
        if !ProviderConfig::exists(&self.config_dir) {
            config
                .save(&self.config_dir)
                .with_context(|| format!("Failed to save configuration to {:?}", self.config_dir))?;
            log_info!(self.logger, "Wrote default configuration to {:?}", self.config_dir);
        }

        let provider = CertificateProvider::from_config(&config, &self.logger);
        let authority = provider.authority();
        authority
            .ensure_certificate_authority_exists()
            .await
            .context("Failed to set up the certificate authority")?;
        authority
            .ensure_server_cert_exists()
            .await
            .context("Failed to set up the server certificate")?;

        for artifact in [Artifact::CaCert, Artifact::ServerCert] {
            let info = authority
                .certificate_info(artifact)
                .await
                .with_context(|| format!("Failed to read {}", artifact.file_name()))?;
            println!(
                "{}: {} (expires {})",
                authority.store().path(artifact).display(),
                info.subject,
                info.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Ok(())
    }
}
