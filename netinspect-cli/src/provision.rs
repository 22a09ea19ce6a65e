//! `netinspect provision`: run one provisioning call for a CSR on disk.

use anyhow::{Context, Result};
use netinspect_certs::{CertificateProvider, ClientOs, ExchangeMedium};
use netinspect_common::logging::Logger;
use netinspect_common::log_info;
use std::path::{Path, PathBuf};

pub struct ProvisionCommand {
    config_dir: PathBuf,
    logger: Logger,
}

impl ProvisionCommand {
    pub fn new(config_dir: PathBuf, logger: &Logger) -> Self {
        Self {
            config_dir,
            logger: logger.clone(),
        }
    }

    pub async fn run(
        &self,
        csr_file: &Path,
        os: ClientOs,
        app_directory: &str,
        medium: ExchangeMedium,
    ) -> Result<()> {
        let csr = tokio::fs::read_to_string(csr_file)
            .await
            .with_context(|| format!("Failed to read CSR from {csr_file:?}"))?;

        let config = crate::load_config(&self.config_dir)?;
        let provider = CertificateProvider::from_config(&config, &self.logger);

        log_info!(self.logger, "Provisioning {os} app at {app_directory}");
        let result = provider
            .process_certificate_signing_request(&csr, os, app_directory, medium)
            .await
            .with_context(|| format!("Failed to provision {os} app at {app_directory}"))?;

        println!("device id: {}", result.device_id);
        if let Some(folder) = &result.exchange_dir {
            println!("certificates staged in {}", folder.display());
        }
        Ok(())
    }
}
