//! `netinspect server-config`: check that the server identity can back a
//! mutual-TLS endpoint and print where its files live.

use anyhow::{Context, Result};
use netinspect_certs::{Artifact, CertificateProvider};
use netinspect_common::logging::Logger;
use netinspect_common::log_debug;
use std::path::PathBuf;

pub struct ServerConfigCommand {
    config_dir: PathBuf,
    logger: Logger,
}

impl ServerConfigCommand {
    pub fn new(config_dir: PathBuf, logger: &Logger) -> Self {
        Self {
            config_dir,
            logger: logger.clone(),
        }
    }

    pub async fn run(&self, print_ca: bool) -> Result<()> {
        let config = crate::load_config(&self.config_dir)?;
        let provider = CertificateProvider::from_config(&config, &self.logger);

        let bundle = provider
            .load_secure_server_config()
            .await
            .context("Failed to load the server identity")?;
        bundle
            .to_rustls_server_config()
            .context("Server identity is not usable for TLS")?;
        log_debug!(self.logger, "rustls accepted the server identity");

        let store = provider.authority().store();
        println!("key:  {}", store.path(Artifact::ServerKey).display());
        println!("cert: {}", store.path(Artifact::ServerCert).display());
        println!("ca:   {}", store.path(Artifact::CaCert).display());
        println!(
            "client certificates: requested={} required={}",
            bundle.request_client_cert, bundle.reject_unverified_client
        );
        if print_ca {
            print!("{}", bundle.ca_certificate);
        }
        Ok(())
    }
}
