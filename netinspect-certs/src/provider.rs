//! Provisioning entry point.
//!
//! [`CertificateProvider::process_certificate_signing_request`] runs one
//! forward pass per call: ensure the CA and server identity, deploy the CA
//! certificate, sign and deploy the client certificate, then report which
//! device the app runs on. Nothing is retried.

use netinspect_common::logging::{Component, Logger};
use netinspect_common::{log_debug, log_info};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use crate::authority::{AuthorityManager, SecureServerConfig};
use crate::config::ProviderConfig;
use crate::csr::CsrProcessor;
use crate::deploy::CertificateDeployer;
use crate::error::{ProvisionError, Result};
use crate::parse;
use crate::store::CertificateStore;
use crate::targeting::DeviceTargetResolver;
use crate::toolchain::{CryptoToolchain, NativeToolchain, OpensslCli};
use crate::transport::{AdbTransport, AndroidTransport, IdbTransport, IosTransport};
use crate::types::{
    ClientOs, ExchangeMedium, ProvisioningResult, DEVICE_CA_CERT_FILE, DEVICE_CLIENT_CERT_FILE,
};

/// State of a single provisioning call.
///
/// The app name and device id are resolved at most once and shared by every
/// deployment step. The staging directory is removed when the session is
/// dropped.
#[derive(Debug)]
pub struct ProvisioningSession {
    id: String,
    csr: String,
    os: ClientOs,
    app_directory: String,
    medium: ExchangeMedium,
    app_name: Option<String>,
    device_id: Option<String>,
    staging: Option<TempDir>,
}

impl ProvisioningSession {
    pub fn new(csr: &str, os: ClientOs, app_directory: &str, medium: ExchangeMedium) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            csr: parse::sanitize(csr),
            os,
            app_directory: app_directory.to_string(),
            medium,
            app_name: None,
            device_id: None,
            staging: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sanitized CSR text
    pub fn csr(&self) -> &str {
        &self.csr
    }

    pub fn os(&self) -> ClientOs {
        self.os
    }

    pub fn app_directory(&self) -> &str {
        &self.app_directory
    }

    pub fn medium(&self) -> ExchangeMedium {
        self.medium
    }

    pub async fn app_name(&mut self, csr: &CsrProcessor) -> Result<String> {
        if let Some(name) = &self.app_name {
            return Ok(name.clone());
        }
        let name = csr.extract_app_name(&self.csr).await?;
        self.app_name = Some(name.clone());
        Ok(name)
    }

    pub async fn device_id(
        &mut self,
        csr: &CsrProcessor,
        resolver: &DeviceTargetResolver,
    ) -> Result<String> {
        if let Some(id) = &self.device_id {
            return Ok(id.clone());
        }
        let app_name = self.app_name(csr).await?;
        let id = resolver
            .resolve(self.os, &self.app_directory, &app_name, &self.csr)
            .await?;
        self.device_id = Some(id.clone());
        Ok(id)
    }

    /// Private host folder for files that are pushed rather than written
    pub fn staging_dir(&mut self) -> Result<&Path> {
        let dir = match self.staging.take() {
            Some(dir) => dir,
            None => tempfile::Builder::new().prefix("netinspect-").tempdir()?,
        };
        Ok(self.staging.insert(dir).path())
    }
}

/// Issues client certificates to apps and places them on their devices
pub struct CertificateProvider {
    toolchain: Arc<dyn CryptoToolchain>,
    authority: AuthorityManager,
    csr: Arc<CsrProcessor>,
    resolver: Arc<DeviceTargetResolver>,
    deployer: CertificateDeployer,
    logger: Logger,
}

impl CertificateProvider {
    pub fn new(
        config: &ProviderConfig,
        toolchain: Arc<dyn CryptoToolchain>,
        android: Arc<dyn AndroidTransport>,
        ios: Arc<dyn IosTransport>,
        logger: &Logger,
    ) -> Self {
        let logger = logger.with_component(Component::Provider);
        let store = CertificateStore::new(&config.storage_dir);
        let policy = config.policy();

        let authority =
            AuthorityManager::new(store.clone(), Arc::clone(&toolchain), policy.clone(), &logger);
        let csr = Arc::new(CsrProcessor::new(
            store,
            Arc::clone(&toolchain),
            &policy,
            &logger,
        ));
        let resolver = Arc::new(DeviceTargetResolver::new(
            Arc::clone(&android),
            Arc::clone(&ios),
            &logger,
        ));
        let deployer = CertificateDeployer::new(
            android,
            ios,
            Arc::clone(&csr),
            Arc::clone(&resolver),
            config.host_platform(),
            config.exchange_dir.clone(),
            &logger,
        );

        Self {
            toolchain,
            authority,
            csr,
            resolver,
            deployer,
            logger,
        }
    }

    /// Provider wired to the `openssl`, `adb` and `idb` adapters named in
    /// `config`
    pub fn from_config(config: &ProviderConfig, logger: &Logger) -> Self {
        let toolchain: Arc<dyn CryptoToolchain> = if config.use_native_toolchain {
            Arc::new(NativeToolchain::new())
        } else {
            Arc::new(OpensslCli::new(&config.openssl_binary, logger))
        };
        let android = Arc::new(AdbTransport::new(&config.adb_binary, logger));
        let ios = Arc::new(IdbTransport::new(&config.idb_binary, logger));
        Self::new(config, toolchain, android, ios, logger)
    }

    pub fn authority(&self) -> &AuthorityManager {
        &self.authority
    }

    pub async fn load_secure_server_config(&self) -> Result<SecureServerConfig> {
        if !self.toolchain.is_available().await {
            return Err(ProvisionError::ToolchainUnavailable);
        }
        self.authority.load_secure_server_config().await
    }

    /// Sign `csr` for the app that wrote it to `app_directory` and deploy the
    /// CA and client certificates back to it.
    pub async fn process_certificate_signing_request(
        &self,
        csr: &str,
        os: ClientOs,
        app_directory: &str,
        medium: ExchangeMedium,
    ) -> Result<ProvisioningResult> {
        let mut session = ProvisioningSession::new(csr, os, app_directory, medium);
        let logger = self.logger.with_session(session.id());

        if session.csr().is_empty() {
            return Err(ProvisionError::EmptyCsr(Some(os)));
        }
        if !self.toolchain.is_available().await {
            return Err(ProvisionError::ToolchainUnavailable);
        }
        log_info!(
            logger,
            "Processing CSR from {os} app in {app_directory} over {medium}"
        );

        let authority = self.authority.with_session(session.id());
        let processor = self.csr.with_session(session.id());
        let resolver = self.resolver.with_session(session.id());
        let deployer = self.deployer.with_session(session.id());

        authority.ensure_certificate_authority_exists().await?;
        authority.ensure_server_cert_exists().await?;

        let ca_certificate = authority.ca_certificate().await?;
        deployer
            .deploy(&mut session, DEVICE_CA_CERT_FILE, ca_certificate.as_bytes())
            .await?;
        log_debug!(logger, "Deployed {DEVICE_CA_CERT_FILE}");

        let client_certificate = processor.sign(session.csr()).await?;
        deployer
            .deploy(&mut session, DEVICE_CLIENT_CERT_FILE, client_certificate.as_bytes())
            .await?;
        log_debug!(logger, "Deployed {DEVICE_CLIENT_CERT_FILE}");

        let app_name = session.app_name(&processor).await?;
        let (device_id, exchange_dir) = match medium {
            ExchangeMedium::FsAccess => (session.device_id(&processor, &resolver).await?, None),
            // the app fetches its folder by the id it is handed back
            ExchangeMedium::Www => (
                session.id().to_string(),
                Some(deployer.exchange_folder(&session)),
            ),
        };

        match &exchange_dir {
            Some(folder) => log_info!(
                logger,
                "Provisioned {app_name}, certificates left in {}",
                folder.display()
            ),
            None => log_info!(logger, "Provisioned {app_name} on device '{device_id}'"),
        }
        Ok(ProvisioningResult {
            device_id,
            exchange_dir,
        })
    }
}
