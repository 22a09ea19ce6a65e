//! Placing certificate files where the app will find them.
//!
//! `WWW` sessions leave files in their own folder under the exchange
//! directory, named after the session id. `FS_ACCESS`
//! sessions write straight into the app directory, except on Android where
//! the app sandbox is only reachable through the device bridge. iOS apps on
//! physical devices report a container path the host cannot write to, so a
//! failed direct write falls back to pushing through the bridge.

use netinspect_common::logging::{Component, Logger};
use netinspect_common::{log_debug, log_info};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::csr::CsrProcessor;
use crate::error::{ProvisionError, Result};
use crate::parse;
use crate::provider::ProvisioningSession;
use crate::targeting::DeviceTargetResolver;
use crate::transport::{AndroidTransport, IosTransport};
use crate::types::{device_path, ClientOs, ExchangeMedium, HostPlatform};

/// Steps of an iOS deployment
#[derive(Debug)]
enum IosDeployment {
    Direct,
    ResolvingFallbackTarget { container_dir: String },
    Staging { device_id: String, container_dir: String },
    Done,
    Failed(ProvisionError),
}

#[derive(Clone)]
pub struct CertificateDeployer {
    android: Arc<dyn AndroidTransport>,
    ios: Arc<dyn IosTransport>,
    csr: Arc<CsrProcessor>,
    resolver: Arc<DeviceTargetResolver>,
    host: HostPlatform,
    exchange_dir: PathBuf,
    logger: Logger,
}

impl CertificateDeployer {
    pub fn new(
        android: Arc<dyn AndroidTransport>,
        ios: Arc<dyn IosTransport>,
        csr: Arc<CsrProcessor>,
        resolver: Arc<DeviceTargetResolver>,
        host: HostPlatform,
        exchange_dir: PathBuf,
        logger: &Logger,
    ) -> Self {
        Self {
            android,
            ios,
            csr,
            resolver,
            host,
            exchange_dir,
            logger: logger.with_component(Component::Deploy),
        }
    }

    /// Same deployer, with it and its lookups logging under `session_id`
    pub fn with_session(&self, session_id: &str) -> Self {
        Self {
            csr: Arc::new(self.csr.with_session(session_id)),
            resolver: Arc::new(self.resolver.with_session(session_id)),
            logger: self.logger.with_session(session_id),
            ..self.clone()
        }
    }

    /// Deploy `file_name` with `contents` for the app behind `session`
    pub async fn deploy(
        &self,
        session: &mut ProvisioningSession,
        file_name: &str,
        contents: &[u8],
    ) -> Result<()> {
        if session.medium() == ExchangeMedium::Www {
            let folder = self.exchange_folder(session);
            return self.write_to_exchange_dir(&folder, file_name, contents).await;
        }

        match session.os() {
            ClientOs::Android => self.deploy_android(session, file_name, contents).await,
            ClientOs::Ios => self.deploy_ios(session, file_name, contents).await,
            os @ (ClientOs::Windows | ClientOs::MacOs) => {
                let destination = device_path(session.app_directory(), file_name);
                tokio::fs::write(&destination, contents)
                    .await
                    .map_err(|source| ProvisionError::Deployment {
                        os: os.to_string(),
                        destination: session.app_directory().to_string(),
                        source,
                    })
            }
        }
    }

    /// Folder a `WWW` session leaves its files in
    pub fn exchange_folder(&self, session: &ProvisioningSession) -> PathBuf {
        self.exchange_dir.join(session.id())
    }

    async fn write_to_exchange_dir(
        &self,
        folder: &Path,
        file_name: &str,
        contents: &[u8],
    ) -> Result<()> {
        let staging_error = |source| ProvisionError::StagingWrite {
            file_name: file_name.to_string(),
            source,
        };
        tokio::fs::create_dir_all(folder)
            .await
            .map_err(staging_error)?;
        let path = folder.join(file_name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(staging_error)?;
        log_debug!(self.logger, "Wrote {} for WWW exchange", path.display());
        Ok(())
    }

    async fn deploy_android(
        &self,
        session: &mut ProvisioningSession,
        file_name: &str,
        contents: &[u8],
    ) -> Result<()> {
        let device_id = session.device_id(&self.csr, &self.resolver).await?;
        let app_name = session.app_name(&self.csr).await?;
        let destination = device_path(session.app_directory(), file_name);

        if self.host == HostPlatform::Windows {
            let local = session.staging_dir()?.join(file_name);
            tokio::fs::write(&local, contents)
                .await
                .map_err(|source| ProvisionError::StagingWrite {
                    file_name: file_name.to_string(),
                    source,
                })?;
            self.android
                .push_file(&device_id, &app_name, &destination, &local)
                .await
        } else {
            self.android
                .push(&device_id, &app_name, &destination, contents)
                .await
        }
    }

    async fn deploy_ios(
        &self,
        session: &mut ProvisioningSession,
        file_name: &str,
        contents: &[u8],
    ) -> Result<()> {
        let mut state = IosDeployment::Direct;
        loop {
            state = match state {
                IosDeployment::Direct => {
                    let destination = device_path(session.app_directory(), file_name);
                    match tokio::fs::write(&destination, contents).await {
                        Ok(()) => IosDeployment::Done,
                        Err(e) => {
                            log_debug!(
                                self.logger,
                                "Direct write to {destination} failed ({e}), pushing through the device bridge"
                            );
                            match parse::relative_path_in_app_container(session.app_directory()) {
                                Ok(container_dir) => {
                                    IosDeployment::ResolvingFallbackTarget { container_dir }
                                }
                                Err(e) => IosDeployment::Failed(e),
                            }
                        }
                    }
                }
                IosDeployment::ResolvingFallbackTarget { container_dir } => {
                    match session.device_id(&self.csr, &self.resolver).await {
                        Ok(device_id) => IosDeployment::Staging {
                            device_id,
                            container_dir,
                        },
                        Err(e) => IosDeployment::Failed(e),
                    }
                }
                IosDeployment::Staging {
                    device_id,
                    container_dir,
                } => match self
                    .push_ios(session, &device_id, &container_dir, file_name, contents)
                    .await
                {
                    Ok(()) => {
                        log_info!(self.logger, "Pushed {file_name} to iOS device {device_id}");
                        IosDeployment::Done
                    }
                    Err(e) => IosDeployment::Failed(e),
                },
                IosDeployment::Done => return Ok(()),
                IosDeployment::Failed(e) => return Err(e),
            };
        }
    }

    async fn push_ios(
        &self,
        session: &mut ProvisioningSession,
        device_id: &str,
        container_dir: &str,
        file_name: &str,
        contents: &[u8],
    ) -> Result<()> {
        let app_name = session.app_name(&self.csr).await?;
        let local = session.staging_dir()?.join(file_name);
        tokio::fs::write(&local, contents)
            .await
            .map_err(|source| ProvisionError::StagingWrite {
                file_name: file_name.to_string(),
                source,
            })?;
        self.ios
            .push(device_id, &local, &app_name, container_dir)
            .await
    }
}
