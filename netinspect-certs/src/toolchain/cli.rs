use async_trait::async_trait;
use netinspect_common::logging::{Component, Logger};
use netinspect_common::log_debug;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::OnceCell;

use super::{CryptoToolchain, ToolchainCommand};
use crate::error::{ProvisionError, Result};

/// Runs commands through the `openssl` executable
///
/// Availability is probed with `openssl version` the first time it is asked
/// for and remembered for the lifetime of the adapter and its clones.
#[derive(Debug, Clone)]
pub struct OpensslCli {
    binary: PathBuf,
    available: Arc<OnceCell<bool>>,
    logger: Logger,
}

impl OpensslCli {
    pub fn new(binary: impl Into<PathBuf>, logger: &Logger) -> Self {
        Self {
            binary: binary.into(),
            available: Arc::new(OnceCell::new()),
            logger: logger.with_component(Component::Toolchain),
        }
    }

    async fn probe(&self) -> bool {
        let status = Command::new(&self.binary)
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            Ok(status) => status.success(),
            Err(e) => {
                log_debug!(self.logger, "{} is not usable: {e}", self.binary.display());
                false
            }
        }
    }
}

#[async_trait]
impl CryptoToolchain for OpensslCli {
    async fn execute(&self, command: &ToolchainCommand) -> Result<String> {
        let subcommand = command.subcommand();
        log_debug!(self.logger, "openssl {:?}", command.args());

        let output = Command::new(&self.binary)
            .args(command.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ProvisionError::Toolchain {
                subcommand,
                message: format!("failed to run {}: {e}", self.binary.display()),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // checkend reports on stdout, everything else on stderr
            let message = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(ProvisionError::Toolchain {
                subcommand,
                message,
            });
        }

        Ok(stdout)
    }

    async fn is_available(&self) -> bool {
        *self.available.get_or_init(|| self.probe()).await
    }
}
