use async_trait::async_trait;
use netinspect_common::logging::{Component, Logger};
use netinspect_common::log_warn;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::{run_tool, IosTransport};
use crate::error::Result;
use crate::types::{ClientOs, DeviceTarget};

/// [`IosTransport`] backed by the `idb` client
#[derive(Debug, Clone)]
pub struct IdbTransport {
    binary: PathBuf,
    logger: Logger,
}

/// One line of `idb list-targets --json`
#[derive(Debug, Deserialize)]
struct IdbTarget {
    udid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

impl IdbTransport {
    pub fn new(binary: impl Into<PathBuf>, logger: &Logger) -> Self {
        Self {
            binary: binary.into(),
            logger: logger.with_component(Component::Transport),
        }
    }
}

/// Parse `idb list-targets --json`, which prints one JSON object per line.
/// Shut down simulators are skipped.
fn parse_targets(output: &str, logger: &Logger) -> Vec<DeviceTarget> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<IdbTarget>(line) {
            Ok(target) => Some(target),
            Err(e) => {
                log_warn!(logger, "Ignoring unparseable idb target line {line:?}: {e}");
                None
            }
        })
        .filter(|target| !matches!(target.state.as_deref(), Some("Shutdown")))
        .map(|target| {
            let device = DeviceTarget::new(target.udid, ClientOs::Ios);
            match target.name {
                Some(name) => device.with_name(name),
                None => device,
            }
        })
        .collect()
}

#[async_trait]
impl IosTransport for IdbTransport {
    async fn list_targets(&self) -> Result<Vec<DeviceTarget>> {
        let output = run_tool(&self.binary, ["list-targets", "--json"], None, &self.logger).await?;
        Ok(parse_targets(&String::from_utf8_lossy(&output), &self.logger))
    }

    async fn pull(
        &self,
        device_id: &str,
        container_path: &str,
        app_name: &str,
        local_dir: &Path,
    ) -> Result<()> {
        run_tool(
            &self.binary,
            [
                OsStr::new("file"),
                OsStr::new("pull"),
                OsStr::new("--udid"),
                OsStr::new(device_id),
                OsStr::new("--bundle-id"),
                OsStr::new(app_name),
                OsStr::new(container_path),
                local_dir.as_os_str(),
            ],
            None,
            &self.logger,
        )
        .await?;
        Ok(())
    }

    async fn push(
        &self,
        device_id: &str,
        local_path: &Path,
        app_name: &str,
        container_path: &str,
    ) -> Result<()> {
        run_tool(
            &self.binary,
            [
                OsStr::new("file"),
                OsStr::new("push"),
                OsStr::new("--udid"),
                OsStr::new(device_id),
                OsStr::new("--bundle-id"),
                OsStr::new(app_name),
                local_path.as_os_str(),
                OsStr::new(container_path),
            ],
            None,
            &self.logger,
        )
        .await?;
        Ok(())
    }
}
