//! Device bridges.
//!
//! Android devices are reached through `adb`, iOS devices and simulators
//! through `idb`. Both are modelled as traits so provisioning can run against
//! in-memory fakes.

use async_trait::async_trait;
use netinspect_common::logging::Logger;
use netinspect_common::log_debug;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{ProvisionError, Result};
use crate::types::DeviceTarget;

pub mod adb;
pub mod idb;

pub use adb::AdbTransport;
pub use idb::IdbTransport;

#[async_trait]
pub trait AndroidTransport: Send + Sync {
    /// Devices currently attached and authorized
    async fn list_online_targets(&self) -> Result<Vec<DeviceTarget>>;

    /// Read a file as the app's user
    async fn pull(&self, device_id: &str, app_name: &str, remote_path: &str) -> Result<Vec<u8>>;

    /// Write a file as the app's user
    async fn push(
        &self,
        device_id: &str,
        app_name: &str,
        remote_path: &str,
        contents: &[u8],
    ) -> Result<()>;

    /// Push a file that already exists on the host
    async fn push_file(
        &self,
        device_id: &str,
        app_name: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let contents = tokio::fs::read(local_path).await?;
        self.push(device_id, app_name, remote_path, &contents).await
    }
}

#[async_trait]
pub trait IosTransport: Send + Sync {
    /// Physical devices and booted simulators
    async fn list_targets(&self) -> Result<Vec<DeviceTarget>>;

    /// Copy `container_path` from the app container into the `local_dir`
    /// directory, keeping its file name
    async fn pull(
        &self,
        device_id: &str,
        container_path: &str,
        app_name: &str,
        local_dir: &Path,
    ) -> Result<()>;

    /// Copy `local_path` into the app container at `container_path`
    async fn push(
        &self,
        device_id: &str,
        local_path: &Path,
        app_name: &str,
        container_path: &str,
    ) -> Result<()>;
}

/// Run a bridge executable to completion, returning its stdout
pub(crate) async fn run_tool<I, S>(
    binary: &Path,
    args: I,
    stdin: Option<&[u8]>,
    logger: &Logger,
) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    log_debug!(logger, "{} {:?}", binary.display(), args);

    let mut child = Command::new(binary)
        .args(&args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ProvisionError::Transport(format!("failed to run {}: {e}", binary.display())))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input).await?;
        pipe.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProvisionError::Transport(format!(
            "{} {:?} exited with {}: {}",
            binary.display(),
            args,
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}
