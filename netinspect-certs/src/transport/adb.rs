use async_trait::async_trait;
use netinspect_common::log_warn;
use netinspect_common::logging::{Component, Logger};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use super::{run_tool, AndroidTransport};
use crate::error::{ProvisionError, Result};
use crate::parse;
use crate::types::{ClientOs, DeviceTarget};

const DEVICE_STAGING_DIR: &str = "/data/local/tmp";

/// [`AndroidTransport`] backed by the `adb` executable.
///
/// File access inside the app sandbox goes through `run-as`, which only works
/// for debuggable builds.
#[derive(Debug, Clone)]
pub struct AdbTransport {
    binary: PathBuf,
    logger: Logger,
}

impl AdbTransport {
    pub fn new(binary: impl Into<PathBuf>, logger: &Logger) -> Self {
        Self {
            binary: binary.into(),
            logger: logger.with_component(Component::Transport),
        }
    }

    async fn shell(&self, device_id: &str, command: String, stdin: Option<&[u8]>) -> Result<Vec<u8>> {
        run_tool(&self.binary, ["-s", device_id, "shell", command.as_str()], stdin, &self.logger).await
    }
}

fn checked_path(path: &str) -> Result<&str> {
    if parse::is_shell_safe_path(path) {
        Ok(path)
    } else {
        Err(ProvisionError::Transport(format!(
            "Refusing to pass unsafe path to adb shell: {path}"
        )))
    }
}

fn checked_app(app_name: &str) -> Result<&str> {
    if parse::is_allowed_app_name(app_name) {
        Ok(app_name)
    } else {
        Err(ProvisionError::DisallowedAppName(app_name.to_string()))
    }
}

#[async_trait]
impl AndroidTransport for AdbTransport {
    async fn list_online_targets(&self) -> Result<Vec<DeviceTarget>> {
        let output = run_tool(&self.binary, ["devices"], None, &self.logger).await?;
        Ok(parse::adb_online_devices(&String::from_utf8_lossy(&output))
            .into_iter()
            .map(|serial| DeviceTarget::new(serial, ClientOs::Android))
            .collect())
    }

    async fn pull(&self, device_id: &str, app_name: &str, remote_path: &str) -> Result<Vec<u8>> {
        let app = checked_app(app_name)?;
        let path = checked_path(remote_path)?;
        // exec-out keeps the bytes free of pty line ending translation
        run_tool(
            &self.binary,
            ["-s", device_id, "exec-out", "run-as", app, "cat", path],
            None,
            &self.logger,
        )
        .await
    }

    async fn push(
        &self,
        device_id: &str,
        app_name: &str,
        remote_path: &str,
        contents: &[u8],
    ) -> Result<()> {
        let app = checked_app(app_name)?;
        let path = checked_path(remote_path)?;
        self.shell(
            device_id,
            format!("run-as {app} sh -c 'cat > {path}'"),
            Some(contents),
        )
        .await?;
        Ok(())
    }

    async fn push_file(
        &self,
        device_id: &str,
        app_name: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let app = checked_app(app_name)?;
        let path = checked_path(remote_path)?;
        let file_name = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ProvisionError::Transport(format!("Invalid local path: {}", local_path.display()))
            })?;
        let staged = format!("{DEVICE_STAGING_DIR}/{}", checked_path(file_name)?);

        run_tool(
            &self.binary,
            [
                OsStr::new("-s"),
                OsStr::new(device_id),
                OsStr::new("push"),
                local_path.as_os_str(),
                OsStr::new(&staged),
            ],
            None,
            &self.logger,
        )
        .await?;

        let copied = self
            .shell(device_id, format!("run-as {app} cp {staged} {path}"), None)
            .await;
        // clean up the world-readable copy whether or not run-as succeeded
        if let Err(e) = self.shell(device_id, format!("rm -f {staged}"), None).await {
            log_warn!(
                self.logger,
                "Could not remove {staged} from {device_id}, it stays readable by other apps: {e}"
            );
        }
        copied.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsafe_paths_never_reach_adb() {
        let logger = Logger::new_root(Component::Custom("Tests"), "test");
        // the binary does not exist, so any spawn attempt would surface as a
        // spawn failure instead of the rejection below
        let adb = AdbTransport::new("/nonexistent/adb", &logger);

        let err = adb
            .push("emulator-5554", "com.example.app", "/sdcard/$(reboot)", b"pem")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsafe path"), "{err}");

        let err = adb
            .pull("emulator-5554", "com.example;reboot", "/data/data/x/app.csr")
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::DisallowedAppName(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_cleanup_does_not_fail_the_push() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let binary = dir.path().join("adb");
        std::fs::write(
            &binary,
            "#!/bin/sh\n\
             echo \"$3 $4\" >> \"$(dirname \"$0\")/calls\"\n\
             case \"$4\" in rm*) echo 'rm: Permission denied' >&2; exit 1 ;; esac\n",
        )
        .unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();
        let local = dir.path().join("device.crt");
        std::fs::write(&local, "pem").unwrap();

        let logger = Logger::new_root(Component::Custom("Tests"), "test");
        let adb = AdbTransport::new(&binary, &logger);
        adb.push_file(
            "emulator-5554",
            "com.example.app",
            "/data/data/com.example.app/files/sonar/device.crt",
            &local,
        )
        .await
        .unwrap();

        let calls = std::fs::read_to_string(dir.path().join("calls")).unwrap();
        let calls: Vec<_> = calls.lines().collect();
        assert_eq!(calls.len(), 3, "{calls:?}");
        assert!(calls[0].starts_with("push "));
        assert_eq!(
            calls[1],
            "shell run-as com.example.app cp /data/local/tmp/device.crt \
             /data/data/com.example.app/files/sonar/device.crt"
        );
        assert_eq!(calls[2], "shell rm -f /data/local/tmp/device.crt");
    }

    #[tokio::test]
    async fn missing_binary_is_a_transport_error() {
        let logger = Logger::new_root(Component::Custom("Tests"), "test");
        let adb = AdbTransport::new("/nonexistent/adb", &logger);
        let err = adb.list_online_targets().await.unwrap_err();
        assert!(matches!(err, ProvisionError::Transport(_)));
    }
}
