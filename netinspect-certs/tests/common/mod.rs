#![allow(dead_code)]

use async_trait::async_trait;
use netinspect_certs::{
    AndroidTransport, ClientOs, CryptoToolchain, DeviceTarget, HostPlatform, IosTransport,
    NativeToolchain, ProviderConfig, ProvisionError, Result, ToolchainCommand,
};
use netinspect_common::logging::{Component, Logger};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

pub fn test_logger() -> Logger {
    Logger::new_root(Component::Custom("Tests"), "test")
}

/// Config rooted in `dir` with a fixed host platform
pub fn test_config(dir: &TempDir) -> ProviderConfig {
    let mut config = ProviderConfig::with_storage_dir(dir.path().join("certs"));
    config.exchange_dir = dir.path().join("exchange");
    config.host_platform = Some(HostPlatform::Other);
    config.use_native_toolchain = true;
    config
}

/// A CSR as an app would generate it, with `app_name` as the subject CN
pub fn device_csr(app_name: &str) -> String {
    let mut params = rcgen::CertificateParams::new(Vec::<String>::new());
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, app_name);
    let request = rcgen::Certificate::from_params(params).expect("CSR key generation");
    request.serialize_request_pem().expect("CSR serialization")
}

/// Line endings as a Windows-side tool would write them
pub fn with_crlf(pem: &str) -> String {
    format!("{}\r\n", pem.replace('\n', "\r\n"))
}

/// Parse a PEM certificate and return (subject CN, issuer CN)
pub fn subject_and_issuer(pem: &[u8]) -> (String, String) {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem).expect("PEM block");
    let cert = pem.parse_x509().expect("X.509 certificate");
    let cn = |name: &x509_parser::x509::X509Name| {
        name.iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    (cn(cert.subject()), cn(cert.issuer()))
}

/// In-process toolchain that counts executions and can pretend to be
/// missing
#[derive(Default)]
pub struct CountingToolchain {
    inner: NativeToolchain,
    calls: AtomicUsize,
    unavailable: bool,
}

impl CountingToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CryptoToolchain for CountingToolchain {
    async fn execute(&self, command: &ToolchainCommand) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(command).await
    }

    async fn is_available(&self) -> bool {
        !self.unavailable
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pushed {
    pub device_id: String,
    pub app_name: String,
    pub path: String,
    pub contents: Vec<u8>,
    /// Went through a host-side file rather than raw bytes
    pub from_file: bool,
}

/// In-memory Android bridge
#[derive(Default)]
pub struct FakeAndroid {
    devices: Vec<String>,
    files: HashMap<(String, String), Vec<u8>>,
    failing: HashSet<String>,
    pushed: Mutex<Vec<Pushed>>,
    calls: AtomicUsize,
}

impl FakeAndroid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device_id: &str) -> Self {
        self.devices.push(device_id.to_string());
        self
    }

    pub fn with_file(mut self, device_id: &str, path: &str, contents: &str) -> Self {
        self.files.insert(
            (device_id.to_string(), path.to_string()),
            contents.as_bytes().to_vec(),
        );
        self
    }

    /// Every pull from this device fails
    pub fn with_failing_device(mut self, device_id: &str) -> Self {
        self.devices.push(device_id.to_string());
        self.failing.insert(device_id.to_string());
        self
    }

    pub fn pushed(&self) -> Vec<Pushed> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AndroidTransport for FakeAndroid {
    async fn list_online_targets(&self) -> Result<Vec<DeviceTarget>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .devices
            .iter()
            .map(|id| DeviceTarget::new(id.clone(), ClientOs::Android))
            .collect())
    }

    async fn pull(&self, device_id: &str, _app_name: &str, remote_path: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(device_id) {
            return Err(ProvisionError::Transport(format!("{device_id} went offline")));
        }
        self.files
            .get(&(device_id.to_string(), remote_path.to_string()))
            .cloned()
            .ok_or_else(|| ProvisionError::Transport(format!("{remote_path}: No such file")))
    }

    async fn push(
        &self,
        device_id: &str,
        app_name: &str,
        remote_path: &str,
        contents: &[u8],
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pushed.lock().unwrap().push(Pushed {
            device_id: device_id.to_string(),
            app_name: app_name.to_string(),
            path: remote_path.to_string(),
            contents: contents.to_vec(),
            from_file: false,
        });
        Ok(())
    }

    async fn push_file(
        &self,
        device_id: &str,
        app_name: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let contents = std::fs::read(local_path)?;
        self.pushed.lock().unwrap().push(Pushed {
            device_id: device_id.to_string(),
            app_name: app_name.to_string(),
            path: remote_path.to_string(),
            contents,
            from_file: true,
        });
        Ok(())
    }
}

/// In-memory iOS bridge; files are keyed by container-relative path
#[derive(Default)]
pub struct FakeIos {
    targets: Vec<String>,
    files: HashMap<(String, String), Vec<u8>>,
    pushed: Mutex<Vec<Pushed>>,
    calls: AtomicUsize,
}

impl FakeIos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, device_id: &str) -> Self {
        self.targets.push(device_id.to_string());
        self
    }

    pub fn with_file(mut self, device_id: &str, container_path: &str, contents: &str) -> Self {
        self.files.insert(
            (device_id.to_string(), container_path.to_string()),
            contents.as_bytes().to_vec(),
        );
        self
    }

    pub fn pushed(&self) -> Vec<Pushed> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IosTransport for FakeIos {
    async fn list_targets(&self) -> Result<Vec<DeviceTarget>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .targets
            .iter()
            .map(|id| DeviceTarget::new(id.clone(), ClientOs::Ios))
            .collect())
    }

    async fn pull(
        &self,
        device_id: &str,
        container_path: &str,
        _app_name: &str,
        local_dir: &Path,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // idb reports success and copies nothing when the file is absent
        if let Some(contents) = self
            .files
            .get(&(device_id.to_string(), container_path.to_string()))
        {
            let name = container_path.rsplit('/').next().unwrap_or(container_path);
            std::fs::write(local_dir.join(name), contents)?;
        }
        Ok(())
    }

    async fn push(
        &self,
        device_id: &str,
        local_path: &Path,
        app_name: &str,
        container_path: &str,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let contents = std::fs::read(local_path)?;
        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.pushed.lock().unwrap().push(Pushed {
            device_id: device_id.to_string(),
            app_name: app_name.to_string(),
            path: format!("{container_path}{file_name}"),
            contents,
            from_file: true,
        });
        Ok(())
    }
}
