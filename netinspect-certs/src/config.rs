//! Provider configuration
//!
//! Loaded from `config.json` in the config directory. Every field has a
//! default so a missing or partial file still yields a working provider.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};
use crate::types::HostPlatform;

const CONFIG_FILE: &str = "config.json";

/// Certificates expiring within this many seconds are treated as invalid
pub const MIN_CERT_EXPIRY_WINDOW_SECS: u64 = 24 * 60 * 60;

/// Runtime configuration for the certificate provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Directory holding the CA and server artifacts
    pub storage_dir: PathBuf,
    /// `openssl` executable used by the CLI toolchain
    pub openssl_binary: PathBuf,
    /// Use the in-process toolchain instead of spawning `openssl`
    pub use_native_toolchain: bool,
    /// `adb` executable for Android devices
    pub adb_binary: PathBuf,
    /// `idb` executable for iOS devices
    pub idb_binary: PathBuf,
    /// Overrides host platform detection
    pub host_platform: Option<HostPlatform>,
    /// Where certificates exchanged over WWW are left for the app to fetch
    pub exchange_dir: PathBuf,
    pub ca_subject: String,
    pub server_subject: String,
    pub key_bits: u32,
    pub ca_validity_days: u32,
    pub server_validity_days: u32,
    pub client_validity_days: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            openssl_binary: PathBuf::from("openssl"),
            use_native_toolchain: false,
            adb_binary: PathBuf::from("adb"),
            idb_binary: PathBuf::from("idb"),
            host_platform: None,
            exchange_dir: std::env::temp_dir().join("certs"),
            ca_subject: "/C=US/ST=CA/O=Netinspect/CN=NetinspectCA".to_string(),
            server_subject: "/C=US/ST=CA/O=Netinspect/CN=localhost".to_string(),
            key_bits: 2048,
            ca_validity_days: 365,
            server_validity_days: 365,
            client_validity_days: 365,
        }
    }
}

impl ProviderConfig {
    /// Configuration rooted at a specific storage directory
    pub fn with_storage_dir(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `config.json` in `config_dir`
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_file = config_dir.join(CONFIG_FILE);

        if !config_file.exists() {
            return Err(ProvisionError::Config(format!(
                "Configuration file not found: {config_file:?}"
            )));
        }

        let content = std::fs::read_to_string(&config_file)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration if present, defaults otherwise
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        if Self::exists(config_dir) {
            Self::load(config_dir)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `config.json` in `config_dir`
    pub fn save(&self, config_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(config_dir)?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_dir.join(CONFIG_FILE), content)?;
        Ok(())
    }

    /// Check if a configuration file exists
    pub fn exists(config_dir: &Path) -> bool {
        config_dir.join(CONFIG_FILE).exists()
    }

    pub fn host_platform(&self) -> HostPlatform {
        self.host_platform.unwrap_or_else(HostPlatform::current)
    }

    pub fn policy(&self) -> CertificatePolicy {
        CertificatePolicy {
            ca_subject: self.ca_subject.clone(),
            server_subject: self.server_subject.clone(),
            key_bits: self.key_bits,
            ca_validity_days: self.ca_validity_days,
            server_validity_days: self.server_validity_days,
            client_validity_days: self.client_validity_days,
            expiry_window_secs: MIN_CERT_EXPIRY_WINDOW_SECS,
        }
    }
}

/// Subjects, key sizes and lifetimes used when issuing certificates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePolicy {
    pub ca_subject: String,
    pub server_subject: String,
    pub key_bits: u32,
    pub ca_validity_days: u32,
    pub server_validity_days: u32,
    pub client_validity_days: u32,
    pub expiry_window_secs: u64,
}

impl Default for CertificatePolicy {
    fn default() -> Self {
        ProviderConfig::default().policy()
    }
}

/// `$HOME/.config/netinspect/certs`, or a relative fallback without a home
pub fn default_storage_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("netinspect")
        .join("certs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_file_falls_back_to_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "adb_binary": "/opt/android/platform-tools/adb", "host_platform": "windows" }"#,
        )
        .unwrap();

        let config = ProviderConfig::load(dir.path()).unwrap();
        assert_eq!(
            config.adb_binary,
            PathBuf::from("/opt/android/platform-tools/adb")
        );
        assert_eq!(config.host_platform(), HostPlatform::Windows);
        assert_eq!(config.key_bits, 2048);
        assert_eq!(config.policy().expiry_window_secs, 86_400);
    }

    #[test]
    fn save_then_load_keeps_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = ProviderConfig::with_storage_dir(dir.path().join("certs"));
        config.use_native_toolchain = true;
        config.save(dir.path()).unwrap();

        assert!(ProviderConfig::exists(dir.path()));
        let loaded = ProviderConfig::load(dir.path()).unwrap();
        assert!(loaded.use_native_toolchain);
        assert_eq!(loaded.storage_dir, dir.path().join("certs"));
    }

    #[test]
    fn missing_config_is_an_error_for_load_only() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            ProviderConfig::load(dir.path()),
            Err(ProvisionError::Config(_))
        ));
        assert!(ProviderConfig::load_or_default(dir.path()).is_ok());
    }
}
