//! Shared domain types: client operating systems, exchange media and device
//! targets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ProvisionError;

/// CSR file written by the app inside its certificate directory
pub const DEVICE_CSR_FILE: &str = "app.csr";
/// CA certificate deployed next to the CSR
pub const DEVICE_CA_CERT_FILE: &str = "sonarCA.crt";
/// Client certificate deployed next to the CSR
pub const DEVICE_CLIENT_CERT_FILE: &str = "device.crt";

/// Operating system declared by the connecting app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientOs {
    Android,
    #[serde(rename = "iOS")]
    Ios,
    Windows,
    #[serde(rename = "MacOS")]
    MacOs,
}

impl ClientOs {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientOs::Android => "Android",
            ClientOs::Ios => "iOS",
            ClientOs::Windows => "Windows",
            ClientOs::MacOs => "MacOS",
        }
    }
}

impl fmt::Display for ClientOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientOs {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "android" => Ok(ClientOs::Android),
            "ios" => Ok(ClientOs::Ios),
            "windows" => Ok(ClientOs::Windows),
            "macos" => Ok(ClientOs::MacOs),
            _ => Err(ProvisionError::UnsupportedOs(s.to_string())),
        }
    }
}

/// How certificates reach the app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeMedium {
    /// The host writes or pushes files straight into the app's directory
    #[serde(rename = "FS_ACCESS")]
    FsAccess,
    /// Files are staged on the host and fetched by the app
    #[serde(rename = "WWW")]
    Www,
}

impl ExchangeMedium {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeMedium::FsAccess => "FS_ACCESS",
            ExchangeMedium::Www => "WWW",
        }
    }
}

impl fmt::Display for ExchangeMedium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeMedium {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "FS_ACCESS" => Ok(ExchangeMedium::FsAccess),
            "WWW" => Ok(ExchangeMedium::Www),
            _ => Err(ProvisionError::UnsupportedMedium(s.to_string())),
        }
    }
}

/// Platform the host process runs on. Android pushes are staged through a
/// local folder on Windows hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPlatform {
    Windows,
    Other,
}

impl HostPlatform {
    pub fn current() -> Self {
        if cfg!(windows) {
            HostPlatform::Windows
        } else {
            HostPlatform::Other
        }
    }
}

/// A connected device or simulator reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub id: String,
    pub os: ClientOs,
    /// Human readable name when the transport reports one
    pub name: Option<String>,
}

impl DeviceTarget {
    pub fn new(id: impl Into<String>, os: ClientOs) -> Self {
        Self {
            id: id.into(),
            os,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Outcome of a successful provisioning call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningResult {
    pub device_id: String,
    /// Folder holding this session's files when they were exchanged over WWW
    pub exchange_dir: Option<PathBuf>,
}

/// Join a device-declared directory and a file name the way apps report
/// them (directories normally carry a trailing slash).
pub fn device_path(directory: &str, file_name: &str) -> String {
    if directory.is_empty() || directory.ends_with('/') {
        format!("{directory}{file_name}")
    } else {
        format!("{directory}/{file_name}")
    }
}
