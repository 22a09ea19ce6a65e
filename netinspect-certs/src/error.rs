use thiserror::Error;

use crate::types::ClientOs;

/// Error types for the netinspect-certs crate
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("It looks like you don't have OpenSSL installed globally. Please install it and add it to Path to continue.")]
    ToolchainUnavailable,

    #[error("Toolchain command '{subcommand}' failed: {message}")]
    Toolchain {
        subcommand: &'static str,
        message: String,
    },

    #[error("Received empty CSR from {}device", .0.map(|os| format!("{os} ")).unwrap_or_default())]
    EmptyCsr(Option<ClientOs>),

    #[error("Cannot extract CN from {0}")]
    MissingCommonName(String),

    #[error("Disallowed app name in CSR: {0}. Only alphanumeric characters and '.' allowed.")]
    DisallowedAppName(String),

    #[error("Certificate validation error: {0}")]
    CertificateValidation(String),

    #[error("Cannot parse certificate expiry date. Assuming it has expired. ({0})")]
    ExpiryParse(String),

    #[error("No {0} devices found")]
    NoDevices(String),

    #[error("No matching device found for app: {0}")]
    NoMatchingDevice(String),

    #[error("Unable to check for matching CSR in {device_id}:{app_name}: {message}")]
    DevicePull {
        device_id: String,
        app_name: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid appDirectory received from {os} device: {destination}: {source}")]
    Deployment {
        os: String,
        destination: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {file_name} to temporary folder. Error: {source}")]
    StagingWrite {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path didn't match expected pattern: {0}")]
    PathPattern(String),

    #[error("Unsupported device os: {0}")]
    UnsupportedOs(String),

    #[error("Unsupported certificate exchange medium: {0}")]
    UnsupportedMedium(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionError::Config(err.to_string())
    }
}

impl From<rustls::Error> for ProvisionError {
    fn from(err: rustls::Error) -> Self {
        ProvisionError::Tls(err.to_string())
    }
}

/// Result type for netinspect-certs operations
pub type Result<T> = std::result::Result<T, ProvisionError>;
