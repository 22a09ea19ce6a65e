//! Netinspect CLI Library
//!
//! Commands for operating the pairing CA from a terminal: creating the CA
//! and server identity, listing devices and provisioning an app from a CSR
//! file.

pub mod devices;
pub mod ensure;
pub mod provision;
pub mod server_config;

pub use devices::DevicesCommand;
pub use ensure::EnsureCommand;
pub use provision::ProvisionCommand;
pub use server_config::ServerConfigCommand;

use anyhow::{Context, Result};
use netinspect_certs::ProviderConfig;
use std::path::{Path, PathBuf};

/// `~/.config/netinspect`
pub fn default_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("netinspect"))
}

/// Configuration from `config.json` in `config_dir`, defaults when absent
pub fn load_config(config_dir: &Path) -> Result<ProviderConfig> {
    ProviderConfig::load_or_default(config_dir)
        .with_context(|| format!("Failed to load configuration from {config_dir:?}"))
}
