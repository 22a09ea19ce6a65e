//! Netinspect Certs
//!
//! Local certificate authority and device provisioning for the network
//! inspector. The host keeps a private CA and a server identity, signs CSRs
//! written by apps into per-app client certificates and deploys them back
//! to the device the app runs on.
//!
//! ## Key Components
//!
//! - [`CertificateProvider`]: entry point for provisioning calls
//! - [`AuthorityManager`]: CA and server certificate lifecycle
//! - [`CsrProcessor`]: CSR inspection and signing
//! - [`DeviceTargetResolver`]: matching a CSR to a connected device
//! - [`CertificateDeployer`]: per-OS file placement
//! - [`toolchain`] and [`transport`]: `openssl`, `adb` and `idb` adapters

pub mod authority;
pub mod config;
pub mod csr;
pub mod deploy;
pub mod error;
pub mod parse;
pub mod provider;
pub mod store;
pub mod targeting;
pub mod toolchain;
pub mod transport;
pub mod types;

pub use authority::{AuthorityManager, CertificateInfo, SecureServerConfig};
pub use config::{CertificatePolicy, ProviderConfig, MIN_CERT_EXPIRY_WINDOW_SECS};
pub use csr::CsrProcessor;
pub use deploy::CertificateDeployer;
pub use error::{ProvisionError, Result};
pub use provider::{CertificateProvider, ProvisioningSession};
pub use store::{Artifact, CertificateStore};
pub use targeting::DeviceTargetResolver;
pub use toolchain::{CryptoToolchain, NativeToolchain, OpensslCli, ToolchainCommand};
pub use transport::{AdbTransport, AndroidTransport, IdbTransport, IosTransport};
pub use types::{ClientOs, DeviceTarget, ExchangeMedium, HostPlatform, ProvisioningResult};
