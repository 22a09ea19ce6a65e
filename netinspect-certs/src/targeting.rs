//! Matching a CSR to the connected device that produced it.
//!
//! Every candidate device is checked in its own task. A failing device never
//! aborts the others; its error becomes that device's outcome and the
//! [`decide`] function picks the result once every check has finished.

use futures_util::future::join_all;
use netinspect_common::logging::{Component, Logger};
use netinspect_common::{log_debug, log_warn};
use std::path::Path;
use std::sync::Arc;

use crate::error::{ProvisionError, Result};
use crate::parse;
use crate::transport::{AndroidTransport, IosTransport};
use crate::types::{device_path, ClientOs, DeviceTarget, DEVICE_CSR_FILE};

/// Device id reported for macOS apps
pub const MACOS_DEVICE_ID: &str = "";
/// Device id reported for Windows apps
pub const WINDOWS_DEVICE_ID: &str = "unknown";

/// Result of checking a single candidate device
#[derive(Debug)]
pub enum CandidateOutcome {
    Match,
    /// The device holds a different CSR
    Mismatch { found: String },
    Failed(ProvisionError),
}

#[derive(Debug)]
pub struct CandidateCheck {
    pub device_id: String,
    pub outcome: CandidateOutcome,
}

#[derive(Debug)]
pub enum MatchDecision {
    Matched(String),
    /// Several devices hold the CSR; the first in enumeration order wins
    Ambiguous { chosen: String, matches: Vec<String> },
    NoMatch {
        first_error: Option<ProvisionError>,
        found: Vec<(String, String)>,
    },
}

/// Pick the device for a set of completed checks, in enumeration order
pub fn decide(checks: Vec<CandidateCheck>) -> MatchDecision {
    let mut matches = Vec::new();
    let mut first_error = None;
    let mut found = Vec::new();

    for check in checks {
        match check.outcome {
            CandidateOutcome::Match => matches.push(check.device_id),
            CandidateOutcome::Mismatch { found: csr } => found.push((check.device_id, csr)),
            CandidateOutcome::Failed(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match matches.len() {
        0 => MatchDecision::NoMatch { first_error, found },
        1 => MatchDecision::Matched(matches.remove(0)),
        _ => MatchDecision::Ambiguous {
            chosen: matches[0].clone(),
            matches,
        },
    }
}

/// Finds which connected device an app's CSR came from
#[derive(Clone)]
pub struct DeviceTargetResolver {
    android: Arc<dyn AndroidTransport>,
    ios: Arc<dyn IosTransport>,
    logger: Logger,
}

impl DeviceTargetResolver {
    pub fn new(
        android: Arc<dyn AndroidTransport>,
        ios: Arc<dyn IosTransport>,
        logger: &Logger,
    ) -> Self {
        Self {
            android,
            ios,
            logger: logger.with_component(Component::Targeting),
        }
    }

    pub fn with_session(&self, session_id: &str) -> Self {
        Self {
            logger: self.logger.with_session(session_id),
            ..self.clone()
        }
    }

    /// Device id for the app that submitted `csr`
    pub async fn resolve(
        &self,
        os: ClientOs,
        app_directory: &str,
        app_name: &str,
        csr: &str,
    ) -> Result<String> {
        match os {
            ClientOs::Android => self.resolve_android(app_directory, app_name, csr).await,
            ClientOs::Ios => self.resolve_ios(app_directory, app_name, csr).await,
            ClientOs::MacOs => Ok(MACOS_DEVICE_ID.to_string()),
            ClientOs::Windows => Ok(WINDOWS_DEVICE_ID.to_string()),
        }
    }

    async fn resolve_android(&self, app_directory: &str, app_name: &str, csr: &str) -> Result<String> {
        let devices = self.android.list_online_targets().await?;
        if devices.is_empty() {
            return Err(ProvisionError::NoDevices(ClientOs::Android.to_string()));
        }

        let wanted = parse::sanitize(csr);
        let remote_path = device_path(app_directory, DEVICE_CSR_FILE);
        let tasks = devices.iter().map(|device| {
            let transport = Arc::clone(&self.android);
            let device_id = device.id.clone();
            let app_name = app_name.to_string();
            let remote_path = remote_path.clone();
            let wanted = wanted.clone();
            tokio::spawn(async move {
                match transport.pull(&device_id, &app_name, &remote_path).await {
                    Ok(bytes) => compare(&wanted, &String::from_utf8_lossy(&bytes)),
                    Err(e) => CandidateOutcome::Failed(ProvisionError::DevicePull {
                        device_id,
                        app_name,
                        message: e.to_string(),
                    }),
                }
            })
        });
        let outcomes = join_all(tasks).await;

        let checks = self.collect(&devices, app_name, outcomes);
        self.conclude(checks, app_name, &wanted)
    }

    async fn resolve_ios(&self, app_directory: &str, app_name: &str, csr: &str) -> Result<String> {
        if let Some(simulator) = parse::simulator_device_id(app_directory) {
            log_debug!(self.logger, "Using simulator {simulator} from app directory");
            return Ok(simulator);
        }

        let targets = self.ios.list_targets().await?;
        if targets.is_empty() {
            return Err(ProvisionError::NoDevices(ClientOs::Ios.to_string()));
        }

        let wanted = parse::sanitize(csr);
        let container_path =
            parse::relative_path_in_app_container(&device_path(app_directory, DEVICE_CSR_FILE))?;
        let tasks = targets.iter().map(|target| {
            let transport = Arc::clone(&self.ios);
            let device_id = target.id.clone();
            let app_name = app_name.to_string();
            let container_path = container_path.clone();
            let wanted = wanted.clone();
            tokio::spawn(async move {
                match pull_ios_csr(transport.as_ref(), &device_id, &container_path, &app_name).await {
                    Ok(found) => compare(&wanted, &found),
                    Err(e) => CandidateOutcome::Failed(ProvisionError::DevicePull {
                        device_id,
                        app_name,
                        message: e.to_string(),
                    }),
                }
            })
        });
        let outcomes = join_all(tasks).await;

        let checks = self.collect(&targets, app_name, outcomes);
        self.conclude(checks, app_name, &wanted)
    }

    fn collect(
        &self,
        devices: &[DeviceTarget],
        app_name: &str,
        outcomes: Vec<std::result::Result<CandidateOutcome, tokio::task::JoinError>>,
    ) -> Vec<CandidateCheck> {
        devices
            .iter()
            .zip(outcomes)
            .map(|(device, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    CandidateOutcome::Failed(ProvisionError::DevicePull {
                        device_id: device.id.clone(),
                        app_name: app_name.to_string(),
                        message: format!("check task did not complete: {e}"),
                    })
                });
                if let CandidateOutcome::Failed(e) = &outcome {
                    log_warn!(
                        self.logger,
                        "Unable to check for matching CSR in {}:{app_name}: {e}",
                        device.id
                    );
                }
                CandidateCheck {
                    device_id: device.id.clone(),
                    outcome,
                }
            })
            .collect()
    }

    fn conclude(&self, checks: Vec<CandidateCheck>, app_name: &str, wanted: &str) -> Result<String> {
        match decide(checks) {
            MatchDecision::Matched(device_id) => Ok(device_id),
            MatchDecision::Ambiguous { chosen, matches } => {
                log_warn!(
                    self.logger,
                    "More than one matching device found for CSR: {matches:?}, using {chosen}"
                );
                Ok(chosen)
            }
            MatchDecision::NoMatch {
                first_error: Some(e),
                ..
            } => Err(e),
            MatchDecision::NoMatch {
                first_error: None,
                found,
            } => {
                log_warn!(self.logger, "No matching device found for app: {app_name}");
                log_warn!(self.logger, "Searched CSR: {wanted}");
                for (device_id, csr) in &found {
                    log_warn!(self.logger, "Found CSR on {device_id}: {csr}");
                }
                Err(ProvisionError::NoMatchingDevice(app_name.to_string()))
            }
        }
    }
}

fn compare(wanted: &str, found: &str) -> CandidateOutcome {
    let found = parse::sanitize(found);
    if found == wanted {
        CandidateOutcome::Match
    } else {
        CandidateOutcome::Mismatch { found }
    }
}

/// Pull the CSR from one iOS device into a private temp dir and read it back
async fn pull_ios_csr(
    transport: &dyn IosTransport,
    device_id: &str,
    container_path: &str,
    app_name: &str,
) -> Result<String> {
    let dir = tempfile::Builder::new().prefix("deviceCSR").tempdir()?;
    transport
        .pull(device_id, container_path, app_name, dir.path())
        .await?;
    read_single_file(dir.path()).await
}

async fn read_single_file(dir: &Path) -> Result<String> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        files.push(entry.path());
    }
    match files.as_slice() {
        [file] => Ok(tokio::fs::read_to_string(file).await?),
        [] => Err(ProvisionError::Transport(
            "Failed to pull CSR from device".to_string(),
        )),
        _ => Err(ProvisionError::Transport("Conflict in temp dir".to_string())),
    }
}
