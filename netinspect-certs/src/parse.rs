//! Parsing of toolchain output and device-declared paths.
//!
//! Everything text-shaped that comes back from `openssl` or from a device
//! goes through this module so it can be tested against captured output
//! without running the toolchain.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ProvisionError, Result};

// RFC2253 subjects are printed differently across openssl builds
// ("subject=X" vs "subject= X"), so the CN may follow '=' or ','.
static SUBJECT_CN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[=,]\s*CN=([^,]*)(,.*)?$").expect("static regex"));

static ALLOWED_APP_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("static regex"));

static VERIFY_OK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^:]+: OK").expect("static regex"));

static APP_CONTAINER_RELATIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Application/[^/]+/(.*)").expect("static regex"));

static SIMULATOR_DEVICE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Devices/([^/]+)/").expect("static regex"));

static SHELL_SAFE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_./@+-]+$").expect("static regex"));

const END_DATE_FORMATS: &[&str] = &[
    "%b %d %H:%M:%S %Y",
    "%b %d %H:%M:%S%.f %Y",
    "%Y-%m-%d %H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S",
];

/// Strip carriage returns and surrounding whitespace from a CSR.
///
/// CSR text read back from different devices and toolchains is not
/// byte-identical even when it encodes the same request, so both sides of a
/// comparison must go through this.
pub fn sanitize(csr: &str) -> String {
    csr.replace('\r', "").trim().to_string()
}

/// Extract the Common Name from an `openssl req -subject` line.
pub fn subject_common_name(subject: &str) -> Option<String> {
    SUBJECT_CN
        .captures(subject.trim())
        .and_then(|caps| caps.get(1))
        .map(|cn| cn.as_str().to_string())
}

/// App names end up in device paths and bridge commands, so only word
/// characters, dots and hyphens are accepted.
pub fn is_allowed_app_name(name: &str) -> bool {
    ALLOWED_APP_NAME.is_match(name)
}

/// Parse the output of `openssl x509 -enddate -noout`.
pub fn end_date(output: &str) -> Result<DateTime<Utc>> {
    let trimmed = output.trim();
    let value = trimmed
        .split('=')
        .nth(1)
        .map(str::trim)
        .ok_or_else(|| ProvisionError::ExpiryParse(trimmed.to_string()))?;

    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_zone = normalized
        .strip_suffix(" GMT")
        .or_else(|| normalized.strip_suffix(" UTC"))
        .unwrap_or(&normalized);

    for format in END_DATE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(without_zone, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    Err(ProvisionError::ExpiryParse(trimmed.to_string()))
}

/// Whether `openssl verify` reported the certificate as OK.
pub fn verify_succeeded(output: &str) -> bool {
    VERIFY_OK.is_match(output)
}

/// Path of a file relative to its iOS app container, e.g.
/// `.../Application/<uuid>/Documents/certs` -> `Documents/certs`.
pub fn relative_path_in_app_container(absolute_path: &str) -> Result<String> {
    APP_CONTAINER_RELATIVE
        .captures(absolute_path)
        .and_then(|caps| caps.get(1))
        .map(|rel| rel.as_str().to_string())
        .ok_or_else(|| ProvisionError::PathPattern(absolute_path.to_string()))
}

/// Simulator containers live under `.../Devices/<udid>/...`; physical
/// devices never report such a path.
pub fn simulator_device_id(app_directory: &str) -> Option<String> {
    SIMULATOR_DEVICE
        .captures(app_directory)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
}

/// Device paths are interpolated into `adb shell` command lines, so they may
/// only contain characters the remote shell treats literally.
pub fn is_shell_safe_path(path: &str) -> bool {
    SHELL_SAFE_PATH.is_match(path) && !path.split('/').any(|segment| segment == "..")
}

/// Serials of devices in the `device` state from `adb devices` output.
pub fn adb_online_devices(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}
