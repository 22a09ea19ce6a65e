//! CA and server identity lifecycle against a real (in-process) toolchain.

mod common;

use async_trait::async_trait;
use common::{subject_and_issuer, test_config, test_logger, CountingToolchain};
use netinspect_certs::{
    Artifact, AuthorityManager, CertificatePolicy, CertificateStore, CryptoToolchain,
    NativeToolchain, ProvisionError, Result, ToolchainCommand, MIN_CERT_EXPIRY_WINDOW_SECS,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Passes `-checkend` and reports a fixed `-enddate`, running everything
/// else for real
struct FixedEndDate {
    inner: NativeToolchain,
    end_date: String,
}

#[async_trait]
impl CryptoToolchain for FixedEndDate {
    async fn execute(&self, command: &ToolchainCommand) -> Result<String> {
        match command {
            ToolchainCommand::CheckEnd { .. } => Ok("Certificate will not expire\n".to_string()),
            ToolchainCommand::EndDate { .. } => Ok(self.end_date.clone()),
            other => self.inner.execute(other).await,
        }
    }

    async fn is_available(&self) -> bool {
        true
    }
}

fn manager_reporting(dir: &TempDir, end_date: String) -> AuthorityManager {
    let config = test_config(dir);
    AuthorityManager::new(
        CertificateStore::new(&config.storage_dir),
        Arc::new(FixedEndDate {
            inner: NativeToolchain::new(),
            end_date,
        }),
        CertificatePolicy::default(),
        &test_logger(),
    )
}

fn manager(dir: &TempDir, policy: CertificatePolicy) -> AuthorityManager {
    let config = test_config(dir);
    AuthorityManager::new(
        CertificateStore::new(&config.storage_dir),
        Arc::new(CountingToolchain::new()),
        policy,
        &test_logger(),
    )
}

fn parse_cert(pem: &[u8]) -> x509_parser::pem::Pem {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem).expect("PEM block");
    pem
}

#[tokio::test]
async fn fresh_ca_is_self_signed_and_outlives_the_window() {
    let dir = TempDir::new().unwrap();
    let authority = manager(&dir, CertificatePolicy::default());

    authority.ensure_certificate_authority_exists().await.unwrap();

    let pem = authority.store().read(Artifact::CaCert).await.unwrap();
    let pem = parse_cert(&pem);
    let cert = pem.parse_x509().unwrap();
    assert_eq!(cert.subject().to_string(), cert.issuer().to_string());
    cert.verify_signature(None).expect("CA is signed by its own key");

    let now = chrono::Utc::now().timestamp();
    assert!(cert.validity().not_after.timestamp() > now + MIN_CERT_EXPIRY_WINDOW_SECS as i64);

    authority
        .check_cert_is_valid(&authority.store().path(Artifact::CaCert))
        .await
        .unwrap();
}

#[tokio::test]
async fn existing_valid_ca_is_kept() {
    let dir = TempDir::new().unwrap();
    let authority = manager(&dir, CertificatePolicy::default());

    authority.ensure_certificate_authority_exists().await.unwrap();
    let first = authority.ca_certificate().await.unwrap();
    authority.ensure_certificate_authority_exists().await.unwrap();
    assert_eq!(first, authority.ca_certificate().await.unwrap());
}

#[tokio::test]
async fn expiring_ca_is_regenerated() {
    let dir = TempDir::new().unwrap();
    let short_lived = CertificatePolicy {
        ca_validity_days: 0,
        ..CertificatePolicy::default()
    };
    let authority = manager(&dir, short_lived);
    authority.ensure_certificate_authority_exists().await.unwrap();

    let ca_path = authority.store().path(Artifact::CaCert);
    let err = authority.check_cert_is_valid(&ca_path).await.unwrap_err();
    assert!(
        err.to_string().contains("Certificate will expire soon"),
        "{err}"
    );
    let stale = authority.ca_certificate().await.unwrap();

    let authority = manager(&dir, CertificatePolicy::default());
    authority.ensure_certificate_authority_exists().await.unwrap();
    assert_ne!(stale, authority.ca_certificate().await.unwrap());
    authority.check_cert_is_valid(&ca_path).await.unwrap();
}

#[tokio::test]
async fn end_date_inside_the_window_is_rejected() {
    let dir = TempDir::new().unwrap();
    manager(&dir, CertificatePolicy::default())
        .ensure_certificate_authority_exists()
        .await
        .unwrap();

    let soon = chrono::Utc::now() + chrono::Duration::hours(1);
    let authority = manager_reporting(&dir, format!("notAfter={}\n", soon.format("%b %d %H:%M:%S %Y GMT")));
    let ca_path = authority.store().path(Artifact::CaCert);
    let err = authority.check_cert_is_valid(&ca_path).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Certificate validation error: Certificate has expired or will expire soon."
    );

    let stale = authority.ca_certificate().await.unwrap();
    authority.ensure_certificate_authority_exists().await.unwrap();
    assert_ne!(stale, authority.ca_certificate().await.unwrap());
}

#[tokio::test]
async fn unreadable_end_date_counts_as_expired() {
    let dir = TempDir::new().unwrap();
    manager(&dir, CertificatePolicy::default())
        .ensure_certificate_authority_exists()
        .await
        .unwrap();

    let authority = manager_reporting(&dir, "notAfter=garbage\n".to_string());
    let ca_path = authority.store().path(Artifact::CaCert);
    let err = authority.check_cert_is_valid(&ca_path).await.unwrap_err();
    assert!(matches!(err, ProvisionError::ExpiryParse(ref output) if output == "notAfter=garbage"), "{err}");

    let stale = authority.ca_certificate().await.unwrap();
    authority.ensure_certificate_authority_exists().await.unwrap();
    assert_ne!(stale, authority.ca_certificate().await.unwrap());
}

#[tokio::test]
async fn end_date_beyond_the_window_is_accepted() {
    let dir = TempDir::new().unwrap();
    manager(&dir, CertificatePolicy::default())
        .ensure_certificate_authority_exists()
        .await
        .unwrap();

    let later = chrono::Utc::now() + chrono::Duration::days(2);
    let authority = manager_reporting(&dir, format!("notAfter={}\n", later.format("%b %d %H:%M:%S %Y GMT")));
    let kept = authority.ca_certificate().await.unwrap();
    authority.ensure_certificate_authority_exists().await.unwrap();
    assert_eq!(kept, authority.ca_certificate().await.unwrap());
}

#[tokio::test]
async fn server_cert_from_a_replaced_ca_is_regenerated() {
    let dir = TempDir::new().unwrap();
    let authority = manager(&dir, CertificatePolicy::default());

    authority.ensure_certificate_authority_exists().await.unwrap();
    authority.ensure_server_cert_exists().await.unwrap();
    authority.verify_server_cert_issued_by_ca().await.unwrap();
    let old_server = authority.store().read(Artifact::ServerCert).await.unwrap();

    // a missing CA key forces a brand new CA
    authority.store().remove(Artifact::CaKey).await.unwrap();
    authority.ensure_certificate_authority_exists().await.unwrap();
    let err = authority.verify_server_cert_issued_by_ca().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Certificate validation error: Current server cert was not issued by current CA"
    );

    authority.ensure_server_cert_exists().await.unwrap();
    let new_server = authority.store().read(Artifact::ServerCert).await.unwrap();
    assert_ne!(old_server, new_server);

    authority
        .check_cert_is_valid(&authority.store().path(Artifact::ServerCert))
        .await
        .unwrap();
    authority.verify_server_cert_issued_by_ca().await.unwrap();

    let (subject, issuer) = subject_and_issuer(&new_server);
    assert_eq!(subject, "localhost");
    assert_eq!(issuer, "NetinspectCA");
}

#[tokio::test]
async fn missing_certificate_fails_validation() {
    let dir = TempDir::new().unwrap();
    let authority = manager(&dir, CertificatePolicy::default());
    let missing = dir.path().join("nope.crt");

    let err = authority.check_cert_is_valid(&missing).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Certificate validation error: {} does not exist", missing.display())
    );
}

#[tokio::test]
async fn server_cert_requires_a_toolchain() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let toolchain = Arc::new(CountingToolchain::unavailable());
    let authority = AuthorityManager::new(
        CertificateStore::new(&config.storage_dir),
        toolchain.clone(),
        config.policy(),
        &test_logger(),
    );

    let err = authority.ensure_server_cert_exists().await.unwrap_err();
    assert!(matches!(err, ProvisionError::ToolchainUnavailable));
    assert_eq!(toolchain.calls(), 0);
}

#[tokio::test]
async fn certificate_info_reports_subject_and_expiry() {
    let dir = TempDir::new().unwrap();
    let authority = manager(&dir, CertificatePolicy::default());
    authority.ensure_certificate_authority_exists().await.unwrap();

    let info = authority.certificate_info(Artifact::CaCert).await.unwrap();
    assert!(info.subject.starts_with("CN=NetinspectCA"), "{}", info.subject);
    let days_left = (info.expires_at - chrono::Utc::now()).num_days();
    assert!((364..=365).contains(&days_left));
}

#[tokio::test]
async fn secure_server_config_builds_a_rustls_server() {
    let dir = TempDir::new().unwrap();
    let authority = manager(&dir, CertificatePolicy::default());

    let bundle = authority.load_secure_server_config().await.unwrap();
    assert!(bundle.request_client_cert);
    assert!(bundle.reject_unverified_client);
    assert!(bundle.ca_certificate.contains("BEGIN CERTIFICATE"));
    assert!(!format!("{bundle:?}").contains("PRIVATE KEY"));

    bundle.to_rustls_server_config().unwrap();
}
