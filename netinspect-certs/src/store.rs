//! On-disk storage for the CA and server artifacts.
//!
//! Pure artifact I/O rooted at an injected directory; validation lives in
//! [`crate::authority`]. Regenerated artifacts are written to a pending path
//! and renamed into place.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Files persisted by the certificate store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    CaKey,
    CaCert,
    ServerKey,
    ServerCsr,
    ServerSerial,
    ServerCert,
}

impl Artifact {
    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::CaKey => "ca.key",
            Artifact::CaCert => "ca.crt",
            Artifact::ServerKey => "server.key",
            Artifact::ServerCsr => "server.csr",
            Artifact::ServerSerial => "server.srl",
            Artifact::ServerCert => "server.crt",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CertificateStore {
    root: PathBuf,
}

impl CertificateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.root.join(artifact.file_name())
    }

    /// Location an artifact is generated into before [`Self::commit`]
    pub fn pending_path(&self, artifact: Artifact) -> PathBuf {
        self.root.join(format!("{}.pending", artifact.file_name()))
    }

    pub fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).is_file()
    }

    pub fn all_exist(&self, artifacts: &[Artifact]) -> bool {
        artifacts.iter().all(|artifact| self.exists(*artifact))
    }

    /// Create the storage directory if it is missing
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub async fn read(&self, artifact: Artifact) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path(artifact)).await?)
    }

    pub async fn read_to_string(&self, artifact: Artifact) -> Result<String> {
        Ok(tokio::fs::read_to_string(self.path(artifact)).await?)
    }

    pub async fn write(&self, artifact: Artifact, contents: &[u8]) -> Result<()> {
        self.ensure_dir().await?;
        let pending = self.pending_path(artifact);
        tokio::fs::write(&pending, contents).await?;
        self.commit(artifact).await
    }

    /// Move a pending artifact over the live one
    pub async fn commit(&self, artifact: Artifact) -> Result<()> {
        tokio::fs::rename(self.pending_path(artifact), self.path(artifact)).await?;
        Ok(())
    }

    /// Remove an artifact; missing files are not an error
    pub async fn remove(&self, artifact: Artifact) -> Result<()> {
        match tokio::fs::remove_file(self.path(artifact)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
