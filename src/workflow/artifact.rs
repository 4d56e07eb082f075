//! Artifacts from GitHub REST API.

use std::fmt::Display;

use serde::Deserialize;

/// Represents artifacts from GitHub REST API.
#[derive(Debug, Deserialize, Clone)]
pub struct Artifacts {
    /// The number of artifacts of the run, across every page.
    #[serde(default)]
    pub total_count: u64,
    /// The artifacts of this page.
    pub artifacts: Vec<Artifact>,
}

/// Represents an artifact from GitHub REST API.
#[derive(Debug, Deserialize, Clone)]
pub struct Artifact {
    /// The artifact id, new for every upload.
    pub id: u64,
    /// The name given to `actions/upload-artifact`.
    pub name: String,
    /// The size of the zip archive.
    #[serde(default)]
    pub size_in_bytes: u64,
    /// The API URL redirecting to the zip archive.
    pub archive_download_url: String,
    /// Whether the archive can no longer be downloaded.
    #[serde(default)]
    pub expired: bool,
    /// When the artifact was uploaded, RFC 3339.
    pub created_at: Option<String>,
    /// When the artifact expires, RFC 3339.
    pub expires_at: Option<String>,
    /// When the artifact was last updated, RFC 3339.
    pub updated_at: Option<String>,
    /// The digest of the archive, e.g. `sha256:…`.
    pub digest: Option<String>,
}

impl Artifact {
    /// The hex encoded SHA-256 digest of the archive, if GitHub provided one.
    pub fn sha256(&self) -> Option<&str> {
        self.digest.as_deref()?.strip_prefix("sha256:")
    }
}

impl Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} at {})",
            self.name, self.id, self.archive_download_url
        )
    }
}
