//! Persists the last processed artifact identifier per state key.
//!
//! A state key is a file path derived from the configured template, see [`state_file_path`]. The file holds a
//! single line: the identifier of the most recently processed artifact.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context as _, Result};
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

/// Derives the state file of an artifact from a path template.
///
/// `{name}` in the template is replaced by the artifact name. Without the placeholder, `_<artifact name>` is
/// appended when `shared` is set, so several artifacts never share one file. Spaces then become underscores and
/// `.txt` is appended.
pub fn state_file_path(template: &str, artifact_name: &str, shared: bool) -> PathBuf {
    let path = if template.contains("{name}") {
        template.replace("{name}", artifact_name)
    } else if shared {
        format!("{template}_{artifact_name}")
    } else {
        template.to_owned()
    };

    PathBuf::from(format!("{}.txt", path.replace(' ', "_")))
}

/// Reads and writes state files, serializing access per key inside this process.
///
/// Invocations racing on the same key from different processes are not guarded against.
#[derive(Debug, Default)]
pub struct StateTracker {
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl StateTracker {
    /// Creates a [`StateTracker`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the exclusive lock of a state key. Hold the guard across the whole load → process → save cycle.
    pub async fn lock(&self, key: &Path) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().entry(key.to_path_buf()).or_default().clone();
        lock.lock_owned().await
    }

    /// Reads the last processed identifier. A missing or blank file means "never processed".
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub async fn load(&self, key: &Path) -> Result<Option<String>> {
        match tokio::fs::read_to_string(key).await {
            Ok(content) => {
                let id = content.trim();
                if id.is_empty() {
                    debug!("state file {key:?} is empty");
                    Ok(None)
                } else {
                    debug!("last processed identifier in {key:?} is {id}");
                    Ok(Some(id.to_owned()))
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("state file {key:?} does not exist yet");
                Ok(None)
            }
            Err(err) => Err(err).with_context(|| format!("failed to read state file {key:?}")),
        }
    }

    /// Overwrites the state file with a new identifier, creating parent directories if needed.
    ///
    /// The identifier is written to a sibling temporary file first, then renamed over the state file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, key: &Path, id: &str) -> Result<()> {
        if let Some(parent) = key.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create state directory {parent:?}"))?;
        }

        let mut temporary = key.as_os_str().to_owned();
        temporary.push(".tmp");
        let temporary = PathBuf::from(temporary);

        tokio::fs::write(&temporary, id)
            .await
            .with_context(|| format!("failed to write state file {temporary:?}"))?;
        tokio::fs::rename(&temporary, key)
            .await
            .with_context(|| format!("failed to replace state file {key:?}"))?;

        info!("saved {id} to {key:?}");
        Ok(())
    }
}
