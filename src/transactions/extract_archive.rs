use async_zip::{
    base::read::stream::{Ready, ZipFileReader},
    error::ZipError,
};
use futures::io::{AsyncBufRead, AsyncWriteExt as _};
use tokio_util::compat::TokioAsyncWriteCompatExt as _;
use tracing::{debug, trace, warn};

use std::path::{Path, PathBuf};

use crate::config::{ExtractMode, FileSelection, normalize_entry_name};

/// The files written by [`extract_archive`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFiles {
    /// Every destination path that was written, in archive order.
    pub written: Vec<PathBuf>,
    /// The written paths still present once extraction is done.
    pub retained: Vec<PathBuf>,
}

impl ExtractedFiles {
    /// Removes the retained files, ignoring the ones already gone.
    pub async fn remove(&self) {
        for path in &self.retained {
            drop(tokio::fs::remove_file(path).await);
        }
    }
}

fn sanitize_file_path(path: &str) -> PathBuf {
    normalize_entry_name(path)
        .split('/')
        .map(sanitize_filename::sanitize)
        .filter(|component| !component.is_empty())
        .collect()
}

/// Extracts the selected entries of an archive of [`ZipFileReader<Ready<R>>`] to a specified path.
///
/// Each entry path is sanitized and intermediate directories are created if possible. Existing files are
/// overwritten. Selected paths missing from the archive are skipped. Under [`ExtractMode::Move`] every file is
/// removed right after it has been written.
///
/// # Errors
///
/// Returns a [`ZipError`] if the archive is malformed or a file cannot be written.
pub async fn extract_archive<R, P>(
    archive: ZipFileReader<Ready<R>>,
    selection: &FileSelection,
    mode: ExtractMode,
    path: P,
) -> Result<ExtractedFiles, ZipError>
where
    R: AsyncBufRead + Unpin,
    P: AsRef<Path> + Send + Sync,
{
    tokio::fs::create_dir_all(&path).await?;

    let mut extracted = ExtractedFiles::default();
    let mut ready = archive;

    loop {
        let Some(mut reading) = ready.next_with_entry().await? else {
            break;
        };

        let name = reading
            .reader()
            .entry()
            .filename()
            .as_str()
            .map(str::to_owned);
        let name = match name {
            Ok(name) => name,
            Err(err) => {
                warn!("skipping entry with an invalid name: {err}");
                ready = reading.skip().await?;
                continue;
            }
        };

        let relative = sanitize_file_path(&name);
        if !selection.contains(&name) || relative.as_os_str().is_empty() {
            trace!("skipping entry {name}");
            ready = reading.skip().await?;
            continue;
        }

        let p = path.as_ref().join(relative);

        // Parent directories may not exist if the archive does not contain directory entries
        if let Some(parent) = p.parent()
            && !parent.is_dir()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut writer = tokio::fs::File::create(&p).await?.compat_write();
        futures::io::copy(reading.reader_mut(), &mut writer).await?;
        writer.flush().await?;
        drop(writer);

        debug!("extracted {name} to {p:?}");
        extracted.written.push(p.clone());

        if mode.retains_files() {
            extracted.retained.push(p);
        } else {
            tokio::fs::remove_file(&p).await?;
            debug!("removed {p:?} after extraction ({mode:?} mode)");
        }

        ready = reading.done().await?;
    }

    Ok(extracted)
}
