use std::{fmt::Debug, path::Path};

use crate::{
    config::{ExtractMode, FileSelection},
    transactions::{ExtractedFiles, download_artifact, extract_archive},
    workflow::{GitHub, artifact::Artifact},
};

use anyhow::{Error, Result, anyhow, bail};
use async_zip::base::read::stream::ZipFileReader;
use futures::{Stream, TryStreamExt as _};

use sha2::Digest as _;
use tokio_util::bytes::Bytes;
use tracing::{error, info, warn};

enum Case {
    Extracted(ExtractedFiles),
    Failed(Error),
    HashUnmatch(ExtractedFiles),
}

/// Downloads an [`Artifact`] and extracts the selected entries of the archive to a specified path while it is
/// still downloading.
///
/// If the artifact carries a SHA-256 digest, the downloaded bytes are verified and the extracted files are
/// removed again on mismatch.
///
/// See: [`download_artifact`], [`extract_archive`]
///
/// # Errors
///
/// Returns an error if the download fails, the archive is malformed, or the digest does not match.
pub async fn download_and_extract_archive<P>(
    github: &GitHub,
    artifact: &Artifact,
    selection: &FileSelection,
    mode: ExtractMode,
    path: P,
) -> Result<ExtractedFiles>
where
    P: AsRef<Path> + Send + Sync + Debug,
{
    let stream = download_artifact(github, artifact).await?;

    info!("downloading artifact {artifact}…");
    match extract(stream, artifact.sha256(), selection, mode, &path).await {
        Case::Extracted(extracted) => {
            info!(
                "successfully extracted {} file(s) of {artifact} to {path:?}",
                extracted.written.len()
            );
            Ok(extracted)
        }
        Case::HashUnmatch(extracted) => {
            error!("failed to extract {artifact} to {path:?}: broken artifact");
            extracted.remove().await;
            bail!("digest mismatch for artifact {artifact}")
        }
        Case::Failed(err) => {
            error!("failed to extract {artifact} to {path:?}: {err}");
            Err(err.context(format!("failed to extract artifact {artifact}")))
        }
    }
}

async fn extract<S, P>(
    stream: S,
    sha256: Option<&str>,
    selection: &FileSelection,
    mode: ExtractMode,
    path: P,
) -> Case
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
    P: AsRef<Path> + Send + Sync + Debug,
{
    let mut sha_hasher = sha2::Sha256::new();
    let mut read = stream
        .map_ok(|bytes| {
            sha_hasher.update(&bytes);
            bytes
        })
        .map_err(std::io::Error::other)
        .into_async_read();

    match extract_archive(ZipFileReader::new(&mut read), selection, mode, &path).await {
        Ok(extracted) => {
            // Consumes the central directory as well so the whole archive reaches the hasher
            drop(futures::io::copy(&mut read, &mut futures::io::sink()).await);
            drop(read);

            let verified = sha256
                .map(|digest| hex::encode(sha_hasher.finalize()).eq_ignore_ascii_case(digest));
            match verified {
                Some(true) => Case::Extracted(extracted),
                Some(false) => Case::HashUnmatch(extracted),
                None => {
                    warn!("digest not provided for {path:?}");
                    Case::Extracted(extracted)
                }
            }
        }
        Err(err) => Case::Failed(anyhow!(err)),
    }
}
