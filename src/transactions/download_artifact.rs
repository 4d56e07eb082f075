use anyhow::{Context as _, Result, bail};
use futures::Stream;
use reqwest::StatusCode;
use tokio_util::bytes::Bytes;
use tracing::{debug, error, info};

use crate::workflow::{GitHub, artifact::Artifact};

/// Requests the archive of the specified artifact from GitHub and returns its body as a byte stream.
///
/// Nothing is buffered here: the caller decides how to consume the stream.
///
/// # Errors
///
/// Returns an error if the request fails or GitHub answers with a non-success status.
pub async fn download_artifact(
    github: &GitHub,
    artifact: &Artifact,
) -> Result<impl Stream<Item = Result<Bytes, reqwest::Error>> + use<>> {
    let url = &artifact.archive_download_url;
    debug!("requesting download from {url}…");

    let response = github
        .request_accepting(url, "application/zip")
        .send()
        .await
        .inspect_err(|err| error!("failed to download artifact at {url}: {err}"))
        .with_context(|| format!("failed to download artifact at {url}"))?;

    match response.status() {
        status if status.is_success() => {
            info!("requested download from {url}");
            Ok(response.bytes_stream())
        }
        StatusCode::GONE => {
            error!("failed to request download: artifact expired or removed");
            bail!("failed to request download from {url}: artifact expired or removed")
        }
        status => {
            if let Some(reason) = status.canonical_reason() {
                error!(
                    "failed to request download from {url}: {} {reason}",
                    status.as_u16()
                );
            } else {
                error!("failed to request download from {url}: {}", status.as_u16());
            }
            bail!("failed to request download from {url}: {status}")
        }
    }
}
