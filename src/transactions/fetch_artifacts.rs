use anyhow::{Context as _, Result};
use tracing::{debug, error, info};

use crate::workflow::{
    GitHub, WorkflowRun,
    artifact::{Artifact, Artifacts},
};

/// The largest page GitHub serves.
const PER_PAGE: usize = 100;

/// Fetches every artifact of a workflow run, following pagination. An empty list is not an error.
///
/// # Errors
///
/// Returns an error if a request fails, GitHub answers with a non-success status, or a response cannot be parsed.
pub async fn fetch_artifacts(github: &GitHub, run: &WorkflowRun) -> Result<Vec<Artifact>> {
    let url = run.artifacts_url();
    let mut artifacts = Vec::new();

    for page in 1.. {
        let Artifacts {
            total_count,
            artifacts: batch,
        } = fetch_page(github, &url, page).await?;

        let count = batch.len();
        artifacts.extend(batch);

        // `total_count` may be absent, then a short page marks the end
        let total = usize::try_from(total_count).unwrap_or(usize::MAX);
        if count < PER_PAGE || (total_count > 0 && artifacts.len() >= total) {
            break;
        }
    }

    match artifacts.len() {
        0 => info!("no artifacts at {url}"),
        1 => info!("fetched 1 artifact from {url}"),
        count => info!("fetched {count} artifacts from {url}"),
    }

    Ok(artifacts)
}

async fn fetch_page(github: &GitHub, url: &str, page: usize) -> Result<Artifacts> {
    debug!("fetching page {page} of artifacts from {url}…");

    let response = github
        .request(url)
        .query(&[("per_page", PER_PAGE), ("page", page)])
        .send()
        .await
        .inspect_err(|err| error!("failed to fetch artifacts from {url}: {err}"))
        .with_context(|| format!("failed to fetch artifacts from {url}"))?;

    response
        .error_for_status()
        .inspect_err(|err| error!("failed to fetch artifacts from {url}: {err}"))
        .with_context(|| format!("failed to fetch artifacts from {url}"))?
        .json::<Artifacts>()
        .await
        .inspect_err(|err| error!("failed to parse data from {url}: {err}"))
        .with_context(|| format!("failed to parse artifacts from {url}"))
}
