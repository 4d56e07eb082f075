use anyhow::{Context as _, Result};
use tracing::{debug, error, info};

use crate::workflow::{GitHub, WorkflowRun, WorkflowRuns};

/// Fetches the latest successful run of the configured workflow.
///
/// Returns [`None`] if the workflow has no successful run.
///
/// # Errors
///
/// Returns an error if the request fails, GitHub answers with a non-success status, or the response cannot be parsed.
pub async fn fetch_latest_run(github: &GitHub) -> Result<Option<WorkflowRun>> {
    let url = github.workflow_runs_url();
    debug!("fetching latest successful run from {url}…");

    let response = github
        .request(&url)
        .query(&[("status", "success"), ("per_page", "1")])
        .send()
        .await
        .inspect_err(|err| error!("failed to fetch workflow runs from {url}: {err}"))
        .with_context(|| format!("failed to fetch workflow runs from {url}"))?;

    let runs = response
        .error_for_status()
        .inspect_err(|err| error!("failed to fetch workflow runs from {url}: {err}"))
        .with_context(|| format!("failed to fetch workflow runs from {url}"))?
        .json::<WorkflowRuns>()
        .await
        .inspect_err(|err| error!("failed to parse data from {url}: {err}"))
        .with_context(|| format!("failed to parse workflow runs from {url}"))?;

    match runs.workflow_runs.into_iter().next() {
        Some(run) => {
            info!("found latest successful {run} of {}", github.repo());
            Ok(Some(run))
        }
        None => {
            info!("no successful run at {url}");
            Ok(None)
        }
    }
}
