use std::time::Duration;

use anyhow::{Context as _, Result};
use tracing::{info, warn};

use crate::{
    config::{ArtifactSpec, Config},
    framework::StateTracker,
    transactions::{ExtractedFiles, download_and_extract_archive, fetch_artifacts, fetch_latest_run},
    workflow::{GitHub, WorkflowRun, artifact::Artifact},
};

#[cfg(feature = "telegram")]
use crate::notify::{MessageContext, TelegramNotifier};

/// The result of one polling pass. Missing data ends a pass early without being an error.
#[non_exhaustive]
#[derive(Debug)]
pub enum Outcome {
    /// The workflow has no successful run.
    NoRun,
    /// The latest successful run has no artifacts.
    NoArtifacts {
        /// The id of the run.
        run_id: u64,
    },
    /// Every configured artifact has been looked at, in configuration order.
    Finished {
        /// The id of the run.
        run_id: u64,
        /// One entry per configured artifact.
        artifacts: Vec<ArtifactOutcome>,
    },
}

impl Outcome {
    /// The number of artifacts downloaded and extracted during the pass.
    pub fn processed(&self) -> usize {
        match self {
            Self::Finished { artifacts, .. } => artifacts
                .iter()
                .filter(|artifact| matches!(artifact, ArtifactOutcome::Processed { .. }))
                .count(),
            _ => 0,
        }
    }
}

/// What happened to one configured artifact.
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// The run has no artifact with this name.
    Missing {
        /// The configured artifact name.
        name: String,
    },
    /// The artifact exists but can no longer be downloaded.
    Expired {
        /// The configured artifact name.
        name: String,
        /// The id of the expired artifact.
        id: String,
    },
    /// The artifact has already been processed by a previous pass.
    Unchanged {
        /// The configured artifact name.
        name: String,
        /// The id recorded in the state file.
        id: String,
    },
    /// The artifact has been downloaded, extracted and recorded.
    Processed {
        /// The configured artifact name.
        name: String,
        /// The id now recorded in the state file.
        id: String,
        /// The files written by the extraction.
        files: ExtractedFiles,
    },
}

/// Builds the HTTP client shared by every request of a pass.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialized.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(crate::USER_AGENT)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")
}

/// Runs one polling pass with a fresh HTTP client.
///
/// See: [`run_with_client`]
///
/// # Errors
///
/// See: [`run_with_client`]
pub async fn run(config: &Config, states: &StateTracker) -> Result<Outcome> {
    run_with_client(http_client()?, config, states).await
}

/// Runs one polling pass: locates the latest successful run, then downloads, extracts and records every
/// configured artifact that changed since the previous pass, notifying and checking out the repository if
/// configured.
///
/// # Errors
///
/// Returns an error if GitHub answers with a non-success status, an archive cannot be extracted, a state file
/// cannot be written, or the repository cannot be checked out. Notification failures are never returned.
pub async fn run_with_client(
    client: reqwest::Client,
    config: &Config,
    states: &StateTracker,
) -> Result<Outcome> {
    let pipeline = Pipeline {
        config,
        states,
        github: GitHub::new(client.clone(), &config.github),
        #[cfg(feature = "telegram")]
        notifier: TelegramNotifier::new(client, &config.telegram),
    };

    pipeline.run().await
}

struct Pipeline<'a> {
    config: &'a Config,
    states: &'a StateTracker,
    github: GitHub,
    #[cfg(feature = "telegram")]
    notifier: TelegramNotifier,
}

impl Pipeline<'_> {
    async fn run(&self) -> Result<Outcome> {
        let Some(run) = fetch_latest_run(&self.github).await? else {
            return Ok(Outcome::NoRun);
        };

        let artifacts = fetch_artifacts(&self.github, &run).await?;
        if artifacts.is_empty() {
            return Ok(Outcome::NoArtifacts { run_id: run.id });
        }

        let mut outcomes = Vec::with_capacity(self.config.artifacts.len());
        for spec in &self.config.artifacts {
            outcomes.push(self.process(spec, &run, &artifacts).await?);
        }

        let outcome = Outcome::Finished {
            run_id: run.id,
            artifacts: outcomes,
        };

        // Every pass, so a checkout that failed after the state was saved is retried
        if self.config.output.clone {
            self.materialize(&run).await?;
        }

        Ok(outcome)
    }

    async fn process(
        &self,
        spec: &ArtifactSpec,
        run: &WorkflowRun,
        artifacts: &[Artifact],
    ) -> Result<ArtifactOutcome> {
        let name = spec.name.clone();
        let Some(artifact) = artifacts.iter().find(|artifact| artifact.name == spec.name) else {
            info!("{run} has no artifact named {name}, skipping");
            return Ok(ArtifactOutcome::Missing { name });
        };
        let id = artifact.id.to_string();

        let key = self.config.state_file(&spec.name);
        let _guard = self.states.lock(&key).await;

        if self.states.load(&key).await?.as_deref() == Some(id.as_str()) {
            info!("artifact {artifact} has already been processed, skipping");
            return Ok(ArtifactOutcome::Unchanged { name, id });
        }

        if artifact.expired {
            warn!("artifact {artifact} has expired, skipping");
            return Ok(ArtifactOutcome::Expired { name, id });
        }

        let files = download_and_extract_archive(
            &self.github,
            artifact,
            &spec.files_to_extract,
            spec.extract_mode,
            &self.config.output.extract_dir,
        )
        .await?;

        self.states.save(&key, &id).await?;

        self.notify(run, artifact, &files).await;

        Ok(ArtifactOutcome::Processed { name, id, files })
    }

    #[cfg(feature = "telegram")]
    async fn notify(&self, run: &WorkflowRun, artifact: &Artifact, files: &ExtractedFiles) {
        let context = MessageContext {
            repo: self.github.repo(),
            run,
            artifact,
            files: files.written.len(),
        };
        self.notifier.notify_download(&context).await;
    }

    #[cfg(not(feature = "telegram"))]
    async fn notify(&self, _run: &WorkflowRun, _artifact: &Artifact, _files: &ExtractedFiles) {}

    #[cfg(feature = "git")]
    async fn materialize(&self, run: &WorkflowRun) -> Result<()> {
        crate::repository::materialize(
            &self.config.github.clone_url(),
            &self.config.output.clone_dir,
            &run.head_sha,
        )
        .await
        .with_context(|| format!("failed to check out {run}"))
    }

    #[cfg(not(feature = "git"))]
    async fn materialize(&self, run: &WorkflowRun) -> Result<()> {
        warn!("output.clone is set but git support is not compiled in, not checking out {run}");
        Ok(())
    }
}
