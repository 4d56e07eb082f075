//! Data models of GitHub Actions workflows and the client to query them.

use std::fmt::Display;

use reqwest::{RequestBuilder, header};
use serde::Deserialize;

use crate::config::{GitHubConfig, Id};

pub mod artifact;

/// Represents a page of workflow runs from GitHub REST API.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowRuns {
    /// The number of runs matching the query, across every page.
    #[serde(default)]
    pub total_count: u64,
    /// The runs of this page, newest first.
    pub workflow_runs: Vec<WorkflowRun>,
}

/// Represents a GitHub Actions workflow run from GitHub REST API.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowRun {
    /// The run id.
    pub id: u64,
    /// The workflow name shown for the run.
    #[serde(default)]
    pub name: Option<String>,
    /// E.g. `completed`.
    #[serde(default)]
    pub status: Option<String>,
    /// E.g. `success`.
    #[serde(default)]
    pub conclusion: Option<String>,
    /// The branch the run was triggered on.
    #[serde(default)]
    pub head_branch: Option<String>,
    /// The commit the run was triggered for.
    pub head_sha: String,
    /// The API URL of the run itself.
    pub url: String,
    /// The API URL of the run's artifact list.
    #[serde(default)]
    pub artifacts_url: Option<String>,
    /// Details of the head commit, if GitHub sent them.
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
}

/// The commit a workflow run was triggered for.
#[derive(Debug, Deserialize, Clone)]
pub struct HeadCommit {
    /// The full commit hash.
    pub id: String,
    /// The full commit message.
    #[serde(default)]
    pub message: String,
}

impl WorkflowRun {
    /// The API URL of the run's artifact list, derived from [`Self::url`] if GitHub did not send one.
    pub fn artifacts_url(&self) -> String {
        match &self.artifacts_url {
            Some(url) => url.clone(),
            None => format!("{}/artifacts", self.url.trim_end_matches('/')),
        }
    }

    /// The commit hash of the run.
    pub fn commit(&self) -> &str {
        self.head_commit
            .as_ref()
            .map_or(self.head_sha.as_str(), |commit| commit.id.as_str())
    }

    /// The first line of the commit message, empty if unknown.
    pub fn commit_title(&self) -> &str {
        self.head_commit
            .as_ref()
            .and_then(|commit| commit.message.lines().next())
            .unwrap_or_default()
    }
}

impl Display for WorkflowRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let commit = self.commit();
        write!(f, "run {} at {}", self.id, commit.get(..7).unwrap_or(commit))
    }
}

/// An authenticated client for GitHub REST API, bound to one repository and one workflow.
#[derive(Debug, Clone)]
pub struct GitHub {
    client: reqwest::Client,
    api_url: String,
    repo: String,
    workflow_id: Id,
    token: String,
}

impl GitHub {
    /// Creates a client from the `github` section of the configuration.
    pub fn new(client: reqwest::Client, config: &GitHubConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            repo: config.repo.clone(),
            workflow_id: config.workflow_id.clone(),
            token: config.token.clone(),
        }
    }

    /// The repository slug, `owner/name`.
    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// The endpoint listing the runs of the configured workflow.
    pub fn workflow_runs_url(&self) -> String {
        format!(
            "{}/repos/{}/actions/workflows/{}/runs",
            self.api_url, self.repo, self.workflow_id
        )
    }

    /// Builds a JSON request for GitHub REST API.
    pub fn request(&self, url: &str) -> RequestBuilder {
        self.request_accepting(url, "application/vnd.github+json")
    }

    /// Builds a request for GitHub REST API accepting the given media type.
    pub fn request_accepting(&self, url: &str, accept: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header(header::ACCEPT, accept)
            .bearer_auth(&self.token)
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header(header::USER_AGENT, crate::USER_AGENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(json: &str) -> WorkflowRun {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn falls_back_to_derived_artifacts_url() {
        let run = run(r#"{
            "id": 7,
            "head_sha": "0123456789abcdef",
            "url": "https://api.github.com/repos/octo/widgets/actions/runs/7"
        }"#);

        assert_eq!(
            run.artifacts_url(),
            "https://api.github.com/repos/octo/widgets/actions/runs/7/artifacts"
        );
        assert_eq!(run.commit(), "0123456789abcdef");
        assert_eq!(run.commit_title(), "");
        assert_eq!(run.to_string(), "run 7 at 0123456");
    }

    #[test]
    fn reads_head_commit() {
        let run = run(r#"{
            "id": 7,
            "status": "completed",
            "conclusion": "success",
            "head_sha": "abc",
            "url": "https://api.github.com/repos/octo/widgets/actions/runs/7",
            "artifacts_url": "https://example.com/artifacts",
            "head_commit": { "id": "abc", "message": "Fix the build\n\nLong description" }
        }"#);

        assert_eq!(run.artifacts_url(), "https://example.com/artifacts");
        assert_eq!(run.commit_title(), "Fix the build");
    }

    #[test]
    fn displays_short_commits_of_any_encoding() {
        let mut run = run(r#"{
            "id": 7,
            "head_sha": "abc",
            "url": "https://api.github.com/repos/octo/widgets/actions/runs/7"
        }"#);
        assert_eq!(run.to_string(), "run 7 at abc");

        run.head_sha = "é".repeat(4);
        assert_eq!(run.to_string(), format!("run 7 at {}", "é".repeat(4)));
    }

    #[test]
    fn builds_workflow_runs_url() {
        let config = GitHubConfig {
            repo: "octo/widgets".to_owned(),
            workflow_id: Id::Text("build.yml".to_owned()),
            token: "t".to_owned(),
            api_url: "http://localhost:1234/".to_owned(),
            clone_url: None,
        };
        let github = GitHub::new(reqwest::Client::new(), &config);

        assert_eq!(
            github.workflow_runs_url(),
            "http://localhost:1234/repos/octo/widgets/actions/workflows/build.yml/runs"
        );
    }
}
