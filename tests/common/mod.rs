#![allow(dead_code)]

use std::{io::Write as _, path::Path};

use artifact_poller::config::Config;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{header, method, path, query_param},
};
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

pub const REPO: &str = "octo/widgets";
pub const WORKFLOW: &str = "build.yml";
pub const TOKEN: &str = "ghp_test";
pub const RUN_ID: u64 = 7;
pub const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";

/// Builds a zip archive in memory. Names ending with `/` become directory entries.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }

    writer.finish().unwrap().into_inner()
}

/// A configuration pointing at the mock server, with extraction and state below `dir`.
pub fn config(server: &MockServer, dir: &Path, artifacts: &str, extra: &str) -> Config {
    config_with_sections(server, dir, artifacts, "", "", extra)
}

/// Like [`config`], with additional indented keys for the `github` and `output` sections.
pub fn config_with_sections(
    server: &MockServer,
    dir: &Path,
    artifacts: &str,
    github: &str,
    output: &str,
    extra: &str,
) -> Config {
    let yaml = format!(
        r#"
github:
  repo: {REPO}
  workflow_id: {WORKFLOW}
  token: {TOKEN}
  api_url: {api}
{github}
artifacts:
{artifacts}
output:
  extract_dir: {extract}
{output}
state:
  last_artifact_id_file: {state}
{extra}
"#,
        api = server.uri(),
        extract = dir.join("extracted").display(),
        state = dir.join("state").join("last artifact id").display(),
    );

    Config::from_yaml_str(&yaml).unwrap()
}

fn runs_path() -> String {
    format!("/repos/{REPO}/actions/workflows/{WORKFLOW}/runs")
}

fn artifacts_path() -> String {
    format!("/repos/{REPO}/actions/runs/{RUN_ID}/artifacts")
}

/// Mounts the run locator endpoint answering with one successful run.
pub async fn mount_run(server: &MockServer) {
    mount_run_at(server, COMMIT).await;
}

/// Mounts the run locator endpoint answering with one successful run of `commit`.
pub async fn mount_run_at(server: &MockServer, commit: &str) {
    let run_url = format!("{}/repos/{REPO}/actions/runs/{RUN_ID}", server.uri());
    Mock::given(method("GET"))
        .and(path(runs_path()))
        .and(query_param("status", "success"))
        .and(query_param("per_page", "1"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 1,
            "workflow_runs": [{
                "id": RUN_ID,
                "status": "completed",
                "conclusion": "success",
                "head_branch": "main",
                "head_sha": commit,
                "url": run_url,
                "artifacts_url": format!("{run_url}/artifacts"),
                "head_commit": { "id": commit, "message": "Ship it" },
            }],
        })))
        .mount(server)
        .await;
}

/// Mounts the run locator endpoint answering with no runs.
pub async fn mount_no_run(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(runs_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": 0,
            "workflow_runs": [],
        })))
        .mount(server)
        .await;
}

/// Describes an artifact of the mocked run.
pub struct MockArtifact<'a> {
    pub id: u64,
    pub name: &'a str,
    pub archive: Vec<u8>,
    pub digest: Option<String>,
    pub expired: bool,
    /// How many downloads the mock expects.
    pub downloads: u64,
}

impl<'a> MockArtifact<'a> {
    pub fn new(id: u64, name: &'a str, archive: Vec<u8>) -> Self {
        Self {
            id,
            name,
            archive,
            digest: None,
            expired: false,
            downloads: 1,
        }
    }
}

/// The artifact list entry GitHub would send for `artifact`.
pub fn artifact_json(server: &MockServer, artifact: &MockArtifact<'_>) -> serde_json::Value {
    json!({
        "id": artifact.id,
        "name": artifact.name,
        "size_in_bytes": artifact.archive.len(),
        "archive_download_url": format!("{}/download/{}", server.uri(), artifact.id),
        "expired": artifact.expired,
        "digest": artifact.digest,
    })
}

/// Mounts the artifact list of the run and the download endpoint of each artifact.
pub async fn mount_artifacts(server: &MockServer, artifacts: Vec<MockArtifact<'_>>) {
    let list: Vec<_> = artifacts
        .iter()
        .map(|artifact| artifact_json(server, artifact))
        .collect();

    Mock::given(method("GET"))
        .and(path(artifacts_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": list.len(),
            "artifacts": list,
        })))
        .mount(server)
        .await;

    mount_downloads(server, artifacts).await;
}

/// Mounts one page of the artifact list, claiming `total_count` artifacts overall.
pub async fn mount_artifact_page(
    server: &MockServer,
    page: u32,
    total_count: usize,
    list: Vec<serde_json::Value>,
) {
    Mock::given(method("GET"))
        .and(path(artifacts_path()))
        .and(query_param("per_page", "100"))
        .and(query_param("page", page.to_string().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_count": total_count,
            "artifacts": list,
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Mounts the download endpoint of each artifact.
pub async fn mount_downloads(server: &MockServer, artifacts: Vec<MockArtifact<'_>>) {
    for artifact in artifacts {
        Mock::given(method("GET"))
            .and(path(format!("/download/{}", artifact.id)))
            .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/zip")
                    .set_body_bytes(artifact.archive),
            )
            .expect(artifact.downloads)
            .mount(server)
            .await;
    }
}

/// Runs `git` in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?}: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap().trim().to_owned()
}

/// Whether a `git` executable can be run.
pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|output| output.status.success())
}

/// Creates a repository at `dir` with one commit adding `file`, and returns the commit hash.
pub fn upstream_repository(dir: &Path, file: &str, content: &str) -> String {
    std::fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "--quiet"]);
    std::fs::write(dir.join(file), content).unwrap();
    git(dir, &["add", file]);
    git(dir, &["commit", "--quiet", "-m", "Initial commit"]);
    git(dir, &["rev-parse", "HEAD"])
}

/// Mounts an artifact list that must never be requested.
pub async fn forbid_artifacts(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(artifacts_path()))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}
