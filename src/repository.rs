//! Checks out the commit of a workflow run with the `git` command line.

use std::{
    ffi::{OsStr, OsString},
    fmt::Debug,
    path::Path,
    process::Stdio,
};

use anyhow::{Context as _, Result, bail};
use reqwest::Url;
use tokio::process::Command;
use tracing::{debug, info};

/// Makes `clone_dir` a shallow clone of `clone_url` with `commit` checked out.
///
/// An empty or missing directory is cloned without checkout first. An existing clone is reused, so repeated
/// calls only fetch what is missing.
///
/// # Errors
///
/// Returns an error if `clone_dir` is a non-empty directory that is not a clone, or if any `git` invocation
/// exits unsuccessfully.
pub async fn materialize<P>(clone_url: &str, clone_dir: P, commit: &str) -> Result<()>
where
    P: AsRef<Path> + Send + Sync + Debug,
{
    let dir = clone_dir.as_ref();
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create clone directory {dir:?}"))?;

    if dir.join(".git").exists() {
        debug!("reusing existing clone at {dir:?}");
    } else if is_empty_dir(dir).await? {
        info!(
            "cloning {} into {dir:?}…",
            without_credentials(clone_url).as_deref().unwrap_or(clone_url)
        );
        git(
            None,
            [
                OsStr::new("clone"),
                OsStr::new("--no-checkout"),
                OsStr::new("--depth"),
                OsStr::new("1"),
                OsStr::new(clone_url),
                dir.as_os_str(),
            ],
        )
        .await?;
    } else {
        bail!("clone directory {dir:?} is not empty and is not a git repository");
    }

    let object = format!("{commit}^{{commit}}");
    if git(Some(dir), ["cat-file", "-e", object.as_str()]).await.is_ok() {
        debug!("commit {commit} is already present in {dir:?}");
    } else {
        debug!("fetching commit {commit} into {dir:?}…");
        git(Some(dir), ["fetch", "--depth", "1", "origin", commit]).await?;
    }

    git(Some(dir), ["checkout", "--force", "--quiet", commit]).await?;
    info!("checked out {commit} in {dir:?}");

    Ok(())
}

async fn is_empty_dir(dir: &Path) -> Result<bool> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read clone directory {dir:?}"))?;
    Ok(entries.next_entry().await?.is_none())
}

/// `url` with its user name and password removed, or `None` if it carries neither.
fn without_credentials(url: &str) -> Option<String> {
    let mut url = Url::parse(url).ok()?;
    if url.username().is_empty() && url.password().is_none() {
        return None;
    }

    url.set_username("").ok()?;
    url.set_password(None).ok()?;
    Some(url.into())
}

/// The git subcommand of an argument list, skipping `-c key=value` options.
fn subcommand(args: &[OsString]) -> String {
    let mut args = args.iter();
    while let Some(arg) = args.next() {
        if arg == "-c" {
            args.next();
        } else if !arg.to_string_lossy().starts_with('-') {
            return arg.to_string_lossy().into_owned();
        }
    }
    String::new()
}

// Errors name the subcommand only, the arguments may hold a clone URL with credentials
async fn git<I, S>(dir: Option<&Path>, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args.into_iter().map(|arg| arg.as_ref().to_owned()).collect();
    let subcommand = subcommand(&args);

    let mut command = Command::new("git");
    command
        .args(&args)
        .stdin(Stdio::null())
        .env("GIT_TERMINAL_PROMPT", "0");
    if let Some(dir) = dir {
        command.current_dir(dir);
    }

    let output = command
        .output()
        .await
        .with_context(|| format!("failed to run git {subcommand}"))?;

    if !output.status.success() {
        let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        for arg in args.iter().filter_map(|arg| arg.to_str()) {
            if let Some(redacted) = without_credentials(arg) {
                stderr = stderr.replace(arg, &redacted);
            }
            if let Ok(url) = Url::parse(arg)
                && let Some(password) = url.password()
            {
                stderr = stderr.replace(password, "***");
            }
        }
        bail!("git {subcommand} exited with {}: {stderr}", output.status);
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
