//! The configuration file and its validation.
//!
//! The configuration is a YAML document loaded once per invocation. It is immutable afterwards and passed
//! by reference to every component.

use std::{
    collections::HashSet,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result, ensure};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{env, framework::state::state_file_path};

/// The root of the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Where to look for workflow runs.
    pub github: GitHubConfig,
    /// The artifacts to process. A single mapping is accepted as a one-element list.
    #[serde(deserialize_with = "one_or_many")]
    pub artifacts: Vec<ArtifactSpec>,
    /// Where to put extracted files and the repository clone.
    pub output: OutputConfig,
    /// Where to persist the last processed artifact identifiers.
    pub state: StateConfig,
    /// Optional notifications.
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// An identifier that may be written either as a number or as a string.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Id {
    /// A numeric identifier, e.g. `123456` or `-100123456`.
    Number(i64),
    /// A textual identifier, e.g. `build.yml` or `@channel`.
    Text(String),
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// The repository and workflow to poll, and how to reach GitHub.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// The repository slug, `owner/name`.
    pub repo: String,
    /// The workflow file name or its numeric identifier.
    pub workflow_id: Id,
    /// The access token. Falls back to the `GITHUB_TOKEN` environment variable when empty.
    #[serde(default)]
    pub token: String,
    /// The REST API root, `https://api.github.com` unless set.
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Overrides the URL cloned by the repository materializer.
    #[serde(default)]
    pub clone_url: Option<String>,
}

impl GitHubConfig {
    /// The URL cloned by the repository materializer.
    pub fn clone_url(&self) -> String {
        match &self.clone_url {
            Some(url) => url.clone(),
            None => format!("https://github.com/{}.git", self.repo),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_owned()
}

/// Describes which files to take from one artifact and what to do with them.
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactSpec {
    /// The artifact name, as uploaded by the workflow.
    pub name: String,
    /// The archive entries to extract.
    pub files_to_extract: FileSelection,
    /// What happens to the extracted files, [`ExtractMode::Copy`] unless set.
    #[serde(default)]
    pub extract_mode: ExtractMode,
}

/// The archive entries to extract.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawFileSelection")]
pub enum FileSelection {
    /// Every non-directory entry, written as `"*"`.
    All,
    /// Only these archive-relative paths.
    Files(Vec<String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFileSelection {
    Files(Vec<String>),
    Pattern(String),
}

impl TryFrom<RawFileSelection> for FileSelection {
    type Error = String;

    fn try_from(raw: RawFileSelection) -> Result<Self, Self::Error> {
        match raw {
            RawFileSelection::Files(files) => Ok(Self::Files(
                files.iter().map(|file| normalize_entry_name(file)).collect(),
            )),
            RawFileSelection::Pattern(pattern) if pattern.trim() == "*" => Ok(Self::All),
            RawFileSelection::Pattern(pattern) => Err(format!(
                "unsupported file selection {pattern:?}, expected a list of paths or \"*\""
            )),
        }
    }
}

impl FileSelection {
    /// Whether the archive entry `name` is selected. Directory entries are never selected.
    pub fn contains(&self, name: &str) -> bool {
        if name.ends_with('/') || name.ends_with('\\') {
            return false;
        }

        match self {
            Self::All => true,
            Self::Files(files) => {
                let name = normalize_entry_name(name);
                files.iter().any(|file| *file == name)
            }
        }
    }
}

/// Normalizes an archive entry name for comparison: forward slashes, no leading `./` or `/`.
pub fn normalize_entry_name(name: &str) -> String {
    let name = name.replace('\\', "/");
    let mut name = name.as_str();
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            break name.to_owned();
        }
    }
}

/// What happens to an extracted file once it has been written.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    /// The file is kept.
    #[default]
    Copy,
    /// The file is removed right after it has been written.
    Move,
    /// Reserved for custom post-processing. Currently keeps the file, like [`ExtractMode::Copy`].
    Custom,
}

impl ExtractMode {
    /// Whether extracted files stay at their destination.
    pub fn retains_files(self) -> bool {
        !matches!(self, Self::Move)
    }
}

/// Where extracted files and the repository clone go.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// The root directory extracted files are written to.
    pub extract_dir: PathBuf,
    /// The directory of the repository clone, `./repo` unless set.
    #[serde(default = "default_clone_dir")]
    pub clone_dir: PathBuf,
    /// Whether to check out the commit of the processed run into [`Self::clone_dir`].
    #[serde(default)]
    pub clone: bool,
}

fn default_clone_dir() -> PathBuf {
    PathBuf::from("./repo")
}

/// Where the last processed artifact ids are persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// The state file path template.
    ///
    /// See: [`state_file_path`]
    pub last_artifact_id_file: String,
}

/// The Telegram chat notified about processed artifacts.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Whether notifications are sent at all.
    #[serde(default)]
    pub enabled: bool,
    /// Falls back to the `TELEGRAM_BOT_TOKEN` environment variable when empty.
    #[serde(default)]
    pub bot_token: String,
    /// The chat, group or channel to send to. Required when enabled.
    #[serde(default)]
    pub chat_id: Option<Id>,
    /// The minijinja template sent after an artifact has been processed, e.g. `{{ artifact }} #{{ artifact_id }}`.
    #[serde(default)]
    pub message_on_download: Option<String>,
    /// The Bot API root, `https://api.telegram.org` unless set.
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_owned()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: None,
            message_on_download: None,
            api_url: default_telegram_api_url(),
        }
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

impl Config {
    /// Loads the configuration from a YAML file, filling empty tokens from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the configuration is invalid.
    pub fn load<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        let mut config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;

        env::fallback(&mut config.github.token, env::GITHUB_TOKEN);
        env::fallback(&mut config.telegram.bot_token, env::TELEGRAM_BOT_TOKEN);

        config
            .validate()
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Parses and validates a YAML document without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or the configuration is invalid.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants [`serde`] cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        let repo = self.github.repo.trim();
        ensure!(!repo.is_empty(), "github.repo is empty");
        let slug = matches!(
            repo.split_once('/'),
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/')
        );
        ensure!(slug, "github.repo must look like `owner/name`, got {repo:?}");
        ensure!(
            !self.github.workflow_id.to_string().trim().is_empty(),
            "github.workflow_id is empty"
        );
        ensure!(
            !self.github.token.trim().is_empty(),
            "github.token is empty and {} is not set",
            env::GITHUB_TOKEN
        );

        ensure!(!self.artifacts.is_empty(), "no artifacts configured");
        let mut names = HashSet::new();
        for artifact in &self.artifacts {
            ensure!(!artifact.name.trim().is_empty(), "artifact name is empty");
            ensure!(
                names.insert(artifact.name.as_str()),
                "artifact {:?} is configured more than once",
                artifact.name
            );
        }

        ensure!(
            !self.state.last_artifact_id_file.trim().is_empty(),
            "state.last_artifact_id_file is empty"
        );

        if self.telegram.enabled {
            ensure!(
                !self.telegram.bot_token.trim().is_empty(),
                "telegram is enabled but telegram.bot_token is empty and {} is not set",
                env::TELEGRAM_BOT_TOKEN
            );
            ensure!(
                self.telegram.chat_id.is_some(),
                "telegram is enabled but telegram.chat_id is missing"
            );
        }

        Ok(())
    }

    /// The state file of the artifact named `artifact_name`.
    ///
    /// See: [`state_file_path`]
    pub fn state_file(&self, artifact_name: &str) -> PathBuf {
        state_file_path(
            &self.state.last_artifact_id_file,
            artifact_name,
            self.artifacts.len() > 1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
github:
  repo: octo/widgets
  workflow_id: build.yml
  token: ghp_secret
artifacts:
  - name: build-output
    files_to_extract: ["out/app.bin", ".\\docs\\readme.md"]
    extract_mode: copy
  - name: logs
    files_to_extract: "*"
    extract_mode: move
output:
  extract_dir: ./extracted
state:
  last_artifact_id_file: state/last artifact id
telegram:
  enabled: true
  bot_token: "123:abc"
  chat_id: -100123
  message_on_download: "got {{ artifact }}"
"#;

    #[test]
    fn parses_full_config() {
        let config = Config::from_yaml_str(FULL).unwrap();

        assert_eq!(config.github.repo, "octo/widgets");
        assert_eq!(config.github.workflow_id, Id::Text("build.yml".to_owned()));
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.clone_url(), "https://github.com/octo/widgets.git");

        assert_eq!(config.artifacts.len(), 2);
        assert_eq!(
            config.artifacts[0].files_to_extract,
            FileSelection::Files(vec!["out/app.bin".to_owned(), "docs/readme.md".to_owned()])
        );
        assert_eq!(config.artifacts[0].extract_mode, ExtractMode::Copy);
        assert_eq!(config.artifacts[1].files_to_extract, FileSelection::All);
        assert_eq!(config.artifacts[1].extract_mode, ExtractMode::Move);

        assert_eq!(config.output.extract_dir, PathBuf::from("./extracted"));
        assert_eq!(config.output.clone_dir, PathBuf::from("./repo"));
        assert!(!config.output.clone);

        assert!(config.telegram.enabled);
        assert_eq!(config.telegram.chat_id, Some(Id::Number(-100_123)));
        assert_eq!(config.telegram.api_url, "https://api.telegram.org");
    }

    #[test]
    fn accepts_a_single_artifact_mapping() {
        let config = Config::from_yaml_str(
            r#"
github: { repo: octo/widgets, workflow_id: 1234, token: t }
artifacts:
  name: build-output
  files_to_extract: ["out/app.bin"]
output: { extract_dir: out }
state: { last_artifact_id_file: last_id }
"#,
        )
        .unwrap();

        assert_eq!(config.github.workflow_id, Id::Number(1234));
        assert_eq!(config.artifacts.len(), 1);
        assert_eq!(config.artifacts[0].name, "build-output");
        assert_eq!(config.artifacts[0].extract_mode, ExtractMode::Copy);
        assert!(!config.telegram.enabled);
        assert_eq!(config.state_file("build-output"), PathBuf::from("last_id.txt"));
    }

    #[test]
    fn rejects_unknown_pattern() {
        let err = Config::from_yaml_str(
            r#"
github: { repo: octo/widgets, workflow_id: ci.yml, token: t }
artifacts: [{ name: a, files_to_extract: "*.bin" }]
output: { extract_dir: out }
state: { last_artifact_id_file: last_id }
"#,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("unsupported file selection"));
    }

    #[test]
    fn rejects_unknown_extract_mode() {
        assert!(
            Config::from_yaml_str(
                r#"
github: { repo: octo/widgets, workflow_id: ci.yml, token: t }
artifacts: [{ name: a, files_to_extract: "*", extract_mode: rename }]
output: { extract_dir: out }
state: { last_artifact_id_file: last_id }
"#,
            )
            .is_err()
        );
    }

    #[test]
    fn rejects_malformed_repo() {
        let err = Config::from_yaml_str(
            r#"
github: { repo: widgets, workflow_id: ci.yml, token: t }
artifacts: [{ name: a, files_to_extract: "*" }]
output: { extract_dir: out }
state: { last_artifact_id_file: last_id }
"#,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("owner/name"));
    }

    #[test]
    fn rejects_missing_token() {
        let err = Config::from_yaml_str(
            r#"
github: { repo: octo/widgets, workflow_id: ci.yml }
artifacts: [{ name: a, files_to_extract: "*" }]
output: { extract_dir: out }
state: { last_artifact_id_file: last_id }
"#,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("github.token"));
    }

    #[test]
    fn rejects_duplicate_artifacts() {
        let err = Config::from_yaml_str(
            r#"
github: { repo: octo/widgets, workflow_id: ci.yml, token: t }
artifacts:
  - { name: a, files_to_extract: "*" }
  - { name: a, files_to_extract: ["x"] }
output: { extract_dir: out }
state: { last_artifact_id_file: last_id }
"#,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("more than once"));
    }

    #[test]
    fn rejects_enabled_telegram_without_credentials() {
        let err = Config::from_yaml_str(
            r#"
github: { repo: octo/widgets, workflow_id: ci.yml, token: t }
artifacts: [{ name: a, files_to_extract: "*" }]
output: { extract_dir: out }
state: { last_artifact_id_file: last_id }
telegram: { enabled: true, chat_id: "@builds" }
"#,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("telegram.bot_token"));
    }

    #[test]
    fn selection_matching() {
        let files = FileSelection::Files(vec!["a.txt".to_owned(), "b/c.txt".to_owned()]);
        assert!(files.contains("a.txt"));
        assert!(files.contains("./a.txt"));
        assert!(files.contains("b\\c.txt"));
        assert!(!files.contains("d.txt"));
        assert!(!files.contains("b/"));

        assert!(FileSelection::All.contains("deeply/nested/file"));
        assert!(!FileSelection::All.contains("deeply/nested/"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/config.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config file"));
    }
}
