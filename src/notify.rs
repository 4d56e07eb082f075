//! Best-effort notifications through the Telegram Bot API.

use anyhow::{Context as _, Result, bail};
use chrono::{SecondsFormat, Utc};
use minijinja::{AutoEscape, Environment, Value, context};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    config::{Id, TelegramConfig},
    workflow::{WorkflowRun, artifact::Artifact},
};

/// The message sent when `telegram.message_on_download` is not configured.
pub const DEFAULT_MESSAGE: &str = "📦 <b>{{ artifact }}</b> #{{ artifact_id }} downloaded from {{ repo }}\n\
    run {{ run_id }} · <code>{{ commit }}</code> {{ commit_message }}";

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

/// Sends messages to one Telegram chat. Failures are logged and never returned.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    enabled: bool,
    api_url: String,
    bot_token: String,
    chat_id: Option<Id>,
    template: String,
}

impl TelegramNotifier {
    /// Creates a notifier from the `telegram` section of the configuration.
    pub fn new(client: reqwest::Client, config: &TelegramConfig) -> Self {
        Self {
            client,
            enabled: config.enabled,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            template: config
                .message_on_download
                .clone()
                .unwrap_or_else(|| DEFAULT_MESSAGE.to_owned()),
        }
    }

    /// Whether messages are actually sent.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The configured message template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Sends `text` as an HTML formatted message. Does nothing if notifications are disabled.
    pub async fn notify(&self, text: &str) {
        if !self.enabled {
            debug!("telegram notifications are disabled, skipping");
            return;
        }

        match self.send(text).await {
            Ok(()) => info!("sent telegram notification"),
            Err(err) => warn!("failed to send telegram notification: {err:#}"),
        }
    }

    /// Renders the configured template for a downloaded artifact and sends it.
    pub async fn notify_download(&self, context: &MessageContext<'_>) {
        if !self.enabled {
            debug!("telegram notifications are disabled, skipping");
            return;
        }

        match render_message(&self.template, context) {
            Ok(text) => self.notify(&text).await,
            Err(err) => warn!("failed to render telegram notification: {err:#}"),
        }
    }

    // The request URL embeds the bot token, so reqwest errors lose their URL before being reported
    async fn send(&self, text: &str) -> Result<()> {
        let Some(chat_id) = &self.chat_id else {
            bail!("no chat id configured");
        };
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .context("failed to reach the Telegram Bot API")?;

        let status = response.status();
        // Telegram explains failures in the body, so read it before checking the status
        let reply = response
            .json::<TelegramResponse>()
            .await
            .map_err(reqwest::Error::without_url);

        match reply {
            Ok(reply) if status.is_success() && reply.ok => Ok(()),
            Ok(reply) => bail!(
                "Telegram Bot API answered {status}: {}",
                reply.description.unwrap_or_default()
            ),
            Err(err) if status.is_success() => {
                Err(err).context("failed to parse the Telegram Bot API response")
            }
            Err(_) => bail!("Telegram Bot API answered {status}"),
        }
    }
}

/// The values available to a message template.
#[derive(Debug, Clone, Copy)]
pub struct MessageContext<'a> {
    /// The `owner/name` of the polled repository.
    pub repo: &'a str,
    /// The run the artifact belongs to.
    pub run: &'a WorkflowRun,
    /// The downloaded artifact.
    pub artifact: &'a Artifact,
    /// The number of files extracted from the artifact.
    pub files: usize,
}

impl MessageContext<'_> {
    fn values(&self) -> Value {
        let commit = self.run.commit();
        context! {
            repo => self.repo,
            artifact => &self.artifact.name,
            artifact_id => self.artifact.id,
            run_id => self.run.id,
            commit => commit.get(..7).unwrap_or(commit),
            commit_sha => commit,
            commit_message => self.run.commit_title(),
            branch => self.run.head_branch.as_deref().unwrap_or_default(),
            files => self.files,
            time => Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Renders a minijinja template such as `{{ artifact }} #{{ artifact_id }}` with the values of `context`.
///
/// Substituted values are HTML escaped; markup written in the template itself is kept as is. Unknown variables
/// render as nothing.
///
/// # Errors
///
/// Returns an error if the template has a syntax error or fails to evaluate.
pub fn render_message(template: &str, context: &MessageContext<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::Html);

    env.render_str(template, context.values())
        .context("failed to render telegram.message_on_download")
}
