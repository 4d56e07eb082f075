//! Defines the environment variables to use.

use std::env;

/// The GitHub token, used when `github.token` is left empty in the configuration.
pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";

/// The Telegram bot token, used when `telegram.bot_token` is left empty in the configuration.
pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

/// The configuration file path, read by the command line interface.
pub const CONFIG_PATH: &str = "ARTIFACT_POLLER_CONFIG";

/// Reads a non-blank environment variable.
pub fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Fills `value` from the environment variable `key` if it is blank.
pub fn fallback(value: &mut String, key: &str) {
    if value.trim().is_empty()
        && let Some(var) = var(key)
    {
        *value = var;
    }
}
