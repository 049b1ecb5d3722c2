//! Config schema for the relay.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level config, loaded from `feedrelay.{toml,yaml,yml,json}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub telegram: TelegramConfig,
    pub storage:  StorageConfig,
    pub poll:     PollConfig,
    /// Feeds to register at startup if their URL is not already known.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub feeds: Vec<FeedSeed>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token. The `TELEGRAM_BOT_TOKEN` env var takes precedence.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Interval for feeds that do not set their own schedule.
    pub default_schedule_minutes: u32,
    /// Most recent entries considered per poll.
    pub entries_per_poll: usize,
    /// Pause between consecutive sends to the same chat.
    pub send_delay_ms: u64,
    pub fetch_timeout_secs: u64,
    pub disable_link_preview: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_schedule_minutes: 120,
            entries_per_poll: 10,
            send_delay_ms: 1_000,
            fetch_timeout_secs: 30,
            disable_link_preview: false,
        }
    }
}

/// A feed declared in the config file rather than via the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSeed {
    pub name:    String,
    pub url:     String,
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl RelayConfig {
    /// Resolved bot token: the env var wins over the config file.
    #[must_use]
    pub fn telegram_token(&self) -> Option<String> {
        std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.telegram.token.clone())
            .filter(|t| !t.trim().is_empty())
    }

    /// Database file path, falling back to the platform data directory.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.storage.path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "feedrelay")
            .map(|dirs| dirs.data_dir().join("feedrelay.db"))
            .unwrap_or_else(|| PathBuf::from("feedrelay.db"))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.poll.default_schedule_minutes, 120);
        assert_eq!(cfg.poll.entries_per_poll, 10);
        assert_eq!(cfg.poll.send_delay_ms, 1_000);
        assert!(cfg.feeds.is_empty());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [telegram]
            token = "abc"

            [[feeds]]
            name = "blog"
            url = "http://example.com/rss"
            chat_id = "-100"
            schedule = "30m"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.telegram.token.as_deref(), Some("abc"));
        assert_eq!(cfg.poll.entries_per_poll, 10);
        assert_eq!(cfg.feeds.len(), 1);
        assert_eq!(cfg.feeds[0].schedule.as_deref(), Some("30m"));
    }
}
