//! Persistent data model: feeds and the aggregate run status.

use {
    chrono::{DateTime, Utc},
    feedrelay_feed::MessageTemplate,
    serde::{Deserialize, Serialize},
};

/// Default polling interval applied when a feed does not set one.
pub const DEFAULT_SCHEDULE_MINUTES: u32 = 120;

/// A registered feed subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id:   String,
    pub name: String,
    pub url:  String,
    /// Destination chat for this feed's entries.
    pub chat_id: String,
    /// Minutes between polls.
    pub schedule_minutes: u32,
    #[serde(default)]
    pub template: MessageTemplate,
    /// Display-only timezone label; never used for scheduling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Completion time of the last poll attempt that reached the feed,
    /// whether or not it produced new entries. Not advanced on fetch
    /// failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl Feed {
    /// Create a feed with a fresh id and the default schedule/template.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            url: url.into(),
            chat_id: chat_id.into(),
            schedule_minutes: DEFAULT_SCHEDULE_MINUTES,
            template: MessageTemplate::default(),
            timezone: None,
            enabled: true,
            last_check: None,
            created_at: Utc::now(),
        }
    }
}

/// Partial update for a feed. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPatch {
    pub name:             Option<String>,
    pub url:              Option<String>,
    pub chat_id:          Option<String>,
    pub schedule_minutes: Option<u32>,
    pub template:         Option<MessageTemplate>,
    pub timezone:         Option<String>,
    pub enabled:          Option<bool>,
}

impl FeedPatch {
    pub fn apply(&self, feed: &mut Feed) {
        if let Some(name) = &self.name {
            feed.name = name.clone();
        }
        if let Some(url) = &self.url {
            feed.url = url.clone();
        }
        if let Some(chat_id) = &self.chat_id {
            feed.chat_id = chat_id.clone();
        }
        if let Some(minutes) = self.schedule_minutes {
            feed.schedule_minutes = minutes;
        }
        if let Some(template) = &self.template {
            feed.template = template.clone();
        }
        if let Some(timezone) = &self.timezone {
            feed.timezone = Some(timezone.clone());
        }
        if let Some(enabled) = self.enabled {
            feed.enabled = enabled;
        }
    }
}

/// Aggregate counters for the lifetime of the service, persisted so they
/// survive restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub entries_posted:  u64,
    pub feeds_processed: u64,
    pub errors:          u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_feed_defaults() {
        let feed = Feed::new("blog", "http://example.com/rss", "-100123");
        assert_eq!(feed.schedule_minutes, DEFAULT_SCHEDULE_MINUTES);
        assert!(feed.enabled);
        assert!(feed.last_check.is_none());
        assert!(!feed.id.is_empty());
    }

    #[test]
    fn test_patch_only_touches_set_fields() {
        let mut feed = Feed::new("blog", "http://example.com/rss", "-100123");
        let patch = FeedPatch {
            schedule_minutes: Some(30),
            enabled: Some(false),
            ..FeedPatch::default()
        };
        patch.apply(&mut feed);
        assert_eq!(feed.schedule_minutes, 30);
        assert!(!feed.enabled);
        assert_eq!(feed.name, "blog");
        assert_eq!(feed.url, "http://example.com/rss");
    }

    #[test]
    fn test_feed_serde_roundtrip() {
        let feed = Feed::new("blog", "http://example.com/rss", "-100123");
        let json = serde_json::to_string(&feed).unwrap();
        let back: Feed = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, feed.id);
        assert_eq!(back.template, feed.template);
    }
}
