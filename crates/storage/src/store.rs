//! Persistence trait for feeds, the posted-entry ledger, and run status.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::{
    Result,
    types::{Feed, SystemStatus},
};

/// Persistence backend for the relay.
///
/// The ledger methods give at-most-once delivery its memory: an entry is
/// recorded only after a send is confirmed, and recording the same
/// (feed, entry) pair twice is a no-op.
#[async_trait]
pub trait FeedStore: Send + Sync {
    async fn load_feeds(&self) -> Result<Vec<Feed>>;
    async fn get_feed(&self, id: &str) -> Result<Feed>;
    /// Insert or replace a feed by id.
    async fn save_feed(&self, feed: &Feed) -> Result<()>;
    async fn delete_feed(&self, id: &str) -> Result<()>;
    async fn set_last_check(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Whether the ledger already has this (feed, entry) pair.
    async fn is_posted(&self, feed_id: &str, entry_id: &str) -> Result<bool>;
    /// Record a delivered entry. Returns `true` if the pair was newly
    /// recorded, `false` if it was already present.
    async fn mark_posted(&self, feed_id: &str, entry_id: &str) -> Result<bool>;
    async fn posted_count(&self, feed_id: &str) -> Result<u64>;
    /// Drop all ledger rows for a feed. Returns the number removed.
    async fn purge_posted(&self, feed_id: &str) -> Result<u64>;

    async fn load_status(&self) -> Result<SystemStatus>;
    async fn save_status(&self, status: &SystemStatus) -> Result<()>;
}
