//! In-memory store used in tests and for ephemeral runs.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::{
    Result,
    error::Error,
    store::FeedStore,
    types::{Feed, SystemStatus},
};

/// Non-persistent [`FeedStore`]. Everything is lost when dropped.
#[derive(Default)]
pub struct InMemoryStore {
    feeds:  Mutex<HashMap<String, Feed>>,
    posted: Mutex<HashSet<(String, String)>>,
    status: Mutex<SystemStatus>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeedStore for InMemoryStore {
    async fn load_feeds(&self) -> Result<Vec<Feed>> {
        let feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        Ok(feeds.values().cloned().collect())
    }

    async fn get_feed(&self, id: &str) -> Result<Feed> {
        let feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        feeds.get(id).cloned().ok_or_else(|| Error::feed_not_found(id))
    }

    async fn save_feed(&self, feed: &Feed) -> Result<()> {
        let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        feeds.insert(feed.id.clone(), feed.clone());
        Ok(())
    }

    async fn delete_feed(&self, id: &str) -> Result<()> {
        let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        feeds.remove(id).map(|_| ()).ok_or_else(|| Error::feed_not_found(id))
    }

    async fn set_last_check(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut feeds = self.feeds.lock().unwrap_or_else(|e| e.into_inner());
        let feed = feeds.get_mut(id).ok_or_else(|| Error::feed_not_found(id))?;
        feed.last_check = Some(at);
        Ok(())
    }

    async fn is_posted(&self, feed_id: &str, entry_id: &str) -> Result<bool> {
        let posted = self.posted.lock().unwrap_or_else(|e| e.into_inner());
        Ok(posted.contains(&(feed_id.to_string(), entry_id.to_string())))
    }

    async fn mark_posted(&self, feed_id: &str, entry_id: &str) -> Result<bool> {
        let mut posted = self.posted.lock().unwrap_or_else(|e| e.into_inner());
        Ok(posted.insert((feed_id.to_string(), entry_id.to_string())))
    }

    async fn posted_count(&self, feed_id: &str) -> Result<u64> {
        let posted = self.posted.lock().unwrap_or_else(|e| e.into_inner());
        Ok(posted.iter().filter(|(f, _)| f == feed_id).count() as u64)
    }

    async fn purge_posted(&self, feed_id: &str) -> Result<u64> {
        let mut posted = self.posted.lock().unwrap_or_else(|e| e.into_inner());
        let before = posted.len();
        posted.retain(|(f, _)| f != feed_id);
        Ok((before - posted.len()) as u64)
    }

    async fn load_status(&self) -> Result<SystemStatus> {
        let status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        Ok(status.clone())
    }

    async fn save_status(&self, status: &SystemStatus) -> Result<()> {
        let mut slot = self.status.lock().unwrap_or_else(|e| e.into_inner());
        *slot = status.clone();
        Ok(())
    }
}
