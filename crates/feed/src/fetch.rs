//! HTTP feed fetching and parsing.

use std::time::Duration;

use {async_trait::async_trait, tracing::debug};

use crate::{
    error::{FetchError, Result},
    types::Entry,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("feedrelay/", env!("CARGO_PKG_VERSION"));

/// Result of probing a feed URL, used to validate a feed before it is
/// registered.
#[derive(Debug, Clone)]
pub struct FeedProbe {
    pub title:       Option<String>,
    pub entry_count: usize,
}

/// Fetches and parses a syndication feed. The scheduler is generic over
/// this trait so polling cycles can run against a mock in tests.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the feed at `url` and return its entries, most recent first
    /// as published by the feed.
    async fn fetch(&self, url: &str) -> Result<Vec<Entry>>;

    /// Fetch the feed and report its title and entry count without
    /// returning the entries themselves.
    async fn probe(&self, url: &str) -> Result<FeedProbe>;
}

/// [`FeedFetcher`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client:       reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, timeout_secs })
    }

    async fn fetch_parsed(&self, url: &str) -> Result<feed_rs::model::Feed> {
        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout { seconds: self.timeout_secs }
            } else {
                FetchError::Transport(err)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16() });
        }

        let body = response.bytes().await?;
        let feed = feed_rs::parser::parse(body.as_ref())
            .map_err(|err| FetchError::parse(err.to_string()))?;
        debug!(url, entries = feed.entries.len(), "fetched feed");
        Ok(feed)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        match Self::new(DEFAULT_TIMEOUT_SECS) {
            Ok(fetcher) => fetcher,
            Err(_) => Self {
                client:       reqwest::Client::new(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
        }
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<Entry>> {
        let feed = self.fetch_parsed(url).await?;
        Ok(feed.entries.into_iter().map(map_entry).collect())
    }

    async fn probe(&self, url: &str) -> Result<FeedProbe> {
        let feed = self.fetch_parsed(url).await?;
        Ok(FeedProbe {
            title:       feed.title.map(|t| t.content),
            entry_count: feed.entries.len(),
        })
    }
}

fn map_entry(entry: feed_rs::model::Entry) -> Entry {
    let link = entry.links.first().map(|l| l.href.clone());
    Entry {
        id:      non_empty(entry.id),
        title:   entry.title.map(|t| t.content),
        link,
        summary: entry.summary.map(|s| s.content),
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}
