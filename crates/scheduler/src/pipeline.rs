//! Per-feed delivery pipeline: fetch, dedup against the ledger, render,
//! send, record.

use std::{sync::Arc, time::Duration};

use {
    chrono::Utc,
    tracing::{debug, info, warn},
};

use {
    feedrelay_channels::{MessageSender, SendOptions},
    feedrelay_feed::{FeedFetcher, entry_id, render},
    feedrelay_storage::{Feed, FeedStore},
};

use crate::Result;

/// Tuning knobs for a polling cycle.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Only this many of the most recent entries are considered per poll.
    pub entries_per_poll: usize,
    /// Pause between consecutive sends to the same chat.
    pub send_delay_ms: u64,
    /// The fetcher's request timeout. The scheduler spaces its
    /// failure retries no tighter than this.
    pub fetch_timeout_secs: u64,
    pub disable_link_preview: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            entries_per_poll: 10,
            send_delay_ms: 1_000,
            fetch_timeout_secs: 30,
            disable_link_preview: false,
        }
    }
}

/// What a single feed poll did.
#[derive(Debug, Clone, Default)]
pub struct FeedOutcome {
    pub posted:       usize,
    pub duplicates:   usize,
    pub unidentified: usize,
    pub send_errors:  usize,
}

/// Polls one feed and forwards its new entries.
pub struct Pipeline {
    store:   Arc<dyn FeedStore>,
    fetcher: Arc<dyn FeedFetcher>,
    sender:  Arc<dyn MessageSender>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn FeedStore>,
        fetcher: Arc<dyn FeedFetcher>,
        sender: Arc<dyn MessageSender>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            fetcher,
            sender,
            options,
        }
    }

    /// Poll `feed` once.
    ///
    /// A fetch or parse failure propagates without touching `last_check`,
    /// so the feed stays due. After a successful fetch the window's
    /// entries are delivered in feed-provided order; an entry is recorded
    /// in the ledger only once its send is confirmed, and a failed send
    /// leaves it unrecorded for the next cycle without blocking the rest
    /// of the batch. Entries with no usable identity are skipped outright.
    pub async fn run_feed(&self, feed: &Feed) -> Result<FeedOutcome> {
        let entries = self.fetcher.fetch(&feed.url).await?;

        let mut outcome = FeedOutcome::default();
        let send_options = SendOptions {
            disable_link_preview: self.options.disable_link_preview,
        };

        let window: Vec<_> = entries.into_iter().take(self.options.entries_per_poll).collect();

        for entry in &window {
            let Some(id) = entry_id(entry) else {
                debug!(feed = %feed.name, "entry has no id or link, skipping");
                outcome.unidentified += 1;
                continue;
            };

            if self.store.is_posted(&feed.id, id).await? {
                outcome.duplicates += 1;
                continue;
            }

            let text = render(entry, &feed.template);
            match self.sender.send(&feed.chat_id, &text, &send_options).await {
                Ok(()) => {
                    if !self.store.mark_posted(&feed.id, id).await? {
                        debug!(feed = %feed.name, entry = id, "entry already in ledger");
                    }
                    outcome.posted += 1;
                    if self.options.send_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.options.send_delay_ms))
                            .await;
                    }
                },
                Err(err) => {
                    outcome.send_errors += 1;
                    warn!(
                        feed = %feed.name,
                        chat_id = %feed.chat_id,
                        entry = id,
                        error = %err,
                        "send failed, entry left unrecorded"
                    );
                },
            }
        }

        self.store.set_last_check(&feed.id, Utc::now()).await?;

        info!(
            feed = %feed.name,
            posted = outcome.posted,
            duplicates = outcome.duplicates,
            errors = outcome.send_errors,
            "feed poll finished"
        );
        Ok(outcome)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;

    use {
        feedrelay_channels::{MessageSender, SendError, SendOptions},
        feedrelay_feed::{Entry, FeedFetcher, FeedProbe, FetchError},
        feedrelay_storage::{Feed, FeedStore, InMemoryStore},
    };

    use super::*;

    pub(crate) fn make_entry(id: &str, title: &str) -> Entry {
        Entry {
            id:      Some(id.to_string()),
            title:   Some(title.to_string()),
            link:    Some(format!("http://example.com/{id}")),
            summary: None,
        }
    }

    /// Serves a fixed entry list, or an error when `fail` is set.
    pub(crate) struct StaticFetcher {
        pub entries: Mutex<Vec<Entry>>,
        pub fail:    Mutex<bool>,
    }

    impl StaticFetcher {
        pub(crate) fn new(entries: Vec<Entry>) -> Arc<Self> {
            Arc::new(Self {
                entries: Mutex::new(entries),
                fail:    Mutex::new(false),
            })
        }
    }

    #[async_trait]
    impl FeedFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str) -> feedrelay_feed::Result<Vec<Entry>> {
            if *self.fail.lock().unwrap() {
                return Err(FetchError::Status { status: 503 });
            }
            Ok(self.entries.lock().unwrap().clone())
        }

        async fn probe(&self, url: &str) -> feedrelay_feed::Result<FeedProbe> {
            let entries = self.fetch(url).await?;
            Ok(FeedProbe {
                title:       Some("static".into()),
                entry_count: entries.len(),
            })
        }
    }

    /// Records every delivered message; can be told to fail specific
    /// texts a number of times.
    #[derive(Default)]
    pub(crate) struct RecordingSender {
        pub sent:      Mutex<Vec<(String, String)>>,
        pub fail_with: Mutex<HashMap<String, (usize, bool)>>,
    }

    impl RecordingSender {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Fail sends whose text contains `needle`, `times` times.
        /// `chat_level` makes the failure a Forbidden error.
        pub(crate) fn fail_containing(&self, needle: &str, times: usize, chat_level: bool) {
            self.fail_with
                .lock()
                .unwrap()
                .insert(needle.to_string(), (times, chat_level));
        }
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn send(
            &self,
            chat_id: &str,
            text: &str,
            _options: &SendOptions,
        ) -> feedrelay_channels::Result<()> {
            {
                let mut failures = self.fail_with.lock().unwrap();
                let matched = failures
                    .iter()
                    .find(|(needle, (times, _))| text.contains(*needle) && *times > 0)
                    .map(|(needle, (_, chat_level))| (needle.clone(), *chat_level));
                if let Some((needle, chat_level)) = matched {
                    if let Some((times, _)) = failures.get_mut(&needle) {
                        *times -= 1;
                    }
                    return Err(if chat_level {
                        SendError::Forbidden {
                            description: "bot was blocked".into(),
                        }
                    } else {
                        SendError::transport("connection reset")
                    });
                }
            }
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    pub(crate) fn make_pipeline(
        store: Arc<InMemoryStore>,
        fetcher: Arc<StaticFetcher>,
        sender: Arc<RecordingSender>,
    ) -> Pipeline {
        let options = PipelineOptions {
            send_delay_ms: 0,
            ..PipelineOptions::default()
        };
        Pipeline::new(store, fetcher, sender, options)
    }

    async fn make_feed(store: &InMemoryStore) -> Feed {
        let feed = Feed::new("blog", "http://example.com/rss", "-100");
        store.save_feed(&feed).await.unwrap();
        feed
    }

    #[tokio::test]
    async fn test_new_entries_posted_once() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = StaticFetcher::new(vec![make_entry("e1", "One"), make_entry("e2", "Two")]);
        let sender = RecordingSender::new();
        let pipeline = make_pipeline(store.clone(), fetcher, sender.clone());
        let feed = make_feed(&store).await;

        let first = pipeline.run_feed(&feed).await.unwrap();
        assert_eq!(first.posted, 2);
        assert_eq!(sender.sent.lock().unwrap().len(), 2);

        let second = pipeline.run_feed(&feed).await.unwrap();
        assert_eq!(second.posted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(sender.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_entries_delivered_in_feed_order() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher =
            StaticFetcher::new(vec![make_entry("first", "First"), make_entry("second", "Second")]);
        let sender = RecordingSender::new();
        let pipeline = make_pipeline(store.clone(), fetcher, sender.clone());
        let feed = make_feed(&store).await;

        pipeline.run_feed(&feed).await.unwrap();
        let sent = sender.sent.lock().unwrap();
        assert!(sent[0].1.contains("First"));
        assert!(sent[1].1.contains("Second"));
    }

    #[tokio::test]
    async fn test_window_limited_to_most_recent() {
        let store = Arc::new(InMemoryStore::new());
        let entries: Vec<_> = (0..25)
            .map(|i| make_entry(&format!("e{i}"), &format!("Entry {i}")))
            .collect();
        let fetcher = StaticFetcher::new(entries);
        let sender = RecordingSender::new();
        let pipeline = make_pipeline(store.clone(), fetcher, sender.clone());
        let feed = make_feed(&store).await;

        let outcome = pipeline.run_feed(&feed).await.unwrap();
        assert_eq!(outcome.posted, 10);
        // The oldest entries beyond the window were never considered.
        assert!(!store.is_posted(&feed.id, "e15").await.unwrap());
        assert!(store.is_posted(&feed.id, "e9").await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_last_check() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = StaticFetcher::new(vec![make_entry("e1", "One")]);
        let sender = RecordingSender::new();
        let pipeline = make_pipeline(store.clone(), fetcher.clone(), sender);
        let feed = make_feed(&store).await;

        *fetcher.fail.lock().unwrap() = true;
        assert!(pipeline.run_feed(&feed).await.is_err());
        assert!(store.get_feed(&feed.id).await.unwrap().last_check.is_none());

        *fetcher.fail.lock().unwrap() = false;
        pipeline.run_feed(&feed).await.unwrap();
        assert!(store.get_feed(&feed.id).await.unwrap().last_check.is_some());
    }

    #[tokio::test]
    async fn test_send_failure_mid_batch_retried_next_cycle() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = StaticFetcher::new(vec![
            make_entry("e3", "Three"),
            make_entry("e2", "Two"),
            make_entry("e1", "One"),
        ]);
        let sender = RecordingSender::new();
        sender.fail_containing("Two", 1, false);
        let pipeline = make_pipeline(store.clone(), fetcher, sender.clone());
        let feed = make_feed(&store).await;

        let first = pipeline.run_feed(&feed).await.unwrap();
        assert_eq!(first.posted, 2);
        assert_eq!(first.send_errors, 1);
        assert!(!store.is_posted(&feed.id, "e2").await.unwrap());
        // The failed send did not block the rest of the batch.
        assert!(store.is_posted(&feed.id, "e3").await.unwrap());

        let second = pipeline.run_feed(&feed).await.unwrap();
        assert_eq!(second.posted, 1);
        assert!(store.is_posted(&feed.id, "e2").await.unwrap());
    }

    #[tokio::test]
    async fn test_forbidden_chat_does_not_block_batch() {
        let store = Arc::new(InMemoryStore::new());
        let fetcher = StaticFetcher::new(vec![
            make_entry("e3", "Three"),
            make_entry("e2", "Two"),
            make_entry("e1", "One"),
        ]);
        let sender = RecordingSender::new();
        sender.fail_containing("Three", 1, true);
        let pipeline = make_pipeline(store.clone(), fetcher, sender.clone());
        let feed = make_feed(&store).await;

        let outcome = pipeline.run_feed(&feed).await.unwrap();
        assert_eq!(outcome.posted, 2);
        assert_eq!(outcome.send_errors, 1);
        assert!(!store.is_posted(&feed.id, "e3").await.unwrap());
    }

    #[tokio::test]
    async fn test_unidentified_entries_skipped() {
        let store = Arc::new(InMemoryStore::new());
        let anonymous = Entry {
            id:      None,
            title:   Some("ghost".into()),
            link:    None,
            summary: None,
        };
        let fetcher = StaticFetcher::new(vec![make_entry("e1", "One"), anonymous]);
        let sender = RecordingSender::new();
        let pipeline = make_pipeline(store.clone(), fetcher, sender.clone());
        let feed = make_feed(&store).await;

        let outcome = pipeline.run_feed(&feed).await.unwrap();
        assert_eq!(outcome.posted, 1);
        assert_eq!(outcome.unidentified, 1);
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
    }
}
