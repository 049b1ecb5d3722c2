//! Polling service: per-feed timers, registry operations, and status.

use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use {
    chrono::Utc,
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
};

use {
    feedrelay_channels::MessageSender,
    feedrelay_feed::{FeedFetcher, MessageTemplate},
    feedrelay_storage::{Feed, FeedPatch, FeedStore, SystemStatus},
};

use crate::{
    Result,
    error::Error,
    parse::parse_schedule,
    pipeline::{FeedOutcome, Pipeline, PipelineOptions},
};

/// Wake interval when no feed is scheduled.
const IDLE_WAKE_MS: u64 = 60_000;

/// Minimum retry spacing after a fetch failure. Much shorter than a
/// normal interval so a broken endpoint is retried soon; the effective
/// delay is widened to the fetch timeout when that is longer, so
/// retries never stack behind a still-pending request.
const FAILURE_RETRY_MS: u64 = 60_000;

/// A poll still marked running after this long is considered stuck and
/// its flag is cleared so the feed can be scheduled again.
const STUCK_POLL_MS: u64 = 10 * 60_000;

/// Parameters for registering a feed.
#[derive(Debug, Clone)]
pub struct FeedCreate {
    pub name:    String,
    pub url:     String,
    pub chat_id: String,
    /// Schedule string such as `"30m"` or `"2h"`. Defaults when absent
    /// or unparseable.
    pub schedule: Option<String>,
    pub template: Option<MessageTemplate>,
    pub timezone: Option<String>,
}

/// Point-in-time view of the service.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub feeds:           usize,
    pub enabled_feeds:   usize,
    pub next_poll_at_ms: Option<u64>,
    pub counters:        SystemStatus,
}

struct PollState {
    feed:            Feed,
    next_poll_at_ms: Option<u64>,
    running_at_ms:   Option<u64>,
}

impl PollState {
    fn new(feed: Feed, now: u64) -> Self {
        let next = feed.enabled.then(|| match feed.last_check {
            Some(last) => {
                last.timestamp_millis().max(0) as u64 + u64::from(feed.schedule_minutes) * 60_000
            },
            None => now,
        });
        Self {
            feed,
            next_poll_at_ms: next,
            running_at_ms: None,
        }
    }
}

/// The polling scheduler. Owns the in-memory feed mirror and drives the
/// delivery pipeline from a timer loop. Due feeds run concurrently with
/// each other; polls for the same feed never overlap.
pub struct PollService {
    store:        Arc<dyn FeedStore>,
    pipeline:     Pipeline,
    feeds:        RwLock<Vec<PollState>>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    wake_notify:  Arc<Notify>,
    running:      RwLock<bool>,
    /// Serializes read-modify-write of the persisted counters.
    status_lock: Mutex<()>,
    failure_retry_ms: u64,
}

impl PollService {
    pub fn new(
        store: Arc<dyn FeedStore>,
        fetcher: Arc<dyn FeedFetcher>,
        sender: Arc<dyn MessageSender>,
        options: PipelineOptions,
    ) -> Arc<Self> {
        let failure_retry_ms = FAILURE_RETRY_MS.max(options.fetch_timeout_secs * 1_000);
        let pipeline = Pipeline::new(Arc::clone(&store), fetcher, sender, options);
        Arc::new(Self {
            store,
            pipeline,
            feeds: RwLock::new(Vec::new()),
            timer_handle: Mutex::new(None),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
            status_lock: Mutex::new(()),
            failure_retry_ms,
        })
    }

    /// Load feeds from the store and start the timer loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let loaded = self.store.load_feeds().await?;
        info!(count = loaded.len(), "loaded feeds");

        let now = now_ms();
        {
            let mut feeds = self.feeds.write().await;
            *feeds = loaded.into_iter().map(|f| PollState::new(f, now)).collect();
        }

        let mut counters = self.store.load_status().await?;
        if counters.started_at.is_none() {
            counters.started_at = Some(Utc::now());
            self.store.save_status(&counters).await?;
        }

        *self.running.write().await = true;

        let svc = Arc::clone(self);
        let handle = tokio::spawn(async move {
            svc.timer_loop().await;
        });

        *self.timer_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the timer loop. In-flight polls are abandoned; ledger writes
    /// are single-key upserts, so an abandoned batch cannot corrupt it.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_one();

        let mut handle = self.timer_handle.lock().await;
        if let Some(h) = handle.take() {
            h.abort();
        }
        info!("poll service stopped");
    }

    /// Register a feed and schedule its first poll immediately.
    pub async fn add_feed(&self, create: FeedCreate) -> Result<Feed> {
        let mut feed = Feed::new(create.name, create.url, create.chat_id);
        if let Some(schedule) = &create.schedule {
            feed.schedule_minutes = parse_schedule(schedule);
        }
        if let Some(template) = create.template {
            feed.template = template;
        }
        feed.timezone = create.timezone;

        self.store.save_feed(&feed).await?;

        {
            let mut feeds = self.feeds.write().await;
            feeds.push(PollState {
                feed:            feed.clone(),
                next_poll_at_ms: Some(now_ms()),
                running_at_ms:   None,
            });
        }
        self.wake_notify.notify_one();

        info!(id = %feed.id, name = %feed.name, "feed added");
        Ok(feed)
    }

    /// Apply a partial update to a feed.
    pub async fn update_feed(&self, id: &str, patch: FeedPatch) -> Result<Feed> {
        let mut feed = self.store.get_feed(id).await?;
        patch.apply(&mut feed);
        self.store.save_feed(&feed).await?;

        let now = now_ms();
        {
            let mut feeds = self.feeds.write().await;
            if let Some(state) = feeds.iter_mut().find(|s| s.feed.id == id) {
                let running = state.running_at_ms;
                *state = PollState::new(feed.clone(), now);
                state.running_at_ms = running;
            }
        }
        self.wake_notify.notify_one();

        info!(id = %feed.id, name = %feed.name, "feed updated");
        Ok(feed)
    }

    /// Deactivate a feed. The feed and its ledger stay in the store, so
    /// reactivating it later does not re-deliver old entries.
    pub async fn deactivate_feed(&self, id: &str) -> Result<Feed> {
        self.update_feed(
            id,
            FeedPatch {
                enabled: Some(false),
                ..FeedPatch::default()
            },
        )
        .await
    }

    /// Physically delete a feed and its ledger rows.
    pub async fn remove_feed(&self, id: &str) -> Result<u64> {
        self.store.delete_feed(id).await?;
        let purged = self.store.purge_posted(id).await?;

        {
            let mut feeds = self.feeds.write().await;
            feeds.retain(|s| s.feed.id != id);
        }

        info!(id, purged, "feed removed");
        Ok(purged)
    }

    pub async fn list_feeds(&self) -> Vec<Feed> {
        let feeds = self.feeds.read().await;
        feeds.iter().map(|s| s.feed.clone()).collect()
    }

    /// Make one feed (or every enabled, idle feed) due right away.
    ///
    /// A feed whose poll is already in flight is rejected so the manual
    /// trigger and the scheduled poll cannot double-deliver; the ledger
    /// remains the final guard either way.
    pub async fn check_now(&self, feed_id: Option<&str>) -> Result<()> {
        let now = now_ms();
        {
            let mut feeds = self.feeds.write().await;
            match feed_id {
                Some(id) => {
                    let state = feeds
                        .iter_mut()
                        .find(|s| s.feed.id == id)
                        .ok_or_else(|| Error::feed_not_found(id))?;
                    if state.running_at_ms.is_some() {
                        return Err(Error::CycleInProgress);
                    }
                    state.next_poll_at_ms = Some(now);
                },
                None => {
                    for state in feeds
                        .iter_mut()
                        .filter(|s| s.feed.enabled && s.running_at_ms.is_none())
                    {
                        state.next_poll_at_ms = Some(now);
                    }
                },
            }
        }
        self.wake_notify.notify_one();
        Ok(())
    }

    /// Poll a single feed outside the timer loop. Used by the one-shot
    /// fetch command. Serializes against a scheduled poll of the same
    /// feed.
    pub async fn poll_feed_once(self: &Arc<Self>, id: &str) -> Result<FeedOutcome> {
        let feed = self.store.get_feed(id).await?;

        {
            let mut feeds = self.feeds.write().await;
            if let Some(state) = feeds.iter_mut().find(|s| s.feed.id == id) {
                if state.running_at_ms.is_some() {
                    return Err(Error::CycleInProgress);
                }
                state.running_at_ms = Some(now_ms());
            }
        }

        let result = self.pipeline.run_feed(&feed).await;
        let failed = result.is_err();
        let outcome = self.apply_result(&feed, result).await?;
        self.reschedule(&feed.id, failed).await;
        outcome
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        let counters = self.store.load_status().await?;
        let feeds = self.feeds.read().await;
        Ok(ServiceStatus {
            feeds: feeds.len(),
            enabled_feeds: feeds.iter().filter(|s| s.feed.enabled).count(),
            next_poll_at_ms: feeds.iter().filter_map(|s| s.next_poll_at_ms).min(),
            counters,
        })
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn timer_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let sleep_ms = self.ms_until_next_wake().await;

            if sleep_ms > 0 {
                let notify = Arc::clone(&self.wake_notify);
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {},
                    () = notify.notified() => {
                        debug!("timer loop woken by notify");
                        continue;
                    },
                }
            }

            if !*self.running.read().await {
                break;
            }

            self.process_due_feeds().await;
        }
    }

    async fn ms_until_next_wake(&self) -> u64 {
        let feeds = self.feeds.read().await;
        let now = now_ms();
        feeds
            .iter()
            .filter(|s| s.feed.enabled && s.running_at_ms.is_none())
            .filter_map(|s| s.next_poll_at_ms)
            .map(|t| t.saturating_sub(now))
            .min()
            .unwrap_or(IDLE_WAKE_MS)
    }

    /// Spawn a poll for every due feed. Each feed's cycle is its own
    /// task so one slow endpoint cannot stall the others; the running
    /// flag keeps two polls of the same feed from overlapping.
    async fn process_due_feeds(self: &Arc<Self>) {
        let now = now_ms();
        let due: Vec<Feed> = {
            let mut feeds = self.feeds.write().await;
            let mut due = Vec::new();
            for state in feeds.iter_mut() {
                if let Some(started) = state.running_at_ms {
                    if now.saturating_sub(started) > STUCK_POLL_MS {
                        warn!(feed = %state.feed.name, "clearing stuck poll");
                        state.running_at_ms = None;
                    }
                }
                if state.feed.enabled
                    && state.running_at_ms.is_none()
                    && state.next_poll_at_ms.is_some_and(|t| t <= now)
                {
                    // Mark as running under the write lock BEFORE spawning,
                    // so the next tick won't pick up the same feed again.
                    state.running_at_ms = Some(now);
                    due.push(state.feed.clone());
                }
            }
            due
        };

        for feed in due {
            let svc = Arc::clone(self);
            tokio::spawn(async move {
                svc.execute_poll(feed).await;
            });
        }
    }

    async fn execute_poll(self: &Arc<Self>, feed: Feed) {
        debug!(feed = %feed.name, "poll starting");
        let result = self.pipeline.run_feed(&feed).await;
        let failed = result.is_err();
        if let Err(err) = self.apply_result(&feed, result).await {
            error!(feed = %feed.name, error = %err, "failed to record poll outcome");
        }
        self.reschedule(&feed.id, failed).await;
    }

    /// Fold one poll's result into the persisted counters.
    async fn apply_result(
        &self,
        feed: &Feed,
        result: Result<FeedOutcome>,
    ) -> Result<Result<FeedOutcome>> {
        let _guard = self.status_lock.lock().await;

        let mut counters = self.store.load_status().await?;

        let wrapped = match result {
            Ok(outcome) => {
                counters.last_check = Some(Utc::now());
                counters.feeds_processed += 1;
                counters.entries_posted += outcome.posted as u64;
                counters.errors += outcome.send_errors as u64;
                Ok(outcome)
            },
            Err(err) => {
                error!(feed = %feed.name, url = %feed.url, error = %err, "feed poll failed");
                counters.errors += 1;
                Err(err)
            },
        };

        self.store.save_status(&counters).await?;
        Ok(wrapped)
    }

    /// Clear the running flag and set the next due time. A completed
    /// poll waits a full interval from now (skipped cycles are absorbed,
    /// never replayed); a failed fetch goes into backoff and retries
    /// sooner.
    async fn reschedule(&self, feed_id: &str, failed: bool) {
        let now = now_ms();
        let mut feeds = self.feeds.write().await;
        if let Some(state) = feeds.iter_mut().find(|s| s.feed.id == feed_id) {
            if let Ok(fresh) = self.store.get_feed(feed_id).await {
                state.feed = fresh;
            }
            state.running_at_ms = None;
            state.next_poll_at_ms = state.feed.enabled.then(|| {
                if failed {
                    now + self.failure_retry_ms
                } else {
                    now + u64::from(state.feed.schedule_minutes) * 60_000
                }
            });
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
