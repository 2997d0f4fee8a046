//! Feed Poller
//!
//! Timer-driven loop that fetches feed items newer than the store cursor
//! and forwards them to the dispatcher queue, oldest first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

use daydash_core::FeedItem;
use daydash_news::{FeedSource, NewsError};

use crate::shutdown::Shutdown;
use crate::story_store::{StoreError, StoryStore};

/// Configuration for FeedPoller
#[derive(Debug, Clone)]
pub struct FeedPollerConfig {
    /// Time between ticks
    pub poll_interval: Duration,
}

impl Default for FeedPollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(120),
        }
    }
}

/// Errors that end a single poll tick
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Failed to read cursor: {0}")]
    Cursor(#[from] StoreError),

    #[error("Feed fetch failed: {0}")]
    Fetch(#[from] NewsError),

    #[error("Dispatcher queue closed")]
    QueueClosed,

    #[error("Poll cancelled by shutdown")]
    Cancelled,
}

/// Background service polling the feed
pub struct FeedPoller {
    feed: Arc<dyn FeedSource>,
    store: Arc<dyn StoryStore>,
    queue: mpsc::Sender<FeedItem>,
    config: FeedPollerConfig,
    shutdown: Shutdown,
    ticks: AtomicU64,
}

impl FeedPoller {
    /// Create a new FeedPoller
    pub fn new(
        feed: Arc<dyn FeedSource>,
        store: Arc<dyn StoryStore>,
        queue: mpsc::Sender<FeedItem>,
        config: FeedPollerConfig,
        shutdown: Shutdown,
    ) -> Self {
        info!("Initializing FeedPoller");
        Self {
            feed,
            store,
            queue,
            config,
            shutdown,
            ticks: AtomicU64::new(0),
        }
    }

    /// Tick until shutdown. Each tick runs as its own task so a slow fetch
    /// never delays the timer.
    pub async fn start(self: Arc<Self>) {
        info!(
            "Starting FeedPoller with poll interval {}s",
            self.config.poll_interval.as_secs()
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.triggered() => break,
                _ = ticker.tick() => {}
            }

            let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
            let poller = Arc::clone(&self);

            tokio::spawn(
                async move {
                    poller.run_tick().await;
                }
                .instrument(info_span!("poll_tick", tick)),
            );
        }

        info!("FeedPoller stopped");
    }

    async fn run_tick(&self) {
        match self.poll_once().await {
            Ok(0) => debug!("No new feed items"),
            Ok(count) => info!("Forwarded {} feed items", count),
            Err(PollError::Cancelled) => debug!("Poll cancelled by shutdown"),
            Err(PollError::Fetch(e)) if e.is_transient() => {
                warn!("Feed fetch failed, retrying next tick: {}", e)
            }
            Err(e) => error!("Poll failed: {}", e),
        }
    }

    /// Fetch items after the cursor and enqueue them. Returns the number of
    /// items forwarded.
    pub async fn poll_once(&self) -> Result<usize, PollError> {
        let cursor = self.store.cursor_max()?;
        let since = (!cursor.is_empty()).then_some(cursor.as_str());
        debug!("Polling feed since {:?}", since);

        let items = self
            .shutdown
            .run_until(self.feed.fetch_since(since))
            .await
            .ok_or(PollError::Cancelled)??;

        let mut forwarded = 0;
        for item in items.into_iter().rev() {
            self.shutdown
                .run_until(self.queue.send(item))
                .await
                .ok_or(PollError::Cancelled)?
                .map_err(|_| PollError::QueueClosed)?;
            forwarded += 1;
        }

        Ok(forwarded)
    }
}
