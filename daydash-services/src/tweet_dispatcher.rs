//! Tweet Dispatcher
//!
//! Runs the per-item workflow for every feed item the poller forwards:
//! no-link guard, dedup, link resolution, best-effort image processing and
//! the story upsert. Items are processed by a bounded pool of workers
//! reading from a fixed-capacity queue.
//!
//! Upserts for the same canonical URL are serialized through a per-URL lock,
//! so concurrent items pointing at one new story produce a single story.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use daydash_core::{Entity, FeedItem, Story, StoryUpdate};
use daydash_news::{ImageEncoder, LinkResolver, NewsError};

use crate::shutdown::Shutdown;
use crate::story_store::{StoreError, StoryStore};

/// Configuration for TweetDispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of items processed concurrently
    pub workers: usize,
    /// Capacity of the inbound queue
    pub queue_capacity: usize,
    /// Cropped image width
    pub image_width: u32,
    /// Cropped image height
    pub image_height: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            queue_capacity: 256,
            image_width: 600,
            image_height: 300,
        }
    }
}

/// Why an item was dropped without touching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The item carries no link reference
    NoLink,
    /// The item id is already recorded on a story
    Duplicate,
}

/// Terminal state of one item workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Discarded(DiscardReason),
    /// A new story was inserted
    Created { story_id: i64, url: String },
    /// An update was appended to an existing story
    Appended {
        story_id: i64,
        url: String,
        updates: usize,
    },
}

/// Workflow step that touched the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStep {
    Dedup,
    Lookup,
    Insert,
    Update,
}

impl fmt::Display for StoreStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            StoreStep::Dedup => "dedup check",
            StoreStep::Lookup => "story lookup",
            StoreStep::Insert => "story insert",
            StoreStep::Update => "story update",
        };
        f.write_str(step)
    }
}

/// Errors that abort an item workflow
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to resolve link for item {tweet_id}: {source}")]
    Resolve {
        tweet_id: String,
        #[source]
        source: NewsError,
    },

    #[error("Store {step} failed for item {tweet_id}: {source}")]
    Store {
        tweet_id: String,
        step: StoreStep,
        #[source]
        source: StoreError,
    },

    #[error("Processing of item {tweet_id} cancelled by shutdown")]
    Cancelled { tweet_id: String },
}

impl DispatchError {
    fn store(tweet_id: &str, step: StoreStep) -> impl FnOnce(StoreError) -> DispatchError + '_ {
        move |source| DispatchError::Store {
            tweet_id: tweet_id.to_string(),
            step,
            source,
        }
    }
}

/// Create the bounded queue feeding the dispatcher
pub fn dispatch_queue(
    config: &DispatcherConfig,
) -> (mpsc::Sender<FeedItem>, mpsc::Receiver<FeedItem>) {
    mpsc::channel(config.queue_capacity.max(1))
}

/// Per-item workflow executor
pub struct TweetDispatcher {
    store: Arc<dyn StoryStore>,
    resolver: Arc<dyn LinkResolver>,
    images: Arc<dyn ImageEncoder>,
    config: DispatcherConfig,
    shutdown: Shutdown,
    /// Upsert locks keyed by canonical URL
    url_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TweetDispatcher {
    /// Create a new TweetDispatcher
    pub fn new(
        store: Arc<dyn StoryStore>,
        resolver: Arc<dyn LinkResolver>,
        images: Arc<dyn ImageEncoder>,
        config: DispatcherConfig,
        shutdown: Shutdown,
    ) -> Self {
        info!("Initializing TweetDispatcher");
        Self {
            store,
            resolver,
            images,
            config,
            shutdown,
            url_locks: DashMap::new(),
        }
    }

    /// Consume the queue until it closes or shutdown is requested, then wait
    /// for in-flight items to finish
    pub async fn run(self: Arc<Self>, mut queue: mpsc::Receiver<FeedItem>) {
        let workers = self.config.workers.max(1);
        info!("Starting TweetDispatcher with {} workers", workers);

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();

        loop {
            let item = tokio::select! {
                _ = self.shutdown.triggered() => break,
                item = queue.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = self.shutdown.triggered() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let dispatcher = Arc::clone(&self);
            tasks.spawn(async move {
                let _permit = permit;
                dispatcher.handle(item).await;
            });

            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!("Dispatch task failed: {}", e);
                }
            }
        }

        debug!("Waiting for {} in-flight items", tasks.len());
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Dispatch task failed: {}", e);
            }
        }

        info!("TweetDispatcher stopped");
    }

    /// Process one item and log its outcome
    pub async fn handle(&self, item: FeedItem) -> Option<DispatchOutcome> {
        match self.process(item).await {
            Ok(outcome) => {
                match &outcome {
                    DispatchOutcome::Discarded(reason) => {
                        debug!("Item discarded: {:?}", reason);
                    }
                    DispatchOutcome::Created { story_id, url } => {
                        info!("Created story {} for {}", story_id, url);
                    }
                    DispatchOutcome::Appended {
                        story_id,
                        url,
                        updates,
                    } => {
                        info!(
                            "Appended update to story {} ({} updates) for {}",
                            story_id, updates, url
                        );
                    }
                }
                Some(outcome)
            }
            Err(DispatchError::Cancelled { tweet_id }) => {
                debug!("Item {} cancelled by shutdown", tweet_id);
                None
            }
            Err(e @ DispatchError::Resolve { .. }) => {
                warn!("{}", e);
                None
            }
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }

    /// Run the full workflow for one item
    #[instrument(name = "dispatch", skip(self, item), fields(tweet_id = %item.id))]
    pub async fn process(&self, item: FeedItem) -> Result<DispatchOutcome, DispatchError> {
        let Some(link) = item.primary_link().cloned() else {
            return Ok(DispatchOutcome::Discarded(DiscardReason::NoLink));
        };

        if self
            .store
            .find_by_update_id(&item.id)
            .map_err(DispatchError::store(&item.id, StoreStep::Dedup))?
            .is_some()
        {
            return Ok(DispatchOutcome::Discarded(DiscardReason::Duplicate));
        }

        let resolved = self
            .cancellable(&item.id, self.resolver.resolve(link.target()))
            .await?
            .map_err(|source| DispatchError::Resolve {
                tweet_id: item.id.clone(),
                source,
            })?;
        debug!("Resolved {} to {}", link.target(), resolved.canonical_url);

        let mediadata = if resolved.image_url.is_empty() {
            String::new()
        } else {
            let encoded = self
                .cancellable(
                    &item.id,
                    self.images.encode(
                        &resolved.image_url,
                        self.config.image_width,
                        self.config.image_height,
                    ),
                )
                .await?;
            match encoded {
                Ok(data) => data,
                Err(e) => {
                    warn!("Image processing failed for {}: {}", resolved.image_url, e);
                    String::new()
                }
            }
        };

        let update = StoryUpdate {
            id: item.id.clone(),
            text: item.stripped_text(),
            time: item.created_at.timestamp(),
            mediaurl: resolved.image_url.clone(),
            mediadata,
        };

        let entities: Vec<Entity> = item
            .annotations
            .iter()
            .map(|a| Entity {
                kind: a.kind.clone(),
                text: a.normalized_text.clone(),
            })
            .collect();

        let lock = self.url_lock(&resolved.canonical_url);
        let outcome = match self.cancellable(&item.id, lock.lock()).await {
            Ok(_guard) => self.upsert(&resolved.canonical_url, &link.url, update, entities),
            Err(e) => Err(e),
        };
        drop(lock);
        self.release_url_lock(&resolved.canonical_url);

        outcome
    }

    /// Match the canonical URL against the store and write. Must run under
    /// the URL's lock.
    fn upsert(
        &self,
        url: &str,
        short_url: &str,
        update: StoryUpdate,
        entities: Vec<Entity>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let tweet_id = update.id.clone();

        // Another worker may have stored this item while we were resolving
        if self
            .store
            .find_by_update_id(&tweet_id)
            .map_err(DispatchError::store(&tweet_id, StoreStep::Dedup))?
            .is_some()
        {
            return Ok(DispatchOutcome::Discarded(DiscardReason::Duplicate));
        }

        let existing = self
            .store
            .find_by_url(url)
            .map_err(DispatchError::store(&tweet_id, StoreStep::Lookup))?;

        if let Some(story) = existing {
            return self.append(story, update, entities);
        }

        let mut story = Story::new(url, short_url, update.clone());
        story.merge_entities(entities.clone());

        match self.store.insert(&mut story) {
            Ok(story_id) => Ok(DispatchOutcome::Created {
                story_id,
                url: url.to_string(),
            }),
            Err(StoreError::Conflict { .. }) => {
                // Written by another process between lookup and insert
                debug!("Insert conflict for {}, retrying as append", url);
                let story = self
                    .store
                    .find_by_url(url)
                    .map_err(DispatchError::store(&tweet_id, StoreStep::Lookup))?
                    .ok_or_else(|| DispatchError::Store {
                        tweet_id: tweet_id.clone(),
                        step: StoreStep::Insert,
                        source: StoreError::Conflict {
                            url: url.to_string(),
                        },
                    })?;
                self.append(story, update, entities)
            }
            Err(StoreError::DuplicateUpdate { .. }) => {
                Ok(DispatchOutcome::Discarded(DiscardReason::Duplicate))
            }
            Err(e) => Err(DispatchError::store(&tweet_id, StoreStep::Insert)(e)),
        }
    }

    fn append(
        &self,
        mut story: Story,
        update: StoryUpdate,
        entities: Vec<Entity>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let tweet_id = update.id.clone();

        if !story.push_update(update) {
            return Ok(DispatchOutcome::Discarded(DiscardReason::Duplicate));
        }
        story.merge_entities(entities);

        match self.store.update(&story) {
            Ok(()) => Ok(DispatchOutcome::Appended {
                story_id: story.id.unwrap_or_default(),
                url: story.url.clone(),
                updates: story.updates.len(),
            }),
            Err(StoreError::DuplicateUpdate { .. }) => {
                Ok(DispatchOutcome::Discarded(DiscardReason::Duplicate))
            }
            Err(e) => Err(DispatchError::store(&tweet_id, StoreStep::Update)(e)),
        }
    }

    async fn cancellable<F: Future>(
        &self,
        tweet_id: &str,
        fut: F,
    ) -> Result<F::Output, DispatchError> {
        self.shutdown
            .run_until(fut)
            .await
            .ok_or_else(|| DispatchError::Cancelled {
                tweet_id: tweet_id.to_string(),
            })
    }

    fn url_lock(&self, url: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.url_locks
                .entry(url.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Drop the URL's lock once nobody else holds or waits on it
    fn release_url_lock(&self, url: &str) {
        self.url_locks
            .remove_if(url, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use daydash_core::FeedLink;
    use daydash_news::ResolvedStory;

    use crate::shutdown::shutdown_channel;
    use crate::story_store::SqliteStoryStore;

    struct FixedResolver;

    #[async_trait]
    impl LinkResolver for FixedResolver {
        async fn resolve(&self, _link: &str) -> Result<ResolvedStory, NewsError> {
            Ok(ResolvedStory {
                canonical_url: "http://long/story".to_string(),
                image_url: String::new(),
            })
        }
    }

    struct NoImages;

    #[async_trait]
    impl ImageEncoder for NoImages {
        async fn encode(&self, _url: &str, _w: u32, _h: u32) -> Result<String, NewsError> {
            Err(NewsError::ImageDecode("unused".to_string()))
        }
    }

    fn item(id: &str, with_link: bool) -> FeedItem {
        FeedItem {
            id: id.to_string(),
            text: "Headline http://t.co/x".to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            links: if with_link {
                vec![FeedLink {
                    url: "http://t.co/x".to_string(),
                    expanded_url: String::new(),
                    display_url: String::new(),
                }]
            } else {
                Vec::new()
            },
            annotations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_url_lock_released_after_upsert() {
        let (_trigger, shutdown) = shutdown_channel();
        let dispatcher = TweetDispatcher::new(
            Arc::new(SqliteStoryStore::new_in_memory().unwrap()),
            Arc::new(FixedResolver),
            Arc::new(NoImages),
            DispatcherConfig::default(),
            shutdown,
        );

        let outcome = dispatcher.process(item("10", true)).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Created { .. }));
        assert!(dispatcher.url_locks.is_empty());
    }

    #[tokio::test]
    async fn test_no_link_is_discarded() {
        let (_trigger, shutdown) = shutdown_channel();
        let store = Arc::new(SqliteStoryStore::new_in_memory().unwrap());
        let dispatcher = TweetDispatcher::new(
            store.clone(),
            Arc::new(FixedResolver),
            Arc::new(NoImages),
            DispatcherConfig::default(),
            shutdown,
        );

        let outcome = dispatcher.process(item("10", false)).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Discarded(DiscardReason::NoLink));
        assert_eq!(store.cursor_max().unwrap(), "");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_workflow() {
        let (trigger, shutdown) = shutdown_channel();
        let dispatcher = TweetDispatcher::new(
            Arc::new(SqliteStoryStore::new_in_memory().unwrap()),
            Arc::new(FixedResolver),
            Arc::new(NoImages),
            DispatcherConfig::default(),
            shutdown,
        );

        trigger.trigger();
        let result = dispatcher.process(item("10", true)).await;
        assert!(matches!(result, Err(DispatchError::Cancelled { .. })));
    }
}
