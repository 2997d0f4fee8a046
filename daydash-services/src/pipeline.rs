//! Pipeline wiring
//!
//! Connects the feed poller to the dispatcher through the bounded queue and
//! runs both until shutdown.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use daydash_core::FeedItem;
use daydash_news::{
    FeedSource, ImageEncoder, ImageProcessor, LinkResolver, NewsError, StoryResolver,
    TwitterClient, DEFAULT_MAX_REDIRECTS,
};

use crate::config::PipelineConfig;
use crate::feed_poller::FeedPoller;
use crate::shutdown::Shutdown;
use crate::story_store::{SqliteStoryStore, StoreError, StoryStore};
use crate::tweet_dispatcher::{dispatch_queue, TweetDispatcher};

/// Errors raised while assembling the pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to open story store: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to build client: {0}")]
    Client(#[from] NewsError),
}

/// Poller and dispatcher, ready to run
pub struct NewsPipeline {
    poller: Arc<FeedPoller>,
    dispatcher: Arc<TweetDispatcher>,
    queue: mpsc::Receiver<FeedItem>,
}

impl NewsPipeline {
    /// Assemble a pipeline from its collaborators
    pub fn new(
        config: &PipelineConfig,
        store: Arc<dyn StoryStore>,
        feed: Arc<dyn FeedSource>,
        resolver: Arc<dyn LinkResolver>,
        images: Arc<dyn ImageEncoder>,
        shutdown: Shutdown,
    ) -> Self {
        let dispatcher_config = config.dispatcher_config();
        let (tx, rx) = dispatch_queue(&dispatcher_config);

        let poller = FeedPoller::new(
            feed,
            Arc::clone(&store),
            tx,
            config.poller_config(),
            shutdown.clone(),
        );
        let dispatcher = TweetDispatcher::new(store, resolver, images, dispatcher_config, shutdown);

        Self {
            poller: Arc::new(poller),
            dispatcher: Arc::new(dispatcher),
            queue: rx,
        }
    }

    /// Assemble a pipeline backed by the SQLite store and the HTTP clients
    pub fn from_config(
        config: &PipelineConfig,
        shutdown: Shutdown,
    ) -> Result<(Self, Arc<SqliteStoryStore>), PipelineError> {
        let store = Arc::new(SqliteStoryStore::new(&config.db_path)?);
        info!("Story store opened at {}", config.db_path.display());

        let feed = TwitterClient::new(
            config.bearer_token.clone(),
            config.user_id.clone(),
            config.http_timeout(),
        )?
        .with_base_url(config.api_base.clone());
        let resolver = StoryResolver::new(config.http_timeout(), DEFAULT_MAX_REDIRECTS)?;
        let images = ImageProcessor::new(config.http_timeout())?;

        let pipeline = Self::new(
            config,
            store.clone(),
            Arc::new(feed),
            Arc::new(resolver),
            Arc::new(images),
            shutdown,
        );

        Ok((pipeline, store))
    }

    /// Spawn the poller and dispatcher tasks
    pub fn start(self) -> PipelineHandle {
        info!("Starting news pipeline");

        let dispatcher = tokio::spawn(Arc::clone(&self.dispatcher).run(self.queue));
        let poller = tokio::spawn(Arc::clone(&self.poller).start());

        PipelineHandle { poller, dispatcher }
    }
}

/// Running pipeline tasks
pub struct PipelineHandle {
    poller: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl PipelineHandle {
    /// Wait for both tasks to stop after shutdown has been requested
    pub async fn join(self) {
        if let Err(e) = self.poller.await {
            error!("Feed poller task failed: {}", e);
        }
        if let Err(e) = self.dispatcher.await {
            error!("Dispatcher task failed: {}", e);
        }
        info!("News pipeline stopped");
    }
}
