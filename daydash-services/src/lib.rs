//! Ingestion services for the Daydash news pipeline
//!
//! This crate owns the story store and the two long-running services that
//! feed it: the feed poller and the tweet dispatcher.

pub mod config;
pub mod feed_poller;
pub mod news_service;
pub mod pipeline;
pub mod shutdown;
pub mod story_store;
pub mod tweet_dispatcher;

pub use config::{ConfigError, PipelineConfig};
pub use feed_poller::{FeedPoller, FeedPollerConfig, PollError};
pub use news_service::NewsService;
pub use pipeline::{NewsPipeline, PipelineError, PipelineHandle};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use story_store::{CursorOrdering, SqliteStoryStore, StoreError, StoryStore};
pub use tweet_dispatcher::{
    dispatch_queue, DiscardReason, DispatchError, DispatchOutcome, DispatcherConfig, StoreStep,
    TweetDispatcher,
};
