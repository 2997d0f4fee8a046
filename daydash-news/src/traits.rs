//! Seams between the pipeline and the outside world
//!
//! The dispatcher and poller only see these traits, so tests can swap the
//! HTTP-backed clients for in-process doubles.

use async_trait::async_trait;

use daydash_core::FeedItem;

use crate::error::NewsError;
use crate::types::ResolvedStory;

/// Source of feed items
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch items posted after `since_id` (all recent items when `None`).
    /// Items are returned newest first.
    async fn fetch_since(&self, since_id: Option<&str>) -> Result<Vec<FeedItem>, NewsError>;
}

/// Resolves a story link to its canonical URL and preview image
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn resolve(&self, link: &str) -> Result<ResolvedStory, NewsError>;
}

/// Fetches an image and turns it into an embeddable data URI
#[async_trait]
pub trait ImageEncoder: Send + Sync {
    async fn encode(&self, image_url: &str, width: u32, height: u32) -> Result<String, NewsError>;
}
