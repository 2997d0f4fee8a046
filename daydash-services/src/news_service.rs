//! News Service
//!
//! Read side of the pipeline: serves the most recent stories and the
//! news report built from them.

use std::sync::Arc;

use tracing::{debug, instrument};

use daydash_core::{DaydashError, DaydashResult, NewsReport, Story};

use crate::story_store::StoryStore;

/// Report version used when none is configured
pub const DEFAULT_REPORT_VERSION: &str = "1";

/// Read-only view over the story store
pub struct NewsService {
    store: Arc<dyn StoryStore>,
    version: String,
}

impl NewsService {
    /// Create a new NewsService
    pub fn new(store: Arc<dyn StoryStore>) -> Self {
        Self {
            store,
            version: DEFAULT_REPORT_VERSION.to_string(),
        }
    }

    /// Set the version string stamped on reports
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Up to `limit` stories, most recently updated first
    #[instrument(skip(self))]
    pub async fn recent_stories(&self, limit: usize) -> DaydashResult<Vec<Story>> {
        let stories = self
            .store
            .recent_stories(limit)
            .map_err(|e| DaydashError::storage(e.to_string()))?;

        debug!("Loaded {} recent stories", stories.len());
        Ok(stories)
    }

    /// News report over the `limit` most recent stories
    pub async fn report(&self, limit: usize) -> DaydashResult<NewsReport> {
        let stories = self.recent_stories(limit).await?;
        Ok(NewsReport::from_stories(&stories, self.version.clone()))
    }
}
