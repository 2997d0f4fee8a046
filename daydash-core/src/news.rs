//! Client-facing news report
//!
//! The read-only reporting endpoint maps each story's latest update into a
//! flat [`NewsItem`].

use serde::{Deserialize, Serialize};

use crate::Story;

/// A single news item as served to dashboard clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Feed item id of the story's latest update
    pub id: String,
    /// Unix timestamp of the latest update
    #[serde(rename = "createtime")]
    pub create_time: i64,
    pub text: String,
    #[serde(rename = "mediaurl")]
    pub media_url: String,
    #[serde(rename = "mediadata")]
    pub media_data: String,
    /// Canonical story URL
    #[serde(rename = "storyurl")]
    pub story_url: String,
    /// Short link, useful for QR code generation
    #[serde(rename = "shorturl", default, skip_serializing_if = "String::is_empty")]
    pub short_url: String,
}

/// News report response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsReport {
    pub items: Vec<NewsItem>,
    pub version: String,
}

impl NewsItem {
    /// Build from a story's latest update. `None` for a story without updates.
    pub fn from_story(story: &Story) -> Option<Self> {
        let latest = story.latest_update()?;
        Some(Self {
            id: latest.id.clone(),
            create_time: latest.time,
            text: latest.text.clone(),
            media_url: latest.mediaurl.clone(),
            media_data: latest.mediadata.clone(),
            story_url: story.url.clone(),
            short_url: story.short_url.clone(),
        })
    }
}

impl NewsReport {
    /// Build a report sorted newest first by create time
    pub fn from_stories(stories: &[Story], version: impl Into<String>) -> Self {
        let mut items: Vec<NewsItem> = stories.iter().filter_map(NewsItem::from_story).collect();
        items.sort_by(|a, b| b.create_time.cmp(&a.create_time));

        Self {
            items,
            version: version.into(),
        }
    }
}
