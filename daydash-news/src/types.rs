//! Wire types for the Twitter v2 timeline API and resolver output

use chrono::{DateTime, Utc};
use serde::Deserialize;

use daydash_core::{FeedAnnotation, FeedItem, FeedLink};

// ============================================================================
// Twitter v2 Types
// ============================================================================

/// Response to a user timeline request
#[derive(Debug, Deserialize)]
pub struct TwitterTimelineResponse {
    /// Tweets, newest first. Absent when there is nothing new.
    #[serde(default)]
    pub data: Vec<Tweet>,
    /// Pagination metadata
    #[serde(default)]
    pub meta: TimelineMeta,
}

/// Pagination metadata for a timeline page
#[derive(Debug, Default, Deserialize)]
pub struct TimelineMeta {
    pub oldest_id: Option<String>,
    pub newest_id: Option<String>,
    #[serde(default)]
    pub result_count: u32,
    pub next_token: Option<String>,
}

/// A single tweet
#[derive(Debug, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub entities: TweetEntities,
}

/// Entities attached to a tweet
#[derive(Debug, Default, Deserialize)]
pub struct TweetEntities {
    #[serde(default)]
    pub annotations: Vec<TweetAnnotation>,
    #[serde(default)]
    pub urls: Vec<TweetUrl>,
}

/// Named entity annotation
#[derive(Debug, Deserialize)]
pub struct TweetAnnotation {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub probability: f64,
    #[serde(rename = "type")]
    pub kind: String,
    pub normalized_text: String,
}

/// URL entity
#[derive(Debug, Deserialize)]
pub struct TweetUrl {
    pub start: usize,
    pub end: usize,
    pub url: String,
    #[serde(default)]
    pub expanded_url: String,
    #[serde(default)]
    pub display_url: String,
}

impl From<Tweet> for FeedItem {
    fn from(tweet: Tweet) -> Self {
        let links = tweet
            .entities
            .urls
            .into_iter()
            .map(|u| FeedLink {
                url: u.url,
                expanded_url: u.expanded_url,
                display_url: u.display_url,
            })
            .collect();

        let annotations = tweet
            .entities
            .annotations
            .into_iter()
            .map(|a| FeedAnnotation {
                kind: a.kind,
                normalized_text: a.normalized_text,
                probability: a.probability,
            })
            .collect();

        FeedItem {
            id: tweet.id,
            text: tweet.text,
            created_at: tweet.created_at,
            links,
            annotations,
        }
    }
}

// ============================================================================
// Resolver Types
// ============================================================================

/// Result of resolving a story link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStory {
    /// Final URL after redirects, query string and fragment removed
    pub canonical_url: String,
    /// Social preview image URL, empty when the page has none
    pub image_url: String,
}
