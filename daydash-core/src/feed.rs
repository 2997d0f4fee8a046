//! Inbound feed items
//!
//! A [`FeedItem`] is the pipeline's view of one post on the polled social
//! feed. It is read-only input: the pipeline never mutates or persists it
//! directly, only the [`StoryUpdate`](crate::StoryUpdate) derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One item from the social feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Feed identifier (decimal snowflake, monotonically increasing)
    pub id: String,
    /// Raw post text, usually ending with the short link
    pub text: String,
    /// When the item was posted
    pub created_at: DateTime<Utc>,
    /// Link references, in the order they appear in the text
    #[serde(default)]
    pub links: Vec<FeedLink>,
    /// Named entities detected by the feed provider
    #[serde(default)]
    pub annotations: Vec<FeedAnnotation>,
}

/// A link reference attached to a feed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedLink {
    /// Short/tracking form, as it appears in the text
    pub url: String,
    /// Expanded form reported by the feed provider
    #[serde(default)]
    pub expanded_url: String,
    /// Display form
    #[serde(default)]
    pub display_url: String,
}

impl FeedLink {
    /// The URL to resolve: the expanded form when known, else the short form
    pub fn target(&self) -> &str {
        if self.expanded_url.trim().is_empty() {
            &self.url
        } else {
            &self.expanded_url
        }
    }
}

/// A named entity annotation (person, place, organization...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedAnnotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub normalized_text: String,
    #[serde(default)]
    pub probability: f64,
}

impl FeedItem {
    /// The link the story is keyed off (the first one)
    pub fn primary_link(&self) -> Option<&FeedLink> {
        self.links.first()
    }

    /// Text with the first occurrence of the short link removed and trimmed
    pub fn stripped_text(&self) -> String {
        match self.primary_link() {
            Some(link) if !link.url.is_empty() => {
                self.text.replacen(&link.url, "", 1).trim().to_string()
            }
            _ => self.text.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(text: &str, links: Vec<FeedLink>) -> FeedItem {
        FeedItem {
            id: "10".to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
            links,
            annotations: Vec::new(),
        }
    }

    #[test]
    fn test_stripped_text_removes_short_link() {
        let item = item(
            "Breaking A http://short/a",
            vec![FeedLink {
                url: "http://short/a".to_string(),
                expanded_url: "http://expanded/a".to_string(),
                display_url: "expanded/a".to_string(),
            }],
        );

        assert_eq!(item.stripped_text(), "Breaking A");
    }

    #[test]
    fn test_stripped_text_without_link() {
        let item = item("  Just text  ", Vec::new());
        assert_eq!(item.stripped_text(), "Just text");
        assert!(item.primary_link().is_none());
    }

    #[test]
    fn test_link_target_falls_back_to_short_url() {
        let link = FeedLink {
            url: "http://short/a".to_string(),
            expanded_url: String::new(),
            display_url: String::new(),
        };
        assert_eq!(link.target(), "http://short/a");

        let link = FeedLink {
            expanded_url: "http://expanded/a".to_string(),
            ..link
        };
        assert_eq!(link.target(), "http://expanded/a");
    }
}
