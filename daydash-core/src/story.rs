//! The persisted story aggregate
//!
//! A [`Story`] groups every feed item that links to the same canonical URL.
//! Updates are appended chronologically: the newest update is always the
//! last element of [`Story::updates`].

use serde::{Deserialize, Serialize};

/// All feed items referencing one canonical URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Store identity, assigned on insert
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Canonical URL (unique key)
    pub url: String,
    /// Short/tracking URL of the first item that created the story
    pub short_url: String,
    /// Updates, oldest first
    #[serde(default)]
    pub updates: Vec<StoryUpdate>,
    /// Extracted entities
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// One feed item's contribution to a story
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryUpdate {
    /// Feed item identifier
    pub id: String,
    /// Item text with the short link stripped
    pub text: String,
    /// Unix timestamp (seconds) of the feed item
    pub time: i64,
    /// URL of the story's preview image
    #[serde(default)]
    pub mediaurl: String,
    /// Cropped image as a data URI; empty when image processing failed
    #[serde(default)]
    pub mediadata: String,
}

/// An entity mentioned by a story
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl Story {
    /// Create an unpersisted story seeded with its first update
    pub fn new(url: impl Into<String>, short_url: impl Into<String>, update: StoryUpdate) -> Self {
        Self {
            id: None,
            url: url.into(),
            short_url: short_url.into(),
            updates: vec![update],
            entities: Vec::new(),
        }
    }

    /// The most recent update
    pub fn latest_update(&self) -> Option<&StoryUpdate> {
        self.updates.last()
    }

    /// Whether an update with this feed item id is already recorded
    pub fn has_update(&self, update_id: &str) -> bool {
        self.updates.iter().any(|u| u.id == update_id)
    }

    /// Append an update. Returns false (and leaves the story untouched) if
    /// the id is already present.
    pub fn push_update(&mut self, update: StoryUpdate) -> bool {
        if self.has_update(&update.id) {
            return false;
        }
        self.updates.push(update);
        true
    }

    /// Add entities not already present, preserving first-seen order
    pub fn merge_entities(&mut self, entities: impl IntoIterator<Item = Entity>) {
        for entity in entities {
            if !self.entities.contains(&entity) {
                self.entities.push(entity);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(id: &str, time: i64) -> StoryUpdate {
        StoryUpdate {
            id: id.to_string(),
            text: format!("update {}", id),
            time,
            mediaurl: String::new(),
            mediadata: String::new(),
        }
    }

    #[test]
    fn test_push_update_appends_chronologically() {
        let mut story = Story::new("http://long/a", "http://short/a", update("10", 100));
        assert!(story.push_update(update("11", 200)));

        assert_eq!(story.updates.len(), 2);
        assert_eq!(story.latest_update().unwrap().id, "11");
    }

    #[test]
    fn test_push_update_rejects_duplicate_id() {
        let mut story = Story::new("http://long/a", "http://short/a", update("10", 100));
        assert!(!story.push_update(update("10", 300)));
        assert_eq!(story.updates.len(), 1);
    }

    #[test]
    fn test_merge_entities_skips_known() {
        let mut story = Story::new("http://long/a", "http://short/a", update("10", 100));
        let person = Entity {
            kind: "Person".to_string(),
            text: "Ada Lovelace".to_string(),
        };
        let place = Entity {
            kind: "Place".to_string(),
            text: "London".to_string(),
        };

        story.merge_entities(vec![person.clone()]);
        story.merge_entities(vec![person.clone(), place.clone()]);

        assert_eq!(story.entities, vec![person, place]);
    }

    #[test]
    fn test_document_shape() {
        let story = Story::new("http://long/a", "http://short/a", update("10", 100));
        let json = serde_json::to_value(&story).unwrap();

        assert!(json.get("id").is_none());
        assert_eq!(json["short_url"], "http://short/a");
        assert_eq!(json["updates"][0]["mediaurl"], "");
    }
}
