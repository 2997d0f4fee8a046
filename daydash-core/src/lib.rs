//! Core types for the Daydash news pipeline
//!
//! This crate defines the shared data structures used across the pipeline:
//! inbound feed items, the persisted story aggregate and the client-facing
//! news report built from it.

pub mod error;
pub mod feed;
pub mod news;
pub mod story;

pub use error::{DaydashError, DaydashResult};
pub use feed::{FeedAnnotation, FeedItem, FeedLink};
pub use news::{NewsItem, NewsReport};
pub use story::{Entity, Story, StoryUpdate};
