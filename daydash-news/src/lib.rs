//! Outbound clients for the Daydash news pipeline
//!
//! This crate provides the network-facing pieces of the pipeline:
//! - Twitter: timeline client that supplies feed items
//! - Resolver: follows story links to their canonical URL and preview image
//! - Image processor: content-aware crop, resize and JPEG data URI encoding

pub mod error;
pub mod http;
pub mod image_processor;
pub mod resolver;
pub mod smartcrop;
pub mod traits;
pub mod twitter;
pub mod types;

pub use error::NewsError;
pub use http::DEFAULT_MAX_REDIRECTS;
pub use image_processor::{crop_and_encode, ImageProcessor, DATA_URI_PREFIX};
pub use resolver::{canonicalize, extract_preview_image, StoryResolver};
pub use smartcrop::{find_best_crop, CropRect};
pub use traits::{FeedSource, ImageEncoder, LinkResolver};
pub use twitter::{TwitterClient, DEFAULT_API_BASE, DEFAULT_USER_ID};
pub use types::ResolvedStory;
