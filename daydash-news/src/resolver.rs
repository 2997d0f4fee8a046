//! Story link resolution
//!
//! Follows a short/tracking link to its final destination and pulls the
//! social preview image out of the page's metadata.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use crate::error::NewsError;
use crate::http::build_client;
use crate::traits::LinkResolver;
use crate::types::ResolvedStory;

/// Meta selectors for the preview image, in order of preference
const PREVIEW_IMAGE_SELECTORS: [&str; 2] = [
    "meta[property='og:image']",
    "meta[name='twitter:image']",
];

/// HTTP-backed story resolver
#[derive(Debug, Clone)]
pub struct StoryResolver {
    client: Client,
}

impl StoryResolver {
    /// Create a resolver with the given request timeout and redirect limit
    pub fn new(timeout: Duration, max_redirects: usize) -> Result<Self, NewsError> {
        Ok(Self {
            client: build_client(timeout, max_redirects)?,
        })
    }

    /// Resolve a link to its canonical URL and preview image
    #[instrument(skip(self))]
    pub async fn resolve_link(&self, link: &str) -> Result<ResolvedStory, NewsError> {
        let response = self
            .client
            .get(link)
            .send()
            .await
            .map_err(|e| NewsError::RequestFailed(format!("Failed to fetch {}: {}", link, e)))?;

        let final_url = response.url().clone();
        let status = response.status();
        if !status.is_success() {
            return Err(NewsError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to fetch {}", final_url),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| NewsError::ParseError(format!("Failed to read {}: {}", final_url, e)))?;

        let image_url = extract_preview_image(&html)
            .map(|raw| absolutize(&final_url, &raw))
            .unwrap_or_default();

        let canonical_url = canonicalize(&final_url);
        debug!("Resolved {} -> {} (image: {:?})", link, canonical_url, image_url);

        Ok(ResolvedStory {
            canonical_url,
            image_url,
        })
    }
}

#[async_trait]
impl LinkResolver for StoryResolver {
    async fn resolve(&self, link: &str) -> Result<ResolvedStory, NewsError> {
        self.resolve_link(link).await
    }
}

/// Strip the query string and fragment so tracking parameters do not split
/// one story into several
pub fn canonicalize(url: &Url) -> String {
    let mut canonical = url.clone();
    canonical.set_query(None);
    canonical.set_fragment(None);
    canonical.to_string()
}

/// Extract the preview image URL from a page.
///
/// The last `og:image` tag wins; `twitter:image` is used only when no
/// `og:image` tag carries a non-empty value.
pub fn extract_preview_image(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for selector in PREVIEW_IMAGE_SELECTORS {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };

        let found = document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .last();

        if let Some(content) = found {
            return Some(content.to_string());
        }
    }

    None
}

/// Resolve a possibly-relative image reference against the page URL
fn absolutize(page: &Url, raw: &str) -> String {
    page.join(raw)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| raw.to_string())
}
