//! Twitter v2 timeline client
//!
//! Polls a single user's timeline (CNN Breaking News by default) for tweets
//! newer than a given id.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use daydash_core::FeedItem;

use crate::error::NewsError;
use crate::http::{build_client, DEFAULT_MAX_REDIRECTS};
use crate::traits::FeedSource;
use crate::types::TwitterTimelineResponse;

/// Default Twitter API base URL
pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";

/// User id of @cnnbrk
pub const DEFAULT_USER_ID: &str = "428333";

/// Fields requested for every tweet
const TWEET_FIELDS: &str = "created_at,entities";

/// Twitter v2 API client
pub struct TwitterClient {
    client: Client,
    bearer_token: String,
    user_id: String,
    base_url: String,
}

impl TwitterClient {
    /// Create a new Twitter client for the given user timeline
    pub fn new(
        bearer_token: String,
        user_id: String,
        timeout: Duration,
    ) -> Result<Self, NewsError> {
        if bearer_token.trim().is_empty() {
            return Err(NewsError::InvalidConfig(
                "Twitter bearer token is blank".to_string(),
            ));
        }

        Ok(Self {
            client: build_client(timeout, DEFAULT_MAX_REDIRECTS)?,
            bearer_token,
            user_id,
            base_url: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Override the API base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn timeline_url(&self) -> String {
        format!("{}/2/users/{}/tweets", self.base_url, self.user_id)
    }

    /// Fetch the user's timeline, optionally only tweets after `since_id`
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn fetch_timeline(
        &self,
        since_id: Option<&str>,
    ) -> Result<TwitterTimelineResponse, NewsError> {
        let mut query = vec![("tweet.fields", TWEET_FIELDS)];
        if let Some(since) = since_id.map(str::trim).filter(|s| !s.is_empty()) {
            query.push(("since_id", since));
        }

        debug!("Fetching timeline since {:?}", since_id);

        let response = self
            .client
            .get(self.timeline_url())
            .bearer_auth(&self.bearer_token)
            .header("Content-Type", "application/json; charset=UTF-8")
            .query(&query)
            .send()
            .await
            .map_err(|e| NewsError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NewsError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let timeline: TwitterTimelineResponse = response
            .json()
            .await
            .map_err(|e| NewsError::ParseError(e.to_string()))?;

        debug!(
            "Fetched {} tweets (newest {:?})",
            timeline.data.len(),
            timeline.meta.newest_id
        );

        Ok(timeline)
    }
}

#[async_trait]
impl FeedSource for TwitterClient {
    async fn fetch_since(&self, since_id: Option<&str>) -> Result<Vec<FeedItem>, NewsError> {
        let timeline = self.fetch_timeline(since_id).await?;
        Ok(timeline.data.into_iter().map(FeedItem::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_token_is_rejected() {
        let result = TwitterClient::new(
            "  ".to_string(),
            DEFAULT_USER_ID.to_string(),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(NewsError::InvalidConfig(_))));
    }

    #[test]
    fn test_timeline_url() {
        let client = TwitterClient::new(
            "token".to_string(),
            DEFAULT_USER_ID.to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url("http://localhost:8080/");

        assert_eq!(
            client.timeline_url(),
            "http://localhost:8080/2/users/428333/tweets"
        );
    }
}
