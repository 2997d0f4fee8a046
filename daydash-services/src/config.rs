//! Pipeline configuration

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use daydash_news::{DEFAULT_API_BASE, DEFAULT_USER_ID};

use crate::feed_poller::FeedPollerConfig;
use crate::tweet_dispatcher::DispatcherConfig;

/// Everything needed to run the ingestion pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Twitter v2 bearer token
    pub bearer_token: String,
    /// Timeline owner
    pub user_id: String,
    /// Twitter API base URL
    pub api_base: String,
    /// SQLite database file
    pub db_path: PathBuf,
    /// Seconds between feed polls
    pub poll_interval_secs: u64,
    /// Concurrent item workflows
    pub workers: usize,
    /// Capacity of the poller -> dispatcher queue
    pub queue_capacity: usize,
    /// Cropped image width
    pub image_width: u32,
    /// Cropped image height
    pub image_height: u32,
    /// Per-request HTTP timeout (in seconds)
    pub http_timeout_secs: u64,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Expects:
    /// - TWITTER_V2_BEARER_TOKEN: Twitter API bearer token (required)
    ///
    /// Optional:
    /// - TWITTER_USER_ID, TWITTER_API_BASE
    /// - NEWS_DB_PATH, NEWS_POLL_INTERVAL_SECS, NEWS_WORKERS,
    ///   NEWS_QUEUE_CAPACITY, NEWS_IMAGE_WIDTH, NEWS_IMAGE_HEIGHT,
    ///   NEWS_HTTP_TIMEOUT_SECS
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bearer_token = var("TWITTER_V2_BEARER_TOKEN")
            .ok_or(ConfigError::MissingVar("TWITTER_V2_BEARER_TOKEN"))?;

        Ok(Self {
            bearer_token,
            user_id: var("TWITTER_USER_ID").unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            api_base: var("TWITTER_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            db_path: var("NEWS_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            poll_interval_secs: parse_positive(
                "NEWS_POLL_INTERVAL_SECS",
                var("NEWS_POLL_INTERVAL_SECS"),
                120,
            )?,
            workers: parse_positive("NEWS_WORKERS", var("NEWS_WORKERS"), 8)?,
            queue_capacity: parse_positive("NEWS_QUEUE_CAPACITY", var("NEWS_QUEUE_CAPACITY"), 256)?,
            image_width: parse_positive("NEWS_IMAGE_WIDTH", var("NEWS_IMAGE_WIDTH"), 600)?,
            image_height: parse_positive("NEWS_IMAGE_HEIGHT", var("NEWS_IMAGE_HEIGHT"), 300)?,
            http_timeout_secs: parse_positive(
                "NEWS_HTTP_TIMEOUT_SECS",
                var("NEWS_HTTP_TIMEOUT_SECS"),
                30,
            )?,
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            image_width: self.image_width,
            image_height: self.image_height,
        }
    }

    pub fn poller_config(&self) -> FeedPollerConfig {
        FeedPollerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

const DEFAULT_DB_PATH: &str = "data/news.db";

fn parse_positive<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(default);
    };

    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            var,
            value: raw.clone(),
            error: e.to_string(),
        })?;

    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            var,
            value: raw,
            error: "must be greater than zero".to_string(),
        });
    }

    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingVar(&'static str),

    #[error("Invalid value {value:?} for {var}: {error}")]
    InvalidValue {
        var: &'static str,
        value: String,
        error: String,
    },
}
