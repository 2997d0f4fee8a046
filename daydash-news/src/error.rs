//! Error types for the news clients

use thiserror::Error;

/// Errors that can occur while talking to the feed, story pages or images
#[derive(Debug, Error)]
pub enum NewsError {
    /// HTTP request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Upstream returned a non-success status
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Failed to read or parse a response body
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Image bytes could not be decoded
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// Image body exceeded the configured size limit
    #[error("Image exceeds {limit} bytes")]
    ImageTooLarge {
        /// Maximum accepted body size
        limit: usize,
    },

    /// Crop, resize or encode failed
    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl NewsError {
    /// Whether the failure is worth retrying on a later poll
    pub fn is_transient(&self) -> bool {
        match self {
            NewsError::RequestFailed(_) => true,
            NewsError::ApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(NewsError::RequestFailed("reset".to_string()).is_transient());
        assert!(NewsError::ApiError { status: 503, message: String::new() }.is_transient());
        assert!(NewsError::ApiError { status: 429, message: String::new() }.is_transient());
        assert!(!NewsError::ApiError { status: 404, message: String::new() }.is_transient());
        assert!(!NewsError::ParseError("bad json".to_string()).is_transient());
    }
}
