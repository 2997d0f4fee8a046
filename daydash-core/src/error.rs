//! Error types shared across the pipeline

use thiserror::Error;

/// Pipeline-wide error type, surfaced to read-side consumers
#[derive(Error, Debug)]
pub enum DaydashError {
    #[error("Storage error: {0}")]
    Storage(String),
}

impl DaydashError {
    pub fn storage(msg: impl Into<String>) -> Self {
        DaydashError::Storage(msg.into())
    }
}

/// Result type alias for read-side operations
pub type DaydashResult<T> = Result<T, DaydashError>;
