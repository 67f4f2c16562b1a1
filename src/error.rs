//! Error types for repominer
//!
//! Centralized error handling using thiserror.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// All error types that can occur outside a single shard's mining work
#[derive(Debug, Error)]
pub enum MinerError {
    /// The hosting API reported an exhausted request budget; fatal for the run
    #[error("Rate limit exceeded (resets at {})", reset_display(.reset_at))]
    RateLimitExceeded { reset_at: Option<DateTime<Utc>> },

    /// The shared stop signal was already tripped before the call
    #[error("Stop signal set, call skipped")]
    Stopped,

    /// Missing or unusable source location
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success HTTP status that is not a rate limit
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl MinerError {
    /// Whether this error must halt the whole run rather than a single request.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, MinerError::RateLimitExceeded { .. } | MinerError::Stopped)
    }
}

impl From<reqwest::Error> for MinerError {
    fn from(e: reqwest::Error) -> Self {
        MinerError::Http(e.to_string())
    }
}

fn reset_display(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => at.to_rfc3339(),
        None => "Unknown".to_string(),
    }
}

/// Result type alias for repominer operations
pub type Result<T> = std::result::Result<T, MinerError>;
