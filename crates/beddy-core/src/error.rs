//! Error types for beddy-core

use thiserror::Error;

/// Errors produced while decoding or validating events
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid event JSON: {0}")]
    InvalidJson(String),

    #[error("Invalid logical clock: {0} (must be >= 1)")]
    InvalidLogicalClock(u64),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::InvalidJson(err.to_string())
    }
}
