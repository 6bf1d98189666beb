//! Error types for beddy-eventstore
//!
//! This module defines the error types used throughout the event store crate.

use thiserror::Error;

/// Errors that can occur in event store operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("I/O error: {0}")]
    Io(String),

    /// Error reported by the underlying database
    #[error("Database error: {0}")]
    Database(String),

    /// Storage capacity has been exceeded
    #[error("Storage capacity exceeded")]
    CapacityExceeded,

    /// Error during serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during deserialization
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Logical clocks start at 1; cursor 0 means "before the first event"
    #[error("Invalid logical clock {0}: clocks start at 1")]
    InvalidLogicalClock(u64),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Deserialization(err.to_string())
    }
}

impl StorageError {
    /// Create a new Database error
    pub fn database(message: impl ToString) -> Self {
        Self::Database(message.to_string())
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }
}
