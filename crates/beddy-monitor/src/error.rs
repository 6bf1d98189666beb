//! Error types for beddy-monitor

use std::io;
use std::path::PathBuf;

use beddy_eventstore::StorageError;
use beddy_logging::LogError;
use beddy_sessions::ProjectionError;
use thiserror::Error;

/// Errors raised by the monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),

    #[error("Logging error: {0}")]
    Logging(#[from] LogError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to write output: {0}")]
    Output(#[from] serde_json::Error),
}
