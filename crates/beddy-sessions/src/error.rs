//! Error types for beddy-sessions

use beddy_core::Cursor;
use beddy_eventstore::StorageError;
use thiserror::Error;

/// Errors raised while projecting the event log
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid {event_type} payload at logical clock {logical_clock}: {reason}")]
    InvalidPayload {
        event_type: String,
        logical_clock: Cursor,
        reason: String,
    },

    #[error("Projection stopped")]
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_conversion() {
        let err: ProjectionError = StorageError::CapacityExceeded.into();
        assert!(matches!(err, ProjectionError::Storage(_)));
    }

    #[test]
    fn test_invalid_payload_message() {
        let err = ProjectionError::InvalidPayload {
            event_type: "session.started".into(),
            logical_clock: 4,
            reason: "missing field `id`".into(),
        };
        let message = err.to_string();
        assert!(message.contains("session.started"));
        assert!(message.contains("4"));
    }
}
