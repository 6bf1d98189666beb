//! Log events

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Position in the log: the logical clock of the last event a consumer
/// has already processed
pub type Cursor = u64;

/// Cursor that replays the whole log
pub const CURSOR_START: Cursor = 0;

/// Event type names understood by the session projection
pub mod event_types {
    pub const SESSION_STARTED: &str = "session.started";
    pub const SESSION_ENDED: &str = "session.ended";
    pub const CLIENT_CONNECTED: &str = "client.connected";
    pub const CLIENT_DISCONNECTED: &str = "client.disconnected";
    pub const SERVER_STARTED: &str = "server.started";
}

/// A single record in the event log
///
/// The JSON form is the wire and storage format:
///
/// ```json
/// {"id":"…","type":"session.started","logical_clock":7,"unix_timestamp":1700000000000,"data":{…}}
/// ```
///
/// `id` is unique but carries no ordering. `logical_clock` is the only
/// ordering key; `unix_timestamp` is for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: String,
    /// Discriminant selecting the shape of `data`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Globally unique, strictly increasing position in the log
    pub logical_clock: u64,
    /// Milliseconds since the Unix epoch
    pub unix_timestamp: i64,
    /// Payload shaped by `event_type`
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Event {
    /// Create an event with a fresh id stamped with the current time
    pub fn new(event_type: impl Into<String>, logical_clock: u64, data: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            logical_clock,
            unix_timestamp: chrono::Utc::now().timestamp_millis(),
            data,
        }
    }

    /// Override the id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Override the timestamp
    pub fn with_timestamp(mut self, unix_timestamp: i64) -> Self {
        self.unix_timestamp = unix_timestamp;
        self
    }

    /// Parse one event from its JSON form
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        let event: Event = serde_json::from_str(json)?;
        if event.logical_clock == 0 {
            return Err(CoreError::InvalidLogicalClock(event.logical_clock));
        }
        Ok(event)
    }

    /// Encode as JSON
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether this event lies strictly after `cursor`
    pub fn is_after(&self, cursor: Cursor) -> bool {
        self.logical_clock > cursor
    }
}
