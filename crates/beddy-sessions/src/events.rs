//! Typed payloads for the session event vocabulary

use beddy_core::{Event, event_types};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;

/// WebSocket close code for an abnormal closure (no close frame)
pub const WEB_SOCKET_CLOSE_ABNORMAL: u16 = 1006;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartedData {
    pub id: String,
    pub name: String,
    pub host_connection_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEndedData {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConnectedData {
    #[serde(default)]
    pub client_id: String,
    pub connection_id: String,
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDisconnectedData {
    #[serde(default)]
    pub client_id: String,
    pub connection_id: String,
    pub request_id: String,
    pub web_socket_close_code: u16,
}

impl ClientDisconnectedData {
    /// Whether the socket dropped rather than being closed on purpose
    pub fn is_abnormal_closure(&self) -> bool {
        self.web_socket_close_code == WEB_SOCKET_CLOSE_ABNORMAL
    }
}

/// An event the session projection knows how to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SessionStarted(SessionStartedData),
    SessionEnded(SessionEndedData),
    ClientConnected(ClientConnectedData),
    ClientDisconnected(ClientDisconnectedData),
    ServerStarted,
}

impl SessionEvent {
    /// Decode an event's payload
    ///
    /// Returns `Ok(None)` for event types outside the session vocabulary.
    pub fn parse(event: &Event) -> Result<Option<Self>, ProjectionError> {
        let parsed = match event.event_type.as_str() {
            event_types::SESSION_STARTED => Self::SessionStarted(decode(event)?),
            event_types::SESSION_ENDED => Self::SessionEnded(decode(event)?),
            event_types::CLIENT_CONNECTED => Self::ClientConnected(decode(event)?),
            event_types::CLIENT_DISCONNECTED => Self::ClientDisconnected(decode(event)?),
            event_types::SERVER_STARTED => Self::ServerStarted,
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }
}

fn decode<T: DeserializeOwned>(event: &Event) -> Result<T, ProjectionError> {
    T::deserialize(&event.data).map_err(|e| ProjectionError::InvalidPayload {
        event_type: event.event_type.clone(),
        logical_clock: event.logical_clock,
        reason: e.to_string(),
    })
}
