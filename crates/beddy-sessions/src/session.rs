//! Session read model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state of a session's host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HostConnectionState {
    /// The host is connected
    Connected {
        /// Unix millis of the transition
        since: i64,
        /// Request that established the connection, when known
        request_id: Option<String>,
    },
    /// The host dropped unexpectedly and may come back
    Disconnected {
        /// Unix millis of the transition
        since: i64,
    },
}

impl HostConnectionState {
    /// Whether the host is currently connected
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// When the current state began (Unix millis)
    pub fn since(&self) -> i64 {
        match self {
            Self::Connected { since, .. } | Self::Disconnected { since } => *since,
        }
    }
}

/// An active monitoring session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    /// Connection currently hosting the session
    pub host_connection_id: String,
    pub started_at: DateTime<Utc>,
    pub host_connection_state: HostConnectionState,
}
