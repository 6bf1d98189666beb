//! Session list projection
//!
//! [`SessionList`] folds events into the set of active sessions. It is a
//! plain state machine with no I/O: [`SessionListService`](crate::SessionListService)
//! drives it from a live event stream.
//!
//! Every transition is idempotent and order sensitive. References to
//! unknown sessions and stale disconnects are no-ops, and
//! [`SessionList::apply`] reports whether the state actually changed.

use std::collections::HashMap;

use beddy_core::{Cursor, Event};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::events::{
    ClientConnectedData, ClientDisconnectedData, SessionEndedData, SessionEvent,
    SessionStartedData,
};
use crate::session::{HostConnectionState, Session};

/// Serializable checkpoint of a [`SessionList`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionListSnapshot {
    /// Logical clock of the last applied event
    pub cursor: Cursor,
    pub sessions: Vec<Session>,
}

/// Active sessions keyed by id and by host connection id
#[derive(Debug, Clone, Default)]
pub struct SessionList {
    sessions_by_id: HashMap<String, Session>,
    session_id_by_connection_id: HashMap<String, String>,
    cursor: Cursor,
    ignored_events: u64,
}

impl SessionList {
    /// Create an empty list positioned at the start of the log
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a checkpoint
    pub fn from_snapshot(snapshot: SessionListSnapshot) -> Self {
        let mut list = Self::new();
        list.seed(snapshot.sessions);
        list.cursor = snapshot.cursor;
        list
    }

    /// Preload sessions without going through the event log
    pub fn seed(&mut self, sessions: impl IntoIterator<Item = Session>) {
        for session in sessions {
            self.set_session(session);
        }
    }

    /// Checkpoint the current state
    pub fn snapshot(&self) -> SessionListSnapshot {
        SessionListSnapshot {
            cursor: self.cursor,
            sessions: self.get_session_list(),
        }
    }

    /// Sessions ordered by start time, then id
    pub fn get_session_list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions_by_id.values().cloned().collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Look up a session by id
    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions_by_id.get(session_id)
    }

    /// Look up the session hosted by a connection
    pub fn get_by_connection_id(&self, connection_id: &str) -> Option<&Session> {
        self.session_id_by_connection_id
            .get(connection_id)
            .and_then(|id| self.sessions_by_id.get(id))
    }

    /// Logical clock of the last applied event
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Events skipped because their type is unknown or their payload is invalid
    pub fn ignored_events(&self) -> u64 {
        self.ignored_events
    }

    pub fn len(&self) -> usize {
        self.sessions_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions_by_id.is_empty()
    }

    /// Apply one event, returning `true` if the session list changed
    pub fn apply(&mut self, event: &Event) -> bool {
        self.cursor = self.cursor.max(event.logical_clock);

        let parsed = match SessionEvent::parse(event) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                self.ignored_events += 1;
                debug!(
                    event_type = %event.event_type,
                    logical_clock = event.logical_clock,
                    "Ignoring unknown event type"
                );
                return false;
            }
            Err(e) => {
                self.ignored_events += 1;
                warn!(error = %e, "Ignoring event with invalid payload");
                return false;
            }
        };

        let since = event.unix_timestamp;
        let changed = match parsed {
            SessionEvent::SessionStarted(data) => self.apply_session_started(data, since),
            SessionEvent::SessionEnded(data) => self.apply_session_ended(data),
            SessionEvent::ClientConnected(data) => self.apply_client_connected(data, since),
            SessionEvent::ClientDisconnected(data) => self.apply_client_disconnected(data, since),
            SessionEvent::ServerStarted => self.apply_server_started(since),
        };

        trace!(
            event_type = %event.event_type,
            logical_clock = event.logical_clock,
            changed,
            "Applied event"
        );
        changed
    }

    fn set_session(&mut self, session: Session) {
        let connection_id = session.host_connection_id.clone();
        let session_id = session.id.clone();
        if let Some(previous) = self.sessions_by_id.insert(session_id.clone(), session)
            && previous.host_connection_id != connection_id
        {
            self.unlink_connection(&previous.host_connection_id, &previous.id);
        }
        self.session_id_by_connection_id
            .insert(connection_id, session_id);
    }

    fn delete_session(&mut self, session_id: &str) -> Option<Session> {
        let session = self.sessions_by_id.remove(session_id)?;
        self.unlink_connection(&session.host_connection_id, &session.id);
        Some(session)
    }

    fn unlink_connection(&mut self, connection_id: &str, session_id: &str) {
        if self
            .session_id_by_connection_id
            .get(connection_id)
            .is_some_and(|id| id == session_id)
        {
            self.session_id_by_connection_id.remove(connection_id);
        }
    }

    fn session_id_for_connection(&self, connection_id: &str) -> Option<String> {
        self.session_id_by_connection_id.get(connection_id).cloned()
    }

    fn apply_session_started(&mut self, data: SessionStartedData, since: i64) -> bool {
        if let Some(existing_id) = self.session_id_for_connection(&data.host_connection_id) {
            debug!(
                superseded = %existing_id,
                session_id = %data.id,
                "Superseding session on the same host connection"
            );
            self.delete_session(&existing_id);
        }
        self.set_session(Session {
            id: data.id,
            name: data.name,
            host_connection_id: data.host_connection_id,
            started_at: data.started_at,
            host_connection_state: HostConnectionState::Connected {
                since,
                request_id: None,
            },
        });
        true
    }

    fn apply_session_ended(&mut self, data: SessionEndedData) -> bool {
        self.delete_session(&data.id).is_some()
    }

    fn apply_client_connected(&mut self, data: ClientConnectedData, since: i64) -> bool {
        let Some(session_id) = self.session_id_for_connection(&data.connection_id) else {
            return false;
        };
        let Some(session) = self.sessions_by_id.get_mut(&session_id) else {
            return false;
        };
        session.host_connection_state = HostConnectionState::Connected {
            since,
            request_id: Some(data.request_id),
        };
        true
    }

    fn apply_client_disconnected(&mut self, data: ClientDisconnectedData, since: i64) -> bool {
        let Some(session_id) = self.session_id_for_connection(&data.connection_id) else {
            return false;
        };
        let Some(session) = self.sessions_by_id.get_mut(&session_id) else {
            return false;
        };

        // A disconnect only counts against the connection it was issued for
        match &session.host_connection_state {
            HostConnectionState::Connected { request_id, .. }
                if request_id.as_deref() == Some(data.request_id.as_str()) => {}
            _ => {
                debug!(
                    session_id = %session_id,
                    request_id = %data.request_id,
                    "Ignoring stale disconnect"
                );
                return false;
            }
        }

        if data.is_abnormal_closure() {
            session.host_connection_state = HostConnectionState::Disconnected { since };
        } else {
            self.delete_session(&session_id);
        }
        true
    }

    fn apply_server_started(&mut self, since: i64) -> bool {
        let mut transitioned = 0usize;
        for session in self.sessions_by_id.values_mut() {
            if session.host_connection_state.is_connected() {
                session.host_connection_state = HostConnectionState::Disconnected { since };
                transitioned += 1;
            }
        }
        if transitioned > 0 {
            debug!(sessions = transitioned, "Server restart disconnected hosts");
        }
        transitioned > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beddy_core::{CURSOR_START, event_types};
    use serde_json::json;

    struct Log {
        clock: u64,
    }

    impl Log {
        fn new() -> Self {
            Self { clock: 0 }
        }

        fn next(&mut self, event_type: &str, data: serde_json::Value) -> Event {
            self.clock += 1;
            Event::new(event_type, self.clock, data).with_timestamp(1_000 * self.clock as i64)
        }

        fn session_started(&mut self, id: &str, connection_id: &str) -> Event {
            self.next(
                event_types::SESSION_STARTED,
                json!({
                    "id": id,
                    "name": format!("session {id}"),
                    "host_connection_id": connection_id,
                    "started_at": "2024-05-01T20:00:00Z",
                }),
            )
        }

        fn session_ended(&mut self, id: &str) -> Event {
            self.next(event_types::SESSION_ENDED, json!({ "id": id }))
        }

        fn connected(&mut self, connection_id: &str, request_id: &str) -> Event {
            self.next(
                event_types::CLIENT_CONNECTED,
                json!({
                    "client_id": "host",
                    "connection_id": connection_id,
                    "request_id": request_id,
                }),
            )
        }

        fn disconnected(&mut self, connection_id: &str, request_id: &str, code: u16) -> Event {
            self.next(
                event_types::CLIENT_DISCONNECTED,
                json!({
                    "client_id": "host",
                    "connection_id": connection_id,
                    "request_id": request_id,
                    "web_socket_close_code": code,
                }),
            )
        }

        fn server_started(&mut self) -> Event {
            self.next(event_types::SERVER_STARTED, serde_json::Value::Null)
        }
    }

    fn ids(list: &SessionList) -> Vec<String> {
        list.get_session_list().into_iter().map(|s| s.id).collect()
    }

    #[test]
    fn test_session_started() {
        let mut log = Log::new();
        let mut list = SessionList::new();

        let started = log.session_started("A", "C1");
        assert!(list.apply(&started));

        let session = list.get("A").unwrap();
        assert_eq!(session.host_connection_id, "C1");
        assert_eq!(
            session.host_connection_state,
            HostConnectionState::Connected {
                since: started.unix_timestamp,
                request_id: None
            }
        );
        assert_eq!(list.cursor(), 1);
    }

    #[test]
    fn test_supersession() {
        let mut log = Log::new();
        let mut list = SessionList::new();

        assert!(list.apply(&log.session_started("A", "C1")));
        assert!(list.apply(&log.session_started("B", "C1")));

        assert_eq!(ids(&list), vec!["B"]);
        assert_eq!(list.get_by_connection_id("C1").unwrap().id, "B");
    }

    #[test]
    fn test_session_ended_is_idempotent() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        list.apply(&log.session_started("A", "C1"));

        let ended = log.session_ended("A");
        assert!(list.apply(&ended));
        assert!(!list.apply(&ended));
        assert!(!list.apply(&log.session_ended("never-existed")));
        assert!(list.is_empty());
        assert!(list.get_by_connection_id("C1").is_none());
    }

    #[test]
    fn test_client_connected_sets_request_id() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        list.apply(&log.session_started("A", "C1"));

        let connected = log.connected("C1", "R1");
        assert!(list.apply(&connected));
        assert_eq!(
            list.get("A").unwrap().host_connection_state,
            HostConnectionState::Connected {
                since: connected.unix_timestamp,
                request_id: Some("R1".into())
            }
        );

        // Unknown connection
        assert!(!list.apply(&log.connected("C9", "R2")));
    }

    #[test]
    fn test_abnormal_disconnect_keeps_session() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        list.apply(&log.session_started("A", "C1"));
        list.apply(&log.connected("C1", "R1"));

        let disconnected = log.disconnected("C1", "R1", 1006);
        assert!(list.apply(&disconnected));
        assert_eq!(
            list.get("A").unwrap().host_connection_state,
            HostConnectionState::Disconnected {
                since: disconnected.unix_timestamp
            }
        );

        // Already disconnected: repeat is a no-op
        assert!(!list.apply(&log.disconnected("C1", "R1", 1006)));
    }

    #[test]
    fn test_graceful_disconnect_removes_session() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        list.apply(&log.session_started("A", "C1"));
        list.apply(&log.connected("C1", "R1"));

        assert!(list.apply(&log.disconnected("C1", "R1", 1000)));
        assert!(list.is_empty());
        assert!(list.get_by_connection_id("C1").is_none());
    }

    #[test]
    fn test_stale_disconnect_is_rejected() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        list.apply(&log.session_started("A", "C1"));
        list.apply(&log.connected("C1", "R1"));
        list.apply(&log.connected("C1", "R2"));

        // The disconnect for the older request arrives late
        let stale = log.disconnected("C1", "R1", 1006);
        assert!(!list.apply(&stale));
        assert!(!list.apply(&stale));
        assert!(list.get("A").unwrap().host_connection_state.is_connected());
    }

    #[test]
    fn test_disconnect_before_any_connect_is_stale() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        list.apply(&log.session_started("A", "C1"));

        assert!(!list.apply(&log.disconnected("C1", "R1", 1000)));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_server_started() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        list.apply(&log.session_started("S1", "C1"));
        list.apply(&log.session_started("S2", "C2"));
        list.apply(&log.connected("C2", "R2"));
        let s2_dropped = log.disconnected("C2", "R2", 1006);
        list.apply(&s2_dropped);

        let restart = log.server_started();
        assert!(list.apply(&restart));

        assert_eq!(
            list.get("S1").unwrap().host_connection_state,
            HostConnectionState::Disconnected {
                since: restart.unix_timestamp
            }
        );
        assert_eq!(
            list.get("S2").unwrap().host_connection_state,
            HostConnectionState::Disconnected {
                since: s2_dropped.unix_timestamp
            }
        );

        // Nobody left to disconnect
        assert!(!list.apply(&log.server_started()));
    }

    #[test]
    fn test_server_started_on_empty_list() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        assert!(!list.apply(&log.server_started()));
    }

    #[test]
    fn test_reconnect_after_server_restart() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        list.apply(&log.session_started("A", "C1"));
        list.apply(&log.server_started());

        assert!(list.apply(&log.connected("C1", "R9")));
        assert!(list.get("A").unwrap().host_connection_state.is_connected());
    }

    #[test]
    fn test_unknown_and_invalid_events_are_ignored() {
        let mut log = Log::new();
        let mut list = SessionList::new();

        assert!(!list.apply(&log.next("baby_station.announced", json!({}))));
        assert!(!list.apply(&log.next(event_types::SESSION_STARTED, json!({"id": 1}))));

        assert!(list.is_empty());
        assert_eq!(list.ignored_events(), 2);
        assert_eq!(list.cursor(), 2);
    }

    #[test]
    fn test_restarting_session_on_new_connection() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        list.apply(&log.session_started("A", "C1"));
        list.apply(&log.session_started("A", "C2"));

        assert_eq!(list.len(), 1);
        assert!(list.get_by_connection_id("C1").is_none());
        assert_eq!(list.get_by_connection_id("C2").unwrap().id, "A");
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut log = Log::new();
        let mut list = SessionList::new();
        list.apply(&log.session_started("A", "C1"));
        list.apply(&log.session_started("B", "C2"));
        list.apply(&log.connected("C2", "R1"));

        let snapshot = list.snapshot();
        assert_eq!(snapshot.cursor, 3);

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = SessionList::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.get_session_list(), list.get_session_list());
        assert_eq!(restored.cursor(), 3);

        // Restored indexes are live
        let mut restored = restored;
        assert!(restored.apply(&log.disconnected("C2", "R1", 1000)));
        assert_eq!(ids(&restored), vec!["A"]);
    }

    #[test]
    fn test_seed_does_not_move_cursor() {
        let mut list = SessionList::new();
        list.seed(vec![Session {
            id: "A".into(),
            name: "Nursery".into(),
            host_connection_id: "C1".into(),
            started_at: "2024-05-01T20:00:00Z".parse().unwrap(),
            host_connection_state: HostConnectionState::Disconnected { since: 0 },
        }]);
        assert_eq!(list.cursor(), CURSOR_START);
        assert_eq!(list.get_by_connection_id("C1").unwrap().id, "A");
    }
}
