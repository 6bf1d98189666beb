//! Composition root wiring backend, live tail and projection together

use std::sync::Arc;

use beddy_core::{CURSOR_START, Cursor, Event};
use beddy_eventstore::{EventStore, FollowingDecorator, StorageError};
use beddy_sessions::{
    ProjectionError, Session, SessionListChanged, SessionListService, SessionListServiceConfig,
};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use crate::config::MonitorConfig;
use crate::error::MonitorError;

/// Live-tailed store over whichever backend was configured
pub type LiveStore = FollowingDecorator<Arc<dyn EventStore>>;

/// Backend, live tail and session projection owned as one unit
pub struct EventService {
    store: Arc<LiveStore>,
    sessions: SessionListService,
}

impl EventService {
    /// Wrap `backend` and start projecting it
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(backend: Arc<dyn EventStore>, config: SessionListServiceConfig) -> Self {
        let store = Arc::new(FollowingDecorator::new(backend));
        let sessions = SessionListService::start(Arc::clone(&store), config);
        Self { store, sessions }
    }

    /// Open the configured backend and start projecting it
    pub fn open(config: &MonitorConfig) -> Result<Self, MonitorError> {
        let backend = config.store.open()?;
        Ok(Self::new(backend, config.session_config()))
    }

    /// Append an event to the log
    #[instrument(skip(self, event), fields(logical_clock = event.logical_clock))]
    pub async fn put(&self, event: Event) -> Result<(), StorageError> {
        self.store.put(event).await
    }

    /// Clock a transport should resume its subscription from
    pub async fn resume_cursor(&self) -> Result<Cursor, StorageError> {
        let cursor = self
            .store
            .get_last_event()
            .await?
            .map_or(CURSOR_START, |event| event.logical_clock);
        debug!(cursor, "Resolved resume cursor");
        Ok(cursor)
    }

    /// The live-tailed store, for additional subscribers
    pub fn store(&self) -> &Arc<LiveStore> {
        &self.store
    }

    pub fn sessions(&self) -> &SessionListService {
        &self.sessions
    }

    pub fn get_session_list(&self) -> Vec<Session> {
        self.sessions.get_session_list()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionListChanged> {
        self.sessions.subscribe()
    }

    /// Stop the projection
    pub async fn stop(&self) -> Result<(), ProjectionError> {
        info!("Stopping event service");
        self.sessions.stop().await
    }
}

impl std::fmt::Debug for EventService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventService")
            .field("followers", &self.store.follower_count())
            .field("sessions", &self.sessions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beddy_core::event_types;
    use beddy_eventstore::{EventStoreConfig, InMemoryEventStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_resume_cursor_empty_store() {
        let service = EventService::new(Arc::new(InMemoryEventStore::new()), Default::default());
        assert_eq!(service.resume_cursor().await.unwrap(), CURSOR_START);
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_put_reaches_projection() {
        let service = EventService::new(Arc::new(InMemoryEventStore::new()), Default::default());
        service
            .put(Event::new(
                event_types::SESSION_STARTED,
                3,
                json!({
                    "id": "A",
                    "name": "Nursery",
                    "host_connection_id": "C1",
                    "started_at": "2024-05-01T20:00:00Z",
                }),
            ))
            .await
            .unwrap();

        service.sessions().wait_for_cursor(3).await.unwrap();
        assert_eq!(service.get_session_list().len(), 1);
        assert_eq!(service.resume_cursor().await.unwrap(), 3);
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_persistent_resumes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = MonitorConfig {
            store: EventStoreConfig::persistent(temp_dir.path().join("events.redb")),
            ..Default::default()
        };

        {
            let service = EventService::open(&config).unwrap();
            service
                .put(Event::new(event_types::SERVER_STARTED, 41, serde_json::Value::Null))
                .await
                .unwrap();
            service.stop().await.unwrap();
        }

        let service = EventService::open(&config).unwrap();
        assert_eq!(service.resume_cursor().await.unwrap(), 41);
        service.stop().await.unwrap();
    }
}
