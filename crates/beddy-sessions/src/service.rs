//! Live session projection
//!
//! [`SessionListService`] runs a background task that follows the event
//! log and folds every event into a shared [`SessionList`]. Observers read
//! the current list at any time or subscribe to change notifications.

use std::sync::Arc;

use beddy_core::{Cursor, Event};
use beddy_eventstore::EventStore;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::error::ProjectionError;
use crate::projection::{SessionList, SessionListSnapshot};
use crate::session::Session;

/// Default capacity of the change notification channel
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// Configuration for [`SessionListService`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionListServiceConfig {
    /// Notifications buffered per subscriber before it starts lagging
    pub notification_capacity: usize,
}

impl Default for SessionListServiceConfig {
    fn default() -> Self {
        Self {
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

/// Published after every event that changed the session list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionListChanged {
    /// Clock of the event that caused the change
    pub logical_clock: Cursor,
    /// The session list after the change
    pub sessions: Vec<Session>,
}

/// Session list kept current by a background projection task
pub struct SessionListService {
    state: Arc<RwLock<SessionList>>,
    changes: broadcast::Sender<SessionListChanged>,
    applied: watch::Receiver<Cursor>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<(), ProjectionError>>>>,
}

impl SessionListService {
    /// Start projecting `store` from the beginning of the log
    ///
    /// `store` should be live-tailed (a
    /// [`FollowingDecorator`](beddy_eventstore::FollowingDecorator)); a plain
    /// backend is replayed once and the task then finishes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S>(store: S, config: SessionListServiceConfig) -> Self
    where
        S: EventStore + 'static,
    {
        Self::start_from(store, SessionList::new(), config)
    }

    /// Start projecting from a seeded or restored list
    ///
    /// The subscription resumes after `initial.cursor()`.
    pub fn start_from<S>(store: S, initial: SessionList, config: SessionListServiceConfig) -> Self
    where
        S: EventStore + 'static,
    {
        let (changes, _) = broadcast::channel(config.notification_capacity.max(1));
        let (applied_tx, applied) = watch::channel(initial.cursor());
        let state = Arc::new(RwLock::new(initial));
        let cancel = CancellationToken::new();

        let task = ProjectionTask {
            store,
            state: Arc::clone(&state),
            changes: changes.clone(),
            applied: applied_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        Self {
            state,
            changes,
            applied,
            cancel,
            task: Mutex::new(Some(handle)),
        }
    }

    /// Current sessions ordered by start time, then id
    pub fn get_session_list(&self) -> Vec<Session> {
        self.state.read().get_session_list()
    }

    /// Receive a notification for every change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionListChanged> {
        self.changes.subscribe()
    }

    /// Clock of the last applied event
    pub fn cursor(&self) -> Cursor {
        *self.applied.borrow()
    }

    /// Wait until every event up to `cursor` has been applied
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Stopped`] if the projection task ends
    /// before reaching `cursor`.
    pub async fn wait_for_cursor(&self, cursor: Cursor) -> Result<(), ProjectionError> {
        let mut applied = self.applied.clone();
        applied
            .wait_for(|applied| *applied >= cursor)
            .await
            .map_err(|_| ProjectionError::Stopped)?;
        Ok(())
    }

    /// Checkpoint the derived state
    pub fn snapshot(&self) -> SessionListSnapshot {
        self.state.read().snapshot()
    }

    /// Events skipped by the projection so far
    pub fn ignored_events(&self) -> u64 {
        self.state.read().ignored_events()
    }

    /// Whether the projection task is still following the log
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the projection task and wait for it to finish
    ///
    /// Dropping the task's stream deregisters its follower. Returns the
    /// error that ended the task, if any. Subsequent calls return `Ok`.
    pub async fn stop(&self) -> Result<(), ProjectionError> {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        match handle {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!(error = %e, "Projection task panicked");
                    Err(ProjectionError::Stopped)
                }
            },
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SessionListService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionListService")
            .field("cursor", &self.cursor())
            .field("sessions", &self.state.read().len())
            .field("running", &self.is_running())
            .finish()
    }
}

impl Drop for SessionListService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Background task folding the live stream into the shared list
struct ProjectionTask<S> {
    store: S,
    state: Arc<RwLock<SessionList>>,
    changes: broadcast::Sender<SessionListChanged>,
    applied: watch::Sender<Cursor>,
    cancel: CancellationToken,
}

impl<S: EventStore> ProjectionTask<S> {
    #[instrument(skip(self), name = "session_projection")]
    async fn run(self) -> Result<(), ProjectionError> {
        let from_cursor = self.state.read().cursor();
        info!(from_cursor, "Session projection started");

        let subscribed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            subscribed = self.store.get_events(from_cursor) => subscribed,
        };
        let mut events = match subscribed {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "Failed to subscribe to event log");
                return Err(e.into());
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Session projection stopping");
                    return Ok(());
                }
                next = events.next() => match next {
                    Some(Ok(event)) => self.handle(&event),
                    Some(Err(e)) => {
                        error!(error = %e, "Event stream failed, projection stopped");
                        return Err(e.into());
                    }
                    None => {
                        info!("Event stream ended");
                        return Ok(());
                    }
                },
            }
        }
    }

    fn handle(&self, event: &Event) {
        let (cursor, changed) = {
            let mut state = self.state.write();
            let changed = state.apply(event).then(|| state.get_session_list());
            (state.cursor(), changed)
        };

        if let Some(sessions) = changed {
            debug!(
                logical_clock = event.logical_clock,
                sessions = sessions.len(),
                "Session list changed"
            );
            // No receivers is not an error
            let _ = self.changes.send(SessionListChanged {
                logical_clock: event.logical_clock,
                sessions,
            });
        }

        self.applied.send_replace(cursor);
    }
}
