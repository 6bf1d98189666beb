//! # Beddy Sessions
//!
//! Derives the list of active monitoring sessions from the event log.
//!
//! ## Features
//!
//! - **SessionList**: Pure fold of events into session state, with
//!   supersession, disconnect and server restart rules
//! - **SessionListService**: Background task that follows a live-tailed
//!   store and publishes a [`SessionListChanged`] for every real change
//! - **Snapshots**: Serializable checkpoints to restart the projection from
//!   a cursor instead of the beginning of the log
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use beddy_eventstore::{FollowingDecorator, InMemoryEventStore};
//! use beddy_sessions::SessionListService;
//!
//! let store = Arc::new(FollowingDecorator::new(InMemoryEventStore::new()));
//! let service = SessionListService::start(Arc::clone(&store), Default::default());
//! let mut changes = service.subscribe();
//!
//! // ... store.put(event).await? ...
//!
//! while let Ok(change) = changes.recv().await {
//!     println!("{} sessions at clock {}", change.sessions.len(), change.logical_clock);
//! }
//! ```

pub mod error;
pub mod events;
pub mod projection;
pub mod service;
pub mod session;

// Re-exports
pub use error::ProjectionError;
pub use events::{
    ClientConnectedData, ClientDisconnectedData, SessionEndedData, SessionEvent,
    SessionStartedData, WEB_SOCKET_CLOSE_ABNORMAL,
};
pub use projection::{SessionList, SessionListSnapshot};
pub use service::{
    DEFAULT_NOTIFICATION_CAPACITY, SessionListChanged, SessionListService,
    SessionListServiceConfig,
};
pub use session::{HostConnectionState, Session};
