//! # Beddy Event Store
//!
//! Append-only, totally ordered event log with pluggable backends.
//!
//! ## Features
//!
//! - **EventStore trait**: Common contract implemented by every backend
//! - **NullEventStore**: Discards everything, used as a stub or sink
//! - **InMemoryEventStore**: Volatile ordered list
//! - **PersistentEventStore**: redb database keyed by logical clock
//! - **FollowingDecorator**: Turns any backend's finite replay into an
//!   unbounded live tail, delivering each event exactly once
//!
//! ## Example
//!
//! ```rust,ignore
//! use beddy_core::{Event, CURSOR_START};
//! use beddy_eventstore::{EventStore, FollowingDecorator, InMemoryEventStore};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = FollowingDecorator::new(InMemoryEventStore::new());
//!     let mut events = store.get_events(CURSOR_START).await.unwrap();
//!
//!     store.put(Event::new("server.started", 1, serde_json::Value::Null)).await.unwrap();
//!
//!     let event = events.next().await.unwrap().unwrap();
//!     assert_eq!(event.logical_clock, 1);
//! }
//! ```

pub mod config;
pub mod error;
pub mod following;
pub mod memory;
pub mod null;
pub mod persistent;

// Re-exports
pub use config::{BackendKind, EventStoreConfig};
pub use error::StorageError;
pub use following::FollowingDecorator;
pub use memory::InMemoryEventStore;
pub use null::NullEventStore;
pub use persistent::PersistentEventStore;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use beddy_core::{Cursor, Event};
use futures::Stream;

/// Ascending stream of events produced by [`EventStore::get_events`]
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, StorageError>> + Send>>;

/// Storage contract for the event log
///
/// Stores never resequence: events are kept in the order the producer
/// supplied them, and ordering by `logical_clock` is the producer's
/// responsibility.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event to the log
    ///
    /// Each call is independent and may run concurrently with others.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write (I/O failure,
    /// database error, or capacity exceeded). Failures are not retried.
    /// Backends that keep events reject a logical clock of 0 with
    /// [`StorageError::InvalidLogicalClock`].
    async fn put(&self, event: Event) -> Result<(), StorageError>;

    /// Stream every event with `logical_clock > from_cursor`, ascending
    ///
    /// The result reflects a snapshot fixed when this future resolves:
    /// events put afterwards are never yielded by the returned stream.
    /// A cursor past the end yields an empty stream.
    async fn get_events(&self, from_cursor: Cursor) -> Result<EventStream, StorageError>;

    /// The most recently stored event, if any
    ///
    /// Used to resume an inbound transport across restarts.
    async fn get_last_event(&self) -> Result<Option<Event>, StorageError>;
}

#[async_trait]
impl<S: EventStore + ?Sized> EventStore for Arc<S> {
    async fn put(&self, event: Event) -> Result<(), StorageError> {
        (**self).put(event).await
    }

    async fn get_events(&self, from_cursor: Cursor) -> Result<EventStream, StorageError> {
        (**self).get_events(from_cursor).await
    }

    async fn get_last_event(&self) -> Result<Option<Event>, StorageError> {
        (**self).get_last_event().await
    }
}

/// Stream that yields nothing
pub(crate) fn empty_stream() -> EventStream {
    Box::pin(futures::stream::empty())
}
