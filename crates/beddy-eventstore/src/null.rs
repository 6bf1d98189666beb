//! Null event store

use async_trait::async_trait;
use beddy_core::{Cursor, Event};
use tracing::trace;

use crate::error::StorageError;
use crate::{EventStore, EventStream, empty_stream};

/// Event store that discards every write and never yields anything
///
/// Useful as a sink, or wrapped in a [`FollowingDecorator`](crate::FollowingDecorator)
/// to get a pure live stream with no history.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventStore;

impl NullEventStore {
    /// Create a new null store
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventStore for NullEventStore {
    async fn put(&self, event: Event) -> Result<(), StorageError> {
        trace!(logical_clock = event.logical_clock, "Discarding event");
        Ok(())
    }

    async fn get_events(&self, _from_cursor: Cursor) -> Result<EventStream, StorageError> {
        Ok(empty_stream())
    }

    async fn get_last_event(&self) -> Result<Option<Event>, StorageError> {
        Ok(None)
    }
}
