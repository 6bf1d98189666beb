//! In-memory event store
//!
//! Volatile, append-only storage suitable for tests and for clients that
//! re-fetch history on every start.

use std::sync::Arc;

use async_trait::async_trait;
use beddy_core::{CURSOR_START, Cursor, Event};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::StorageError;
use crate::{EventStore, EventStream, empty_stream};

/// In-memory implementation of [`EventStore`]
///
/// Events are kept in `put` order. Since the vector only ever grows, a
/// snapshot is just the length observed when `get_events` is called: the
/// returned stream reads indices below that length and never sees later
/// appends.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<Event>>>,
}

impl InMemoryEventStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the store holds no events
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn put(&self, event: Event) -> Result<(), StorageError> {
        if event.logical_clock == CURSOR_START {
            return Err(StorageError::InvalidLogicalClock(event.logical_clock));
        }
        trace!(logical_clock = event.logical_clock, "Appending event (memory)");
        self.events.write().push(event);
        Ok(())
    }

    async fn get_events(&self, from_cursor: Cursor) -> Result<EventStream, StorageError> {
        let (start, end) = {
            let events = self.events.read();
            match events.iter().position(|e| e.is_after(from_cursor)) {
                Some(start) => (start, events.len()),
                None => return Ok(empty_stream()),
            }
        };

        debug!(from_cursor, count = end - start, "Snapshot read (memory)");

        let events = Arc::clone(&self.events);
        Ok(Box::pin(async_stream::stream! {
            for index in start..end {
                let next = { events.read().get(index).cloned() };
                match next {
                    Some(event) => yield Ok(event),
                    None => break,
                }
            }
        }))
    }

    async fn get_last_event(&self) -> Result<Option<Event>, StorageError> {
        Ok(self.events.read().last().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{StreamExt, TryStreamExt};
    use serde_json::json;

    fn event(clock: u64) -> Event {
        Event::new("test", clock, json!({ "n": clock }))
    }

    async fn collect(store: &InMemoryEventStore, from_cursor: Cursor) -> Vec<Event> {
        store
            .get_events(from_cursor)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = InMemoryEventStore::new();
        assert!(store.is_empty());
        assert!(collect(&store, 0).await.is_empty());
        assert!(collect(&store, 1).await.is_empty());
        assert!(store.get_last_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clock_zero_rejected() {
        let store = InMemoryEventStore::new();
        let result = store.put(Event::new("test", 0, serde_json::Value::Null)).await;
        assert!(matches!(result, Err(StorageError::InvalidLogicalClock(0))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_total_order_replay() {
        let store = InMemoryEventStore::new();
        let events: Vec<Event> = (1..=20).map(event).collect();
        for e in &events {
            store.put(e.clone()).await.unwrap();
        }

        assert_eq!(collect(&store, 0).await, events);
        assert_eq!(store.len(), 20);
    }

    #[tokio::test]
    async fn test_cursor_suffix() {
        let store = InMemoryEventStore::new();
        let events: Vec<Event> = (1..=10).map(event).collect();
        for e in &events {
            store.put(e.clone()).await.unwrap();
        }

        for k in 0..=10u64 {
            let got = collect(&store, k).await;
            assert_eq!(got, events[k as usize..].to_vec(), "cursor {}", k);
        }

        // Past the end is empty, not an error
        assert!(collect(&store, 999).await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_excludes_later_puts() {
        let store = InMemoryEventStore::new();
        for clock in 1..=3 {
            store.put(event(clock)).await.unwrap();
        }

        let mut stream = store.get_events(0).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.logical_clock, 1);

        store.put(event(4)).await.unwrap();

        let rest: Vec<u64> = stream
            .map(|e| e.unwrap().logical_clock)
            .collect()
            .await;
        assert_eq!(rest, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_last_event() {
        let store = InMemoryEventStore::new();
        store.put(event(1)).await.unwrap();
        store.put(event(2)).await.unwrap();

        let last = store.get_last_event().await.unwrap().unwrap();
        assert_eq!(last.logical_clock, 2);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let store = InMemoryEventStore::new();
        let other = store.clone();
        store.put(event(1)).await.unwrap();
        assert_eq!(other.len(), 1);
    }
}
