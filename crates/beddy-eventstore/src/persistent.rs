//! Persistent event store
//!
//! Durable storage on top of redb. Events are stored as JSON in a single
//! table keyed by logical clock, so the key order is the log order and a
//! range scan from `cursor + 1` is a cursor-anchored replay.
//!
//! Reads run inside a redb read transaction, which is an MVCC snapshot:
//! a stream returned by [`EventStore::get_events`] keeps seeing the log as
//! it was when the call resolved, however long it is consumed for.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use beddy_core::{CURSOR_START, Cursor, Event};
use redb::{Database, ReadOnlyTable, ReadableTable, ReadableTableMetadata, TableDefinition};
use tracing::{debug, info, instrument, trace};

use crate::config::EventStoreConfig;
use crate::error::StorageError;
use crate::{EventStore, EventStream, empty_stream};

// Key: logical_clock, Value: JSON-encoded Event
const EVENTS: TableDefinition<u64, &[u8]> = TableDefinition::new("events");

/// Durable implementation of [`EventStore`]
#[derive(Clone)]
pub struct PersistentEventStore {
    db: Arc<Database>,
    config: EventStoreConfig,
}

impl std::fmt::Debug for PersistentEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentEventStore")
            .field("db_path", &self.config.db_path)
            .finish_non_exhaustive()
    }
}

impl PersistentEventStore {
    /// Open or create a store at the given path with default settings
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open(EventStoreConfig::persistent(db_path.as_ref()))
    }

    /// Open or create the database described by `config`
    #[instrument(skip(config), fields(path = %config.db_path.display()))]
    pub fn open(config: EventStoreConfig) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(&config.db_path).map_err(StorageError::database)?;

        let store = Self {
            db: Arc::new(db),
            config,
        };
        store.init_tables()?;

        info!(events = store.event_count()?, "Opened event store database");
        Ok(store)
    }

    /// Create the events table if it does not exist yet
    fn init_tables(&self) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(StorageError::database)?;
        write_txn
            .open_table(EVENTS)
            .map_err(StorageError::database)?;
        write_txn.commit().map_err(StorageError::database)?;

        debug!("Initialized redb tables");
        Ok(())
    }

    /// Number of stored events
    pub fn event_count(&self) -> Result<u64, StorageError> {
        let read_txn = self.db.begin_read().map_err(StorageError::database)?;
        let table = read_txn
            .open_table(EVENTS)
            .map_err(StorageError::database)?;
        table.len().map_err(StorageError::database)
    }

    /// Get the configuration
    pub fn config(&self) -> &EventStoreConfig {
        &self.config
    }
}

/// Read up to `limit` events with `logical_clock >= start`
fn read_page(
    table: &ReadOnlyTable<u64, &'static [u8]>,
    start: u64,
    limit: usize,
) -> Result<Vec<Event>, StorageError> {
    let range = table.range(start..).map_err(StorageError::database)?;

    let mut page = Vec::with_capacity(limit);
    for entry in range.take(limit) {
        let (_, value) = entry.map_err(StorageError::database)?;
        let event: Event = serde_json::from_slice(value.value())?;
        page.push(event);
    }
    Ok(page)
}

#[async_trait]
impl EventStore for PersistentEventStore {
    #[instrument(skip(self, event), fields(logical_clock = event.logical_clock))]
    async fn put(&self, event: Event) -> Result<(), StorageError> {
        // Key 0 would sit below every cursor and never be replayed
        if event.logical_clock == CURSOR_START {
            return Err(StorageError::InvalidLogicalClock(event.logical_clock));
        }

        let value =
            serde_json::to_vec(&event).map_err(|e| StorageError::serialization(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(StorageError::database)?;
        {
            let mut table = write_txn
                .open_table(EVENTS)
                .map_err(StorageError::database)?;

            if let Some(max_events) = self.config.max_events {
                let exists = table
                    .get(event.logical_clock)
                    .map_err(StorageError::database)?
                    .is_some();
                if !exists && table.len().map_err(StorageError::database)? >= max_events {
                    return Err(StorageError::CapacityExceeded);
                }
            }

            table
                .insert(event.logical_clock, value.as_slice())
                .map_err(StorageError::database)?;
        }
        write_txn.commit().map_err(StorageError::database)?;

        trace!("Stored event");
        Ok(())
    }

    async fn get_events(&self, from_cursor: Cursor) -> Result<EventStream, StorageError> {
        let Some(start) = from_cursor.checked_add(1) else {
            return Ok(empty_stream());
        };

        // The read transaction is begun here, so the snapshot is fixed
        // before this call returns.
        let read_txn = self.db.begin_read().map_err(StorageError::database)?;
        let table = read_txn
            .open_table(EVENTS)
            .map_err(StorageError::database)?;
        let batch_size = self.config.read_batch_size.max(1);

        debug!(from_cursor, batch_size, "Snapshot read (persistent)");

        Ok(Box::pin(async_stream::stream! {
            let mut next = Some(start);
            while let Some(page_start) = next {
                let page = match read_page(&table, page_start, batch_size) {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                };
                if page.len() < batch_size {
                    next = None;
                }
                for event in page {
                    if next.is_some() {
                        next = event.logical_clock.checked_add(1);
                    }
                    yield Ok(event);
                }
            }
        }))
    }

    async fn get_last_event(&self) -> Result<Option<Event>, StorageError> {
        let read_txn = self.db.begin_read().map_err(StorageError::database)?;
        let table = read_txn
            .open_table(EVENTS)
            .map_err(StorageError::database)?;

        match table.last().map_err(StorageError::database)? {
            Some((_, value)) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}
