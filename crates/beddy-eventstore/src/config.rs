//! Event store configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StorageError;
use crate::memory::InMemoryEventStore;
use crate::null::NullEventStore;
use crate::persistent::PersistentEventStore;
use crate::EventStore;

/// Which backend to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Discards everything
    Null,
    /// Volatile, lost on process exit
    Memory,
    /// Durable redb database
    #[default]
    Persistent,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "null" => Ok(Self::Null),
            "memory" => Ok(Self::Memory),
            "persistent" => Ok(Self::Persistent),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// Configuration for an event store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventStoreConfig {
    /// Backend to use
    pub backend: BackendKind,
    /// Path to the database file (persistent backend only)
    pub db_path: PathBuf,
    /// Events fetched per read-transaction page
    pub read_batch_size: usize,
    /// Maximum number of stored events (persistent backend only)
    pub max_events: Option<u64>,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            db_path: PathBuf::from("./data/event_store.redb"),
            read_batch_size: 256,
            max_events: None,
        }
    }
}

impl EventStoreConfig {
    /// Volatile configuration for tests and tools
    pub fn in_memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            ..Default::default()
        }
    }

    /// Persistent configuration at the given path
    pub fn persistent(db_path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Persistent,
            db_path: db_path.into(),
            ..Default::default()
        }
    }

    /// Set the storage quota
    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = Some(max_events);
        self
    }

    /// Build the configured backend
    pub fn open(&self) -> Result<Arc<dyn EventStore>, StorageError> {
        info!(backend = ?self.backend, "Opening event store");
        let store: Arc<dyn EventStore> = match self.backend {
            BackendKind::Null => Arc::new(NullEventStore::new()),
            BackendKind::Memory => Arc::new(InMemoryEventStore::new()),
            BackendKind::Persistent => Arc::new(PersistentEventStore::open(self.clone())?),
        };
        Ok(store)
    }
}
