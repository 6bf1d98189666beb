//! Monitor configuration: TOML file plus command-line overrides

use std::fs;
use std::path::{Path, PathBuf};

use beddy_eventstore::{BackendKind, EventStoreConfig};
use beddy_logging::LogConfig;
use beddy_sessions::{DEFAULT_NOTIFICATION_CAPACITY, SessionListServiceConfig};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

#[derive(Debug, Parser)]
#[command(
    name = "beddy-monitor",
    version,
    about = "Feed events through the event log and print session list changes"
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Event store backend (null, memory, persistent)
    #[arg(long)]
    pub backend: Option<BackendKind>,
    /// Database file for the persistent backend
    #[arg(long)]
    pub db_path: Option<PathBuf>,
    /// Read events from this file instead of stdin
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
    /// Human-readable log output instead of JSONL
    #[arg(long)]
    pub pretty: bool,
}

/// Full monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub store: EventStoreConfig,
    pub log: LogConfig,
    /// Change notifications buffered per subscriber
    pub notification_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            store: EventStoreConfig::default(),
            log: LogConfig::default(),
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl MonitorConfig {
    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, MonitorError> {
        toml::from_str(contents).map_err(|e| MonitorError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load a TOML config file
    pub fn load(path: &Path) -> Result<Self, MonitorError> {
        let contents = fs::read_to_string(path).map_err(|source| MonitorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Load the file named on the command line, if any, and apply overrides
    pub fn resolve(cli: &Cli) -> Result<Self, MonitorError> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        Ok(config)
    }

    /// Command-line flags win over file values
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(backend) = cli.backend {
            self.store.backend = backend;
        }
        if let Some(db_path) = &cli.db_path {
            self.store.db_path = db_path.clone();
        }
        if let Some(level) = &cli.log_level {
            self.log.default_level = level.clone();
        }
        if cli.pretty {
            self.log.console.pretty = true;
        }
    }

    pub fn session_config(&self) -> SessionListServiceConfig {
        SessionListServiceConfig {
            notification_capacity: self.notification_capacity,
        }
    }
}
