//! Structured logging for Beddy services
//!
//! Wraps `tracing-subscriber` so every binary configures logging the same
//! way.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines for log aggregation (default)
//! - **Pretty Output**: Human-readable console format for development
//! - **File Output**: Daily, hourly or single-file output via tracing-appender
//! - **RUST_LOG**: The environment filter overrides the configured level
//!
//! # Quick Start
//!
//! ```ignore
//! use beddy_logging::{BeddySubscriberBuilder, LogConfig};
//!
//! // JSONL to stderr
//! let _guard = BeddySubscriberBuilder::new().init()?;
//!
//! // Development mode with pretty output
//! let _guard = BeddySubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```

pub mod config;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use tracing_appender::non_blocking::WorkerGuard;

use std::fs::{self, File};
use std::io;

use thiserror::Error;
use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to open log file: {0}")]
    File(#[from] io::Error),

    #[error("A global subscriber is already set: {0}")]
    AlreadyInitialized(String),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Builder for configuring and installing the global subscriber
///
/// By default console output is JSONL on stderr. Use
/// [`LogConfig::development`] for pretty output.
#[derive(Debug, Clone, Default)]
pub struct BeddySubscriberBuilder {
    config: LogConfig,
}

impl BeddySubscriberBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Switch the console between pretty and JSONL output
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.config.console.pretty = pretty;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// The configuration the subscriber will be built from
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes file output on drop and must be kept
    /// alive for the duration of the program.
    pub fn init(self) -> Result<Option<WorkerGuard>, LogError> {
        let filter = self.env_filter()?;
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if self.config.console.enabled {
            layers.push(self.console_layer());
        }

        let mut guard = None;
        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = file_writer(file_config)?;
            layers.push(jsonl_layer(&self.config.jsonl, writer));
            guard = Some(file_guard);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    fn env_filter(&self) -> Result<EnvFilter, LogError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => self.default_filter(),
        }
    }

    fn default_filter(&self) -> Result<EnvFilter, LogError> {
        EnvFilter::try_new(&self.config.default_level).map_err(|e| LogError::InvalidFilter {
            filter: self.config.default_level.clone(),
            reason: e.to_string(),
        })
    }

    fn console_layer(&self) -> BoxedLayer {
        if self.config.console.pretty {
            tracing_subscriber::fmt::layer()
                .with_ansi(self.config.console.ansi)
                .with_target(true)
                .with_writer(io::stderr)
                .boxed()
        } else {
            jsonl_layer(&self.config.jsonl, io::stderr)
        }
    }
}

fn jsonl_layer<W>(config: &JsonlConfig, writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(config.include_current_span)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_writer(writer)
        .boxed()
}

/// Open the file writer; `Never` truncates a single file, others append
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LogError> {
    fs::create_dir_all(&config.directory)?;
    let writer = match config.rotation {
        RotationStrategy::Never => tracing_appender::non_blocking(File::create(config.fixed_path())?),
        RotationStrategy::Daily => tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::DAILY,
            &config.directory,
            &config.prefix,
        )),
        RotationStrategy::Hourly => tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::HOURLY,
            &config.directory,
            &config.prefix,
        )),
    };
    Ok(writer)
}
