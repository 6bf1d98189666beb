//! # Beddy Monitor
//!
//! Composition root for the event log and session projection, plus the
//! `beddy-monitor` binary that drives it from newline-delimited JSON.
//!
//! ## Key Types
//!
//! - [`EventService`]: Backend, live tail and projection owned together
//! - [`MonitorConfig`]: TOML configuration with command-line overrides
//! - [`pump`]: Reads events, stores them and reports session list changes

pub mod config;
pub mod error;
pub mod pump;
pub mod service;

pub use config::{Cli, MonitorConfig};
pub use error::MonitorError;
pub use pump::{PumpStats, Report, pump};
pub use service::{EventService, LiveStore};
