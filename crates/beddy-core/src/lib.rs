//! # Beddy Core
//!
//! Core types and errors for the Beddy event log.
//!
//! Every other crate in the workspace speaks in terms of the [`Event`]
//! record defined here. Events are totally ordered by their
//! [`logical_clock`](Event::logical_clock), which is assigned upstream and
//! never rewritten by a store.
//!
//! ## Key Types
//!
//! - [`Event`]: Immutable record, the unit of the log
//! - [`Cursor`]: Highest logical clock a consumer has already observed
//! - [`event_types`]: Names of the event types the session projection understands

pub mod error;
pub mod event;

pub use error::CoreError;
pub use event::{CURSOR_START, Cursor, Event, event_types};
