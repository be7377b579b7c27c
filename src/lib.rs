//! List upcoming calendar events for a configurable window of days.
//!
//! Pipeline:
//! - [`args`] resolves the command line into a [`types::Query`]
//! - a [`source::EventSource`] returns candidate events
//! - [`selector`] filters, deduplicates and limits them
//! - [`formatter`] prints them as text lines or JSON

pub mod args;
pub mod error;
pub mod formatter;
pub mod ics;
pub mod recurrence;
pub mod selector;
pub mod source;
pub mod types;

#[cfg(feature = "plugins")]
pub mod plugin_api;
