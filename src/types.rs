//! Type definitions and constants for event selection and rendering.

use chrono::{DateTime, FixedOffset, TimeZone};
use serde::{Deserialize, Serialize};

/// A single calendar event as delivered by an event source.
///
/// Fields the source could not supply stay `None`; the accessors below
/// resolve them to their display defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Series identifier. Shared by all occurrences of a recurring event.
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub is_all_day: bool,
}

impl CalendarEvent {
    /// Identifier, or `"Unknown"` when the source did not provide one.
    pub fn uuid(&self) -> &str {
        self.identifier.as_deref().unwrap_or(UNKNOWN_IDENTIFIER)
    }

    /// Title, or `"No Title"` when the source did not provide one.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(NO_TITLE)
    }

    /// Length of the event in seconds (end - start), 0 when either end is unknown.
    pub fn duration_secs(&self) -> f64 {
        match (self.start, self.end) {
            (Some(start), Some(end)) => {
                let delta = end.signed_duration_since(start);
                delta.num_milliseconds() as f64 / 1000.0
            }
            _ => 0.0,
        }
    }

    /// The same event with its times expressed in `tz`.
    pub fn with_timezone<Tz: TimeZone>(self, tz: &Tz) -> Self {
        let convert = |at: DateTime<FixedOffset>| at.with_timezone(tz).fixed_offset();
        CalendarEvent {
            start: self.start.map(convert),
            end: self.end.map(convert),
            ..self
        }
    }

    /// Composite key that identifies a single occurrence.
    pub fn instance_key(&self) -> (String, i64, u32) {
        let (secs, nanos) = self
            .start
            .map(|s| (s.timestamp(), s.timestamp_subsec_nanos()))
            .unwrap_or((0, 0));
        (self.uuid().to_string(), secs, nanos)
    }
}

/// Date range queried from the event source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionWindow {
    /// Local midnight of the first day shown.
    pub start_of_range: DateTime<FixedOffset>,
    /// Local midnight after the last day shown.
    pub end_of_range: DateTime<FixedOffset>,
    /// Drop events that already ended at query time.
    pub from_now_only: bool,
}

/// Output options.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DisplayOptions {
    /// Maximum number of events shown (`None` = unlimited).
    pub max_items: Option<usize>,
    /// Maximum title length in text mode (`None` = unlimited).
    pub max_title_length: Option<usize>,
    /// Single-line text output.
    pub condensed: bool,
    pub json_output: bool,
}

/// Fully resolved invocation: which calendars, which days, how to print.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub calendar_names: Vec<String>,
    pub window: SelectionWindow,
    pub display: DisplayOptions,
}

/// A calendar known to an event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarInfo {
    /// Name matched against the calendar list given on the command line.
    pub name: String,
    /// Source-specific handle passed back when fetching events.
    pub handle: String,
}

/// Whether the event source may be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Authorized,
    Denied,
    NotDetermined,
}

impl AuthorizationStatus {
    /// Decode the status code used across the provider plugin ABI.
    pub fn from_code(code: i32) -> Self {
        match code {
            AUTH_AUTHORIZED => AuthorizationStatus::Authorized,
            AUTH_DENIED => AuthorizationStatus::Denied,
            _ => AuthorizationStatus::NotDetermined,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            AuthorizationStatus::Authorized => AUTH_AUTHORIZED,
            AuthorizationStatus::Denied => AUTH_DENIED,
            AuthorizationStatus::NotDetermined => AUTH_NOT_DETERMINED,
        }
    }
}

// Defaults substituted for missing event fields
pub const UNKNOWN_IDENTIFIER: &str = "Unknown";
pub const NO_TITLE: &str = "No Title";

// Events this long or longer are treated as spanning entries and skipped
pub const MAX_EVENT_DURATION_SECS: i64 = 86_400;

pub const ELLIPSIS: &str = "...";
pub const CONDENSED_SEPARATOR: &str = " | ";

pub const DEFAULT_CALENDAR_DIR: &str = "~/.local/share/mcal/calendars";

// Provider plugin authorization codes
pub const AUTH_AUTHORIZED: i32 = 0;
pub const AUTH_DENIED: i32 = 1;
pub const AUTH_NOT_DETERMINED: i32 = 2;
