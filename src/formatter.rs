//! Event rendering as plain text lines or a JSON document.

use std::io::Write;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::error::McalError;
use crate::types::{CONDENSED_SEPARATOR, CalendarEvent, DisplayOptions, ELLIPSIS};

const TIME_FORMAT: &str = "%H:%M";
const JSON_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";
const UNKNOWN_TIME: &str = "Unknown";

/// JSON shape of one event.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventJson<'a> {
    pub uuid: &'a str,
    pub title: &'a str,
    pub start_date: String,
    pub end_date: String,
    pub duration: f64,
    pub is_all_day: bool,
}

impl<'a> From<&'a CalendarEvent> for EventJson<'a> {
    fn from(event: &'a CalendarEvent) -> Self {
        EventJson {
            uuid: event.uuid(),
            title: event.display_title(),
            start_date: format_json_date(event.start.as_ref()),
            end_date: format_json_date(event.end.as_ref()),
            duration: event.duration_secs(),
            is_all_day: event.is_all_day,
        }
    }
}

fn format_json_date(date: Option<&DateTime<FixedOffset>>) -> String {
    date.map(|d| d.format(JSON_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn format_time(date: Option<&DateTime<FixedOffset>>) -> String {
    date.map(|d| d.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| UNKNOWN_TIME.to_string())
}

/// Shorten a title longer than `max_length` characters.
///
/// The first `max_length - 3` characters are kept, trailing spaces removed,
/// and `"..."` appended. Limits below 3 keep no characters at all.
pub fn truncate_title(title: &str, max_length: Option<usize>) -> String {
    match max_length {
        Some(max) if title.chars().count() > max => {
            let prefix: String = title.chars().take(max.saturating_sub(ELLIPSIS.len())).collect();
            format!("{}{}", prefix.trim_end_matches(' '), ELLIPSIS)
        }
        _ => title.to_string(),
    }
}

/// Format one event as `HH:MM - HH:MM: title`.
pub fn format_event_line(event: &CalendarEvent, max_title_length: Option<usize>) -> String {
    format!(
        "{} - {}: {}",
        format_time(event.start.as_ref()),
        format_time(event.end.as_ref()),
        truncate_title(event.display_title(), max_title_length)
    )
}

/// Format one event as `HH:MM title` for condensed output.
pub fn format_condensed_entry(event: &CalendarEvent, max_title_length: Option<usize>) -> String {
    format!(
        "{} {}",
        format_time(event.start.as_ref()),
        truncate_title(event.display_title(), max_title_length)
    )
}

/// Render events as text lines.
///
/// Condensed mode yields at most one line; no events yield no lines.
pub fn format_text(events: &[CalendarEvent], options: &DisplayOptions) -> Vec<String> {
    if options.condensed {
        if events.is_empty() {
            return Vec::new();
        }
        let entries: Vec<String> = events
            .iter()
            .map(|e| format_condensed_entry(e, options.max_title_length))
            .collect();
        vec![entries.join(CONDENSED_SEPARATOR)]
    } else {
        events
            .iter()
            .map(|e| format_event_line(e, options.max_title_length))
            .collect()
    }
}

/// Render events as a pretty-printed JSON array.
///
/// Title truncation and condensed mode do not apply here.
pub fn format_json(events: &[CalendarEvent]) -> Result<String, McalError> {
    let items: Vec<EventJson> = events.iter().map(EventJson::from).collect();
    Ok(serde_json::to_string_pretty(&items)?)
}

/// Render events in the mode selected by `options`.
pub fn render(events: &[CalendarEvent], options: &DisplayOptions) -> Result<String, McalError> {
    if options.json_output {
        return format_json(events);
    }
    let mut output = String::new();
    for line in format_text(events, options) {
        output.push_str(&line);
        output.push('\n');
    }
    Ok(output)
}

/// Write rendered events to `out`.
///
/// JSON output always ends with a newline; empty text output writes nothing.
pub fn print_events<W: Write>(
    out: &mut W,
    events: &[CalendarEvent],
    options: &DisplayOptions,
) -> Result<(), McalError> {
    let rendered = render(events, options)?;
    if options.json_output {
        writeln!(out, "{}", rendered)?;
    } else {
        write!(out, "{}", rendered)?;
    }
    out.flush()?;
    Ok(())
}
