//! Event selection: filter, deduplicate and limit the events returned by a source.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, TimeZone};

use crate::types::{CalendarEvent, MAX_EVENT_DURATION_SECS, SelectionWindow};

/// Select the events to display from the source's candidates.
///
/// Steps run in this order, each keeping the relative order of its input:
/// 1. all-day events are dropped
/// 2. with `window.from_now_only`, events not ending strictly after `now` are dropped
/// 3. events lasting 24 hours or more are dropped
/// 4. repeated `(identifier, start)` occurrences are dropped, first one wins
/// 5. the result is cut to `max_items`
pub fn select_events<Tz: TimeZone>(
    candidates: Vec<CalendarEvent>,
    window: &SelectionWindow,
    now: &DateTime<Tz>,
    max_items: Option<usize>,
) -> Vec<CalendarEvent> {
    let now = now.fixed_offset();
    let total = candidates.len();

    let mut seen = HashSet::new();
    let selected: Vec<CalendarEvent> = candidates
        .into_iter()
        .filter(|event| !event.is_all_day)
        .filter(|event| !window.from_now_only || ends_after(event, &now))
        .filter(is_shorter_than_a_day)
        .filter(|event| seen.insert(event.instance_key()))
        .take(max_items.unwrap_or(usize::MAX))
        .collect();

    tracing::debug!(
        candidates = total,
        selected = selected.len(),
        "event selection done"
    );
    selected
}

/// An event with no end time has not provably ended after `now`.
fn ends_after(event: &CalendarEvent, now: &DateTime<FixedOffset>) -> bool {
    event.end.is_some_and(|end| end > *now)
}

/// Events with an unknown start or end cannot be measured and pass through.
fn is_shorter_than_a_day(event: &CalendarEvent) -> bool {
    match (event.start, event.end) {
        (Some(start), Some(end)) => {
            end.signed_duration_since(start).num_seconds() < MAX_EVENT_DURATION_SECS
        }
        _ => true,
    }
}
