//! Event source abstraction and the fetch step of the pipeline.

use chrono::{DateTime, FixedOffset, TimeZone};

use crate::error::McalError;
use crate::types::{AuthorizationStatus, CalendarEvent, CalendarInfo, Query};

/// A calendar store that can list calendars and return their events.
pub trait EventSource {
    /// Whether the store may be read. Checked before any other call.
    fn authorization_status(&self) -> AuthorizationStatus;

    /// All calendars in the store.
    fn calendars(&self) -> Result<Vec<CalendarInfo>, McalError>;

    /// Events of `calendars` overlapping `[start, end)`, ordered by start time.
    ///
    /// Events may extend beyond the range on either side.
    fn events(
        &self,
        calendars: &[CalendarInfo],
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<CalendarEvent>, McalError>;
}

/// Wraps a source whose times may carry any offset and reports them in `tz`.
pub struct InTimeZone<S, Tz> {
    inner: S,
    tz: Tz,
}

impl<S: EventSource, Tz: TimeZone> InTimeZone<S, Tz> {
    pub fn new(inner: S, tz: Tz) -> Self {
        InTimeZone { inner, tz }
    }
}

impl<S: EventSource, Tz: TimeZone> EventSource for InTimeZone<S, Tz> {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.inner.authorization_status()
    }

    fn calendars(&self) -> Result<Vec<CalendarInfo>, McalError> {
        self.inner.calendars()
    }

    fn events(
        &self,
        calendars: &[CalendarInfo],
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<CalendarEvent>, McalError> {
        let events = self.inner.events(calendars, start, end)?;
        Ok(events
            .into_iter()
            .map(|event| event.with_timezone(&self.tz))
            .collect())
    }
}

/// Keep the calendars whose name appears in `names`, in store order.
pub fn match_calendars(calendars: Vec<CalendarInfo>, names: &[String]) -> Vec<CalendarInfo> {
    calendars
        .into_iter()
        .filter(|cal| names.iter().any(|name| *name == cal.name))
        .collect()
}

/// Query `source` for the candidate events of `query`.
///
/// Fails with `Authorization` when the store may not be read and with
/// `NoMatchingCalendars` when none of the requested names exists.
pub fn fetch_candidates(
    source: &dyn EventSource,
    query: &Query,
) -> Result<Vec<CalendarEvent>, McalError> {
    match source.authorization_status() {
        AuthorizationStatus::Authorized => {}
        status => return Err(McalError::Authorization(status)),
    }

    let available = source.calendars()?;
    tracing::debug!(count = available.len(), "calendars in store");

    let matching = match_calendars(available, &query.calendar_names);
    if matching.is_empty() {
        return Err(McalError::NoMatchingCalendars);
    }
    tracing::info!(
        calendars = ?matching.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        "querying calendars"
    );

    let events = source.events(
        &matching,
        query.window.start_of_range,
        query.window.end_of_range,
    )?;
    tracing::debug!(count = events.len(), "candidate events fetched");
    Ok(events)
}

/// Open the event source selected on the command line.
///
/// Event times are reported in `tz`, the zone of the clock the query was
/// resolved against.
pub fn open_source<Tz: TimeZone + 'static>(
    args: &crate::args::Args,
    tz: Tz,
) -> Result<Box<dyn EventSource>, McalError> {
    if args.plugin {
        #[cfg(feature = "plugins")]
        {
            let plugin = crate::plugin_api::try_load_plugin().ok_or_else(|| {
                McalError::Source("Provider plugin not found (see mcal --help)".to_string())
            })?;
            return Ok(Box::new(InTimeZone::new(plugin, tz)));
        }
        #[cfg(not(feature = "plugins"))]
        return Err(McalError::Usage(
            "mcal was built without plugin support".to_string(),
        ));
    }

    let dir = shellexpand::tilde(&args.calendar_dir);
    Ok(Box::new(crate::ics::IcsDirectory::with_timezone(
        dir.as_ref(),
        tz,
    )))
}
