//! Built-in event source reading a directory of iCalendar (.ics) files.
//!
//! Every `*.ics` file is one calendar, named by its `X-WR-CALNAME` property
//! or, failing that, by the file stem. Recurring events are expanded over the
//! requested range.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{
    DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc,
};
use ical::IcalParser;
use ical::parser::ical::component::IcalEvent;
use ical::property::Property;

use crate::error::McalError;
use crate::recurrence::{RecurrenceRule, Until};
use crate::source::EventSource;
use crate::types::{AuthorizationStatus, CalendarEvent, CalendarInfo};

/// Calendar directory source. Times are reported in `tz`.
///
/// Each file is read and parsed at most once per source.
pub struct IcsDirectory<Tz: TimeZone = Local> {
    dir: PathBuf,
    tz: Tz,
    parsed: RefCell<HashMap<PathBuf, Vec<IcsCalendar>>>,
}

impl IcsDirectory<Local> {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self::with_timezone(dir, Local)
    }
}

impl<Tz: TimeZone> IcsDirectory<Tz> {
    /// Source whose floating and all-day times are interpreted in `tz`.
    pub fn with_timezone<P: AsRef<Path>>(dir: P, tz: Tz) -> Self {
        IcsDirectory {
            dir: dir.as_ref().to_path_buf(),
            tz,
            parsed: RefCell::new(HashMap::new()),
        }
    }

    fn calendar_files(&self) -> Result<Vec<PathBuf>, McalError> {
        let entries = fs::read_dir(&self.dir).map_err(io_error)?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("ics"))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Parsed contents of `path`. Invalid UTF-8 is replaced rather than rejected.
    fn load(&self, path: &Path) -> Result<Vec<IcsCalendar>, McalError> {
        if let Some(calendars) = self.parsed.borrow().get(path) {
            return Ok(calendars.clone());
        }
        let bytes = fs::read(path).map_err(io_error)?;
        let calendars = parse_ics(&String::from_utf8_lossy(&bytes), &self.tz);
        self.parsed
            .borrow_mut()
            .insert(path.to_path_buf(), calendars.clone());
        Ok(calendars)
    }
}

impl<Tz: TimeZone> EventSource for IcsDirectory<Tz> {
    fn authorization_status(&self) -> AuthorizationStatus {
        match fs::metadata(&self.dir) {
            Ok(meta) if meta.is_dir() => match fs::read_dir(&self.dir) {
                Ok(_) => AuthorizationStatus::Authorized,
                Err(e) if e.kind() == ErrorKind::PermissionDenied => AuthorizationStatus::Denied,
                Err(_) => AuthorizationStatus::NotDetermined,
            },
            Ok(_) => AuthorizationStatus::NotDetermined,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => AuthorizationStatus::Denied,
            Err(_) => AuthorizationStatus::NotDetermined,
        }
    }

    fn calendars(&self) -> Result<Vec<CalendarInfo>, McalError> {
        let mut calendars = Vec::new();
        for path in self.calendar_files()? {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            // an unreadable file is still listed; reading its events fails later
            let name = match self.load(&path) {
                Ok(parsed) => parsed.into_iter().find_map(|cal| cal.name).unwrap_or(stem),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Cannot read calendar file: {}", e);
                    stem
                }
            };
            calendars.push(CalendarInfo {
                name,
                handle: path.to_string_lossy().into_owned(),
            });
        }
        Ok(calendars)
    }

    fn events(
        &self,
        calendars: &[CalendarInfo],
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<CalendarEvent>, McalError> {
        let mut events = Vec::new();
        for calendar in calendars {
            for parsed in self.load(Path::new(&calendar.handle))? {
                events.extend(parsed.occurrences(&self.tz, start, end));
            }
        }
        Ok(events_in_range(events, start, end))
    }
}

fn io_error(e: std::io::Error) -> McalError {
    if e.kind() == ErrorKind::PermissionDenied {
        McalError::Authorization(AuthorizationStatus::Denied)
    } else {
        McalError::from(e)
    }
}

/// One `VCALENDAR` block.
#[derive(Debug, Clone, PartialEq)]
pub struct IcsCalendar {
    pub name: Option<String>,
    pub events: Vec<IcsEvent>,
}

/// A VEVENT as written: a single event, a recurring series or a detached
/// occurrence of a series (`RECURRENCE-ID`).
#[derive(Debug, Clone, PartialEq)]
pub struct IcsEvent {
    /// The event, or the first occurrence of a series.
    pub event: CalendarEvent,
    pub rule: Option<RecurrenceRule>,
    pub exdates: Vec<DateTime<FixedOffset>>,
    pub recurrence_id: Option<DateTime<FixedOffset>>,
    dtstart: Option<WallTime>,
}

impl IcsCalendar {
    /// Occurrences overlapping `[start, end)`, ordered by start time.
    ///
    /// Series are expanded and a detached occurrence replaces the generated
    /// one with the same UID and original start.
    pub fn occurrences<Tz: TimeZone>(
        &self,
        tz: &Tz,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Vec<CalendarEvent> {
        let detached: HashSet<(&str, DateTime<FixedOffset>)> = self
            .events
            .iter()
            .filter_map(|ics| Some((ics.event.uuid(), ics.recurrence_id?)))
            .collect();

        let mut occurrences = Vec::new();
        for ics in &self.events {
            if ics.recurrence_id.is_some() || ics.rule.is_none() {
                occurrences.push(ics.event.clone());
                continue;
            }
            occurrences.extend(ics.expand(tz, start, end).into_iter().filter(|occurrence| {
                occurrence
                    .start
                    .is_none_or(|at| !detached.contains(&(occurrence.uuid(), at)))
            }));
        }
        events_in_range(occurrences, start, end)
    }
}

impl IcsEvent {
    /// Occurrences of a series starting before `end`, after COUNT, UNTIL
    /// and EXDATE are applied.
    fn expand<Tz: TimeZone>(
        &self,
        tz: &Tz,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Vec<CalendarEvent> {
        let (Some(rule), Some(dtstart), Some(first)) = (&self.rule, self.dtstart, self.event.start)
        else {
            return vec![self.event.clone()];
        };
        let length = self
            .event
            .end
            .map_or(TimeDelta::zero(), |event_end| event_end - first);

        let mut occurrences = Vec::new();
        for (index, naive) in rule.starts(dtstart.naive).enumerate() {
            if rule.count.is_some_and(|count| index as u64 >= u64::from(count)) {
                break;
            }
            let wall = WallTime { naive, ..dtstart };
            let Some(at) = wall.resolve(tz) else {
                continue;
            };
            if at >= end || !within_until(rule, &wall, at) {
                break;
            }
            if self.exdates.contains(&at) {
                continue;
            }
            let Some(occurrence_end) = at.checked_add_signed(length) else {
                continue;
            };
            if occurrence_end > start || at >= start {
                occurrences.push(CalendarEvent {
                    start: Some(at),
                    end: Some(occurrence_end),
                    ..self.event.clone()
                });
            }
        }
        occurrences
    }
}

fn within_until(rule: &RecurrenceRule, wall: &WallTime, at: DateTime<FixedOffset>) -> bool {
    match rule.until {
        None => true,
        Some(Until::Date(last)) => wall.naive.date() <= last,
        Some(Until::Utc(last)) => at <= Utc.from_utc_datetime(&last),
        Some(Until::Floating(last)) => wall.naive <= last,
    }
}

/// Parse iCalendar text. Unparsable blocks are logged and skipped.
pub fn parse_ics<Tz: TimeZone>(content: &str, tz: &Tz) -> Vec<IcsCalendar> {
    let mut calendars = Vec::new();
    for calendar in IcalParser::new(content.as_bytes()) {
        match calendar {
            Ok(calendar) => {
                let name = calendar
                    .properties
                    .iter()
                    .find(|p| p.name == "X-WR-CALNAME")
                    .and_then(|p| p.value.as_deref())
                    .map(unescape_text);
                let events = calendar
                    .events
                    .iter()
                    .map(|event| to_ics_event(event, tz))
                    .collect();
                calendars.push(IcsCalendar { name, events });
            }
            Err(e) => tracing::warn!("Error parsing calendar data: {}", e),
        }
    }
    calendars
}

/// Keep events overlapping `[start, end)` and order them by start time.
///
/// Events without a start time are kept and sort first.
pub fn events_in_range(
    events: Vec<CalendarEvent>,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
) -> Vec<CalendarEvent> {
    let mut kept: Vec<CalendarEvent> = events
        .into_iter()
        .filter(|event| match event.start {
            Some(event_start) => {
                let event_end = event.end.unwrap_or(event_start).max(event_start);
                event_start < end && (event_end > start || event_start >= start)
            }
            None => true,
        })
        .collect();
    kept.sort_by_key(|event| event.start);
    kept
}

fn to_ics_event<Tz: TimeZone>(event: &IcalEvent, tz: &Tz) -> IcsEvent {
    let mut identifier = None;
    let mut title = None;
    let mut dtstart = None;
    let mut end = None;
    let mut duration = None;
    let mut rule = None;
    let mut exdates = Vec::new();
    let mut recurrence_id = None;

    for property in &event.properties {
        match property.name.as_str() {
            "UID" => identifier = property.value.clone(),
            "SUMMARY" => title = property.value.as_deref().map(unescape_text),
            "DTSTART" => dtstart = WallTime::parse(property),
            "DTEND" => end = parse_date_time(property, tz).map(|(value, _)| value),
            "DURATION" => duration = property.value.as_deref().and_then(parse_duration),
            "RRULE" => {
                let value = property.value.as_deref().unwrap_or_default();
                rule = RecurrenceRule::parse(value);
                if rule.is_none() {
                    tracing::warn!(rule = value, "Unsupported recurrence rule, using first occurrence only");
                }
            }
            "EXDATE" => exdates.extend(
                WallTime::parse_list(property)
                    .into_iter()
                    .filter_map(|wall| wall.resolve(tz)),
            ),
            "RECURRENCE-ID" => {
                recurrence_id = WallTime::parse(property).and_then(|wall| wall.resolve(tz))
            }
            _ => {}
        }
    }

    let is_all_day = dtstart.is_some_and(|wall| wall.date_only);
    let start = dtstart.and_then(|wall| wall.resolve(tz));

    // DTEND, else DTSTART + DURATION, else one day for all-day events
    let end = end.or_else(|| {
        let start = start?;
        match duration {
            Some(d) => start.checked_add_signed(d),
            None if is_all_day => start.checked_add_signed(TimeDelta::days(1)),
            None => Some(start),
        }
    });

    IcsEvent {
        event: CalendarEvent {
            identifier,
            title,
            start,
            end,
            is_all_day,
        },
        rule,
        exdates,
        recurrence_id,
        dtstart,
    }
}

fn param<'a>(property: &'a Property, name: &str) -> Option<&'a str> {
    property
        .params
        .as_ref()?
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first())
        .map(String::as_str)
}

/// Where a date-time value's wall time is anchored.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Zone {
    Utc,
    Named(chrono_tz::Tz),
    /// Floating times and dates, read in the source's zone.
    Floating,
}

/// A DTSTART-like value before it is pinned to an instant.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WallTime {
    naive: NaiveDateTime,
    zone: Zone,
    date_only: bool,
}

impl WallTime {
    fn parse(property: &Property) -> Option<Self> {
        Self::parse_value(property, property.value.as_deref()?)
    }

    /// All values of a comma-separated property such as EXDATE.
    fn parse_list(property: &Property) -> Vec<Self> {
        property
            .value
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|value| Self::parse_value(property, value))
            .collect()
    }

    fn parse_value(property: &Property, value: &str) -> Option<Self> {
        let value = value.trim();
        let date_only = param(property, "VALUE").is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
            || (value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()));

        if date_only {
            let date = NaiveDate::parse_from_str(value, "%Y%m%d").ok()?;
            return Some(WallTime {
                naive: date.and_hms_opt(0, 0, 0)?,
                zone: Zone::Floating,
                date_only: true,
            });
        }

        if let Some(utc) = value.strip_suffix('Z') {
            return Some(WallTime {
                naive: NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").ok()?,
                zone: Zone::Utc,
                date_only: false,
            });
        }

        let zone = match param(property, "TZID").and_then(|id| id.parse::<chrono_tz::Tz>().ok()) {
            Some(zone) => Zone::Named(zone),
            None => Zone::Floating,
        };
        Some(WallTime {
            naive: NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()?,
            zone,
            date_only: false,
        })
    }

    fn resolve<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<FixedOffset>> {
        match self.zone {
            Zone::Utc => Some(
                Utc.from_utc_datetime(&self.naive)
                    .with_timezone(tz)
                    .fixed_offset(),
            ),
            Zone::Named(zone) => Some(in_zone(&zone, self.naive)?.with_timezone(tz).fixed_offset()),
            Zone::Floating => in_zone(tz, self.naive),
        }
    }
}

/// Parse a DTSTART/DTEND property. Returns the instant and whether it was a bare date.
///
/// UTC values end in `Z`, `TZID=` values resolve through chrono-tz and
/// everything else (floating times, dates) is taken as wall time in `tz`.
pub fn parse_date_time<Tz: TimeZone>(
    property: &Property,
    tz: &Tz,
) -> Option<(DateTime<FixedOffset>, bool)> {
    let wall = WallTime::parse(property)?;
    Some((wall.resolve(tz)?, wall.date_only))
}

/// Wall time in `tz`; times skipped by a DST change move forward one hour.
fn in_zone<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + TimeDelta::hours(1))).earliest())
        .map(|dt| dt.fixed_offset())
}

/// Parse an iCalendar DURATION such as `PT1H30M`, `P1D` or `-P2W`.
pub fn parse_duration(value: &str) -> Option<TimeDelta> {
    let value = value.trim();
    let value = value.strip_prefix('+').unwrap_or(value);
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let rest = value.strip_prefix('P')?;

    let mut total = TimeDelta::zero();
    let mut in_time = false;
    let mut number = String::new();
    for c in rest.chars() {
        match c {
            'T' => in_time = true,
            '0'..='9' => number.push(c),
            unit => {
                let n: i64 = number.parse().ok()?;
                number.clear();
                let part = match (unit, in_time) {
                    ('W', false) => TimeDelta::try_weeks(n)?,
                    ('D', false) => TimeDelta::try_days(n)?,
                    ('H', true) => TimeDelta::try_hours(n)?,
                    ('M', true) => TimeDelta::try_minutes(n)?,
                    ('S', true) => TimeDelta::try_seconds(n)?,
                    _ => return None,
                };
                total = total.checked_add(&part)?;
            }
        }
    }
    if !number.is_empty() {
        return None;
    }
    Some(if negative { -total } else { total })
}

/// Undo iCalendar TEXT escaping (`\,` `\;` `\n` `\\`).
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
