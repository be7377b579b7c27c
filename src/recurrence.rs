//! Recurrence rules (`RRULE`) for the iCalendar source.
//!
//! Supported: `FREQ` of DAILY, WEEKLY, MONTHLY or YEARLY with `INTERVAL`,
//! `COUNT`, `UNTIL` and plain weekday `BYDAY` codes (DAILY and WEEKLY only).
//! Rules using other parts are rejected and the event is treated as a single
//! occurrence.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta, Weekday};

/// Upper bound on generated periods, guards against rules that never end.
const MAX_PERIODS: u32 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// End of a rule as written in `UNTIL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Until {
    /// Inclusive last date.
    Date(NaiveDate),
    /// Inclusive last start, in UTC.
    Utc(NaiveDateTime),
    /// Inclusive last start, in the event's own wall time.
    Floating(NaiveDateTime),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    pub count: Option<u32>,
    pub until: Option<Until>,
    pub by_day: Vec<Weekday>,
}

impl RecurrenceRule {
    /// Parse an `RRULE` value such as `FREQ=WEEKLY;BYDAY=MO,WE;COUNT=10`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut frequency = None;
        let mut interval = 1;
        let mut count = None;
        let mut until = None;
        let mut by_day = Vec::new();

        for part in value.trim().split(';').filter(|p| !p.is_empty()) {
            let (key, val) = part.split_once('=')?;
            match key.to_ascii_uppercase().as_str() {
                "FREQ" => {
                    frequency = Some(match val.to_ascii_uppercase().as_str() {
                        "DAILY" => Frequency::Daily,
                        "WEEKLY" => Frequency::Weekly,
                        "MONTHLY" => Frequency::Monthly,
                        "YEARLY" => Frequency::Yearly,
                        _ => return None,
                    })
                }
                "INTERVAL" => interval = val.parse().ok().filter(|n| *n > 0)?,
                "COUNT" => count = Some(val.parse().ok()?),
                "UNTIL" => until = Some(parse_until(val)?),
                "BYDAY" => {
                    for code in val.split(',') {
                        by_day.push(parse_weekday(code)?);
                    }
                }
                "WKST" => {}
                _ => return None,
            }
        }

        let frequency = frequency?;
        if !by_day.is_empty() && !matches!(frequency, Frequency::Daily | Frequency::Weekly) {
            return None;
        }
        by_day.sort_by_key(|day| day.num_days_from_monday());
        by_day.dedup();

        Some(RecurrenceRule {
            frequency,
            interval,
            count,
            until,
            by_day,
        })
    }

    /// Occurrence starts in wall time, in order, beginning at `dtstart`.
    ///
    /// `COUNT` and `UNTIL` are not applied here; dates that do not exist
    /// (the 31st of a short month, February 29th) are skipped.
    pub fn starts(&self, dtstart: NaiveDateTime) -> impl Iterator<Item = NaiveDateTime> + '_ {
        (0..MAX_PERIODS)
            .flat_map(move |period| self.period(dtstart.date(), period).unwrap_or_default())
            .filter(move |date| *date >= dtstart.date())
            .map(move |date| date.and_time(dtstart.time()))
    }

    /// Dates of the `period`-th interval after `date`.
    fn period(&self, date: NaiveDate, period: u32) -> Option<Vec<NaiveDate>> {
        let step = period.checked_mul(self.interval)?;

        let dates = match self.frequency {
            Frequency::Daily => {
                let day = date.checked_add_signed(TimeDelta::try_days(step.into())?)?;
                if self.by_day.is_empty() || self.by_day.contains(&day.weekday()) {
                    vec![day]
                } else {
                    Vec::new()
                }
            }
            Frequency::Weekly if self.by_day.is_empty() => {
                vec![date.checked_add_signed(TimeDelta::try_weeks(step.into())?)?]
            }
            Frequency::Weekly => {
                let monday = date
                    .checked_sub_signed(TimeDelta::days(
                        date.weekday().num_days_from_monday().into(),
                    ))?
                    .checked_add_signed(TimeDelta::try_weeks(step.into())?)?;
                self.by_day
                    .iter()
                    .filter_map(|day| {
                        monday.checked_add_signed(TimeDelta::days(
                            day.num_days_from_monday().into(),
                        ))
                    })
                    .collect()
            }
            Frequency::Monthly => date
                .with_day(1)?
                .checked_add_months(Months::new(step))?
                .with_day(date.day())
                .into_iter()
                .collect(),
            Frequency::Yearly => {
                let year = date.year().checked_add(i32::try_from(step).ok()?)?;
                NaiveDate::from_ymd_opt(year, date.month(), date.day())
                    .into_iter()
                    .collect()
            }
        };
        Some(dates)
    }
}

fn parse_until(value: &str) -> Option<Until> {
    let value = value.trim();
    if value.len() == 8 {
        return NaiveDate::parse_from_str(value, "%Y%m%d").ok().map(Until::Date);
    }
    match value.strip_suffix('Z') {
        Some(utc) => NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .ok()
            .map(Until::Utc),
        None => NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
            .ok()
            .map(Until::Floating),
    }
}

fn parse_weekday(code: &str) -> Option<Weekday> {
    match code.trim().to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        // ordinal forms such as 1MO or -1FR
        _ => None,
    }
}
