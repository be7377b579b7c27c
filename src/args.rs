//! Command-line argument parsing using clap.
//!
//! Arguments follow the mcal-list convention: `<cal-names> [items-to-display] [options]`

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta, TimeZone};
use clap::{Parser, ValueHint};

use crate::error::McalError;
use crate::types::{DEFAULT_CALENDAR_DIR, DisplayOptions, Query, SelectionWindow};

#[derive(Parser, Debug)]
#[command(name = "mcal")]
#[command(about = "Lists calendar events for today or a range of days", long_about = None)]
#[command(version)]
#[command(after_help = HELP_MESSAGE)]
pub struct Args {
    /// Comma-separated list of calendar names to filter on.
    #[arg(index = 1, value_name = "cal-names", value_hint = ValueHint::Other)]
    pub calendars: String,

    /// Limit the number of events displayed.
    #[arg(index = 2, value_name = "items-to-display", value_hint = ValueHint::Other)]
    pub items: Option<String>,

    /// Output events in JSON format.
    #[arg(long, help_heading = "Output options")]
    pub json: bool,

    /// Condense to one line (ignored for JSON output).
    #[arg(long, help_heading = "Output options")]
    pub condense: bool,

    /// Trim event titles in plain text output.
    #[arg(long, help_heading = "Output options", value_name = "length")]
    pub max_title_length: Option<i64>,

    /// Only show events that have not ended yet.
    #[arg(long, help_heading = "Range options")]
    pub now: bool,

    /// Number of days to display (default 1 - today).
    #[arg(
        long,
        default_value_t = 1,
        help_heading = "Range options",
        value_name = "days"
    )]
    pub no_days: i64,

    /// Move the start day forward or back (default 0 - today).
    #[arg(
        long,
        default_value_t = 0,
        allow_negative_numbers = true,
        help_heading = "Range options",
        value_name = "days"
    )]
    pub start_day: i64,

    /// Directory holding one iCalendar (.ics) file per calendar.
    #[arg(
        long,
        env = "MCAL_CALENDAR_DIR",
        default_value = DEFAULT_CALENDAR_DIR,
        help_heading = "Source options",
        value_name = "path",
        value_hint = ValueHint::DirPath
    )]
    pub calendar_dir: String,

    /// Read events from the provider plugin instead of the calendar directory.
    ///
    /// The plugin file (`libwebcal_provider.so`) must be in one of:
    /// - `./target/release/` (after building the workspace)
    /// - `~/.local/lib/mcal/plugins/`
    /// - `/usr/lib/mcal/plugins/`
    #[arg(short = 'P', long = "plugin", help_heading = "Source options")]
    pub plugin: bool,
}

/// Help message displayed with --help and after usage errors.
pub const HELP_MESSAGE: &str = "List calendar events for today and the following days.

Examples:
  mcal Work                       Today's events in calendar \"Work\"
  mcal Work,Home 5                First five events of today in two calendars
  mcal Work --now --condense      Remaining events of today on one line
  mcal Work --no-days=7 --json    The next seven days as JSON
  mcal Work --start-day=-1        Yesterday's events
  mcal Work --max-title-length=20 Titles cut to 20 characters";

impl Args {
    /// Parse process arguments.
    ///
    /// Help and version requests exit with 0, every other parse failure with 1.
    pub fn parse() -> Self {
        match <Self as Parser>::try_parse() {
            Ok(args) => args,
            Err(e) => {
                use clap::error::ErrorKind;
                match e.kind() {
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
                    _ => {
                        let _ = e.print();
                        std::process::exit(1);
                    }
                }
            }
        }
    }
}

impl Query {
    /// Resolve parsed arguments into a query relative to `now`.
    pub fn from_args<Tz: TimeZone>(args: &Args, now: &DateTime<Tz>) -> Result<Self, McalError> {
        let calendar_names = parse_calendar_names(&args.calendars)?;

        let max_items = args.items.as_deref().map(parse_item_count).transpose()?;

        let max_title_length = match args.max_title_length {
            Some(n) if n > 0 => Some(n as usize),
            Some(_) => {
                return Err(McalError::Usage(
                    "Invalid value for --max-title-length".to_string(),
                ));
            }
            None => None,
        };

        if args.no_days <= 0 {
            return Err(McalError::Usage("Invalid value for --no-days".to_string()));
        }

        let window = resolve_window(now, args.start_day, args.no_days, args.now)?;

        Ok(Query {
            calendar_names,
            window,
            display: DisplayOptions {
                max_items,
                max_title_length,
                condensed: args.condense,
                json_output: args.json,
            },
        })
    }
}

/// Split a comma-separated calendar list, trimming whitespace around each name.
pub fn parse_calendar_names(list: &str) -> Result<Vec<String>, McalError> {
    let names: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect();

    if names.is_empty() {
        return Err(McalError::Usage(format!("Invalid calendar list: {:?}", list)));
    }
    Ok(names)
}

/// Parse the optional positional item count (non-negative integer).
pub fn parse_item_count(value: &str) -> Result<usize, McalError> {
    value
        .parse::<usize>()
        .map_err(|_| McalError::Usage(format!("Invalid argument: {}", value)))
}

/// Compute the query window: `start_day` days from today's local midnight,
/// spanning `no_days` calendar days.
pub fn resolve_window<Tz: TimeZone>(
    now: &DateTime<Tz>,
    start_day: i64,
    no_days: i64,
    from_now_only: bool,
) -> Result<SelectionWindow, McalError> {
    let tz = now.timezone();
    let today = now.date_naive();

    let first_day = add_days(today, start_day, "--start-day")?;
    let last_day = add_days(first_day, no_days, "--no-days")?;

    Ok(SelectionWindow {
        start_of_range: start_of_day(&tz, first_day)?,
        end_of_range: start_of_day(&tz, last_day)?,
        from_now_only,
    })
}

fn add_days(date: NaiveDate, days: i64, flag: &str) -> Result<NaiveDate, McalError> {
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| McalError::Usage(format!("Invalid value for {}", flag)))
}

/// First instant of `date` in `tz`.
///
/// When midnight falls in a DST gap the first valid hour of the day is used.
fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Result<DateTime<FixedOffset>, McalError> {
    (0..24)
        .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
        .find_map(|time| tz.from_local_datetime(&date.and_time(time)).earliest())
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| McalError::Usage(format!("Cannot resolve midnight of {}", date)))
}

/// Get the current time, respecting the MCAL_TEST_TIME environment variable for testing.
///
/// The override is an RFC 3339 timestamp; its UTC offset becomes the local offset.
pub fn get_test_time() -> Option<DateTime<FixedOffset>> {
    if let Ok(test_time) = std::env::var("MCAL_TEST_TIME")
        && let Ok(now) = DateTime::parse_from_rfc3339(&test_time)
    {
        return Some(now);
    }
    None
}
