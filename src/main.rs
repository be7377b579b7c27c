//! Calendar event listing CLI.
//!
//! # Usage
//! ```ignore
//! mcal Work                     // Today's events in calendar "Work"
//! mcal Work,Home 3              // First three events of today
//! mcal Work --now --condense    // Remaining events on one line
//! mcal Work --no-days=7 --json  // Next seven days as JSON
//! ```

use chrono::{DateTime, Local, TimeZone};
use tracing_subscriber::EnvFilter;

use mcal::args::{Args, HELP_MESSAGE, get_test_time};
use mcal::error::McalError;
use mcal::formatter::print_events;
use mcal::selector::select_events;
use mcal::source::{fetch_candidates, open_source};
use mcal::types::Query;

fn main() {
    let args = Args::parse();
    init_logging();

    let result = match get_test_time() {
        Some(now) => run(&args, &now),
        None => run(&args, &Local::now()),
    };

    if let Err(e) = result {
        eprintln!("mcal: {}", e);
        if e.is_usage() {
            eprintln!();
            eprintln!("{}", HELP_MESSAGE);
        }
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("MCAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .init();
}

fn run<Tz: TimeZone + 'static>(args: &Args, now: &DateTime<Tz>) -> Result<(), McalError> {
    let query = Query::from_args(args, now)?;
    tracing::debug!(?query, "resolved query");

    let source = open_source(args, now.timezone())?;
    let candidates = fetch_candidates(source.as_ref(), &query)?;
    let events = select_events(candidates, &query.window, now, query.display.max_items);

    print_events(&mut std::io::stdout().lock(), &events, &query.display)
}
