//! Error type shared by argument resolution, event sources and output.

use thiserror::Error;

use crate::types::AuthorizationStatus;

#[derive(Debug, Error)]
pub enum McalError {
    /// Missing or invalid command-line input.
    #[error("{0}")]
    Usage(String),

    /// The calendar store refused access or has not been set up yet.
    #[error("{}", authorization_hint(.0))]
    Authorization(AuthorizationStatus),

    #[error("No matching calendars found for the provided names.")]
    NoMatchingCalendars,

    /// The calendar store could not be read.
    #[error("{0}")]
    Source(String),
}

impl McalError {
    pub fn is_usage(&self) -> bool {
        matches!(self, McalError::Usage(_))
    }
}

impl From<std::io::Error> for McalError {
    fn from(e: std::io::Error) -> Self {
        McalError::Source(e.to_string())
    }
}

impl From<serde_json::Error> for McalError {
    fn from(e: serde_json::Error) -> Self {
        McalError::Source(format!("Invalid event data: {}", e))
    }
}

fn authorization_hint(status: &AuthorizationStatus) -> &'static str {
    match status {
        AuthorizationStatus::Denied => {
            "Access to calendars denied: grant read permission on the calendar directory"
        }
        AuthorizationStatus::NotDetermined => {
            "Calendar access not set up: create the calendar directory or configure the provider"
        }
        AuthorizationStatus::Authorized => "Calendar access granted",
    }
}
