//! Webcal Provider Plugin for mcal.
//!
//! Serves subscribed iCalendar feeds (`MCAL_WEBCAL="Work=https://...;Home=webcal://..."`)
//! through the mcal provider ABI.

use chrono::{DateTime, FixedOffset, Local, TimeZone};
use libc::{c_char, c_int, c_longlong};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::sync::{LazyLock, Mutex};

use mcal::ics::{events_in_range, parse_ics};
use mcal::types::{AuthorizationStatus, CalendarEvent, CalendarInfo};

pub const PLUGIN_NAME: &str = env!("CARGO_PKG_NAME");
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const SUBSCRIPTIONS_ENV: &str = "MCAL_WEBCAL";

/// Downloaded feed bodies by URL, kept for the lifetime of the process.
static CACHE: LazyLock<Mutex<HashMap<String, String>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

thread_local! {
    /// Why the last `provider_fetch_events` call on this thread returned null.
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// A named feed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub name: String,
    pub url: String,
}

/// Get plugin name (do not free returned pointer).
#[unsafe(no_mangle)]
pub extern "C" fn provider_get_name() -> *const c_char {
    static NAME: LazyLock<CString> = LazyLock::new(|| CString::new(PLUGIN_NAME).unwrap());
    NAME.as_ptr()
}

/// Get plugin version (do not free returned pointer).
#[unsafe(no_mangle)]
pub extern "C" fn provider_get_version() -> *const c_char {
    static VERSION: LazyLock<CString> = LazyLock::new(|| CString::new(PLUGIN_VERSION).unwrap());
    VERSION.as_ptr()
}

/// Report whether any subscription is configured.
#[unsafe(no_mangle)]
pub extern "C" fn provider_authorization_status() -> c_int {
    authorization_status().code()
}

/// List subscribed calendars as JSON `[{"name": ..., "handle": ...}]`.
///
/// Free the result with `provider_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn provider_list_calendars() -> *mut c_char {
    let calendars = calendars(&subscriptions_from_env());
    into_c_string(serde_json::to_string(&calendars).ok())
}

/// Fetch events of the calendars in `handles_json` overlapping `[start, end)`.
///
/// `start` and `end` are Unix timestamps. Returns a JSON event array, or null
/// when a feed cannot be downloaded (see `provider_last_error`). Free the
/// result with `provider_free_string`.
///
/// # Safety
/// `handles_json` must be a valid null-terminated C string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn provider_fetch_events(
    handles_json: *const c_char,
    start: c_longlong,
    end: c_longlong,
) -> *mut c_char {
    if handles_json.is_null() {
        return fail("No calendar handles given".to_string());
    }
    let handles = unsafe { CStr::from_ptr(handles_json) }
        .to_str()
        .ok()
        .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok());

    let (Some(handles), Some(start), Some(end)) = (handles, to_local(start), to_local(end)) else {
        return fail("Malformed fetch request".to_string());
    };

    match fetch_events(&handles, start, end) {
        Ok(events) => {
            LAST_ERROR.with_borrow_mut(|last| *last = None);
            into_c_string(serde_json::to_string(&events).ok())
        }
        Err(message) => fail(message),
    }
}

/// Describe the failure of the last `provider_fetch_events` call on this thread.
///
/// Returns null if it succeeded. Free the result with `provider_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn provider_last_error() -> *mut c_char {
    into_c_string(LAST_ERROR.with_borrow(Clone::clone))
}

/// Free memory allocated by `provider_list_calendars` and `provider_fetch_events`.
///
/// # Safety
/// `ptr` must be returned by one of those functions and not freed before.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn provider_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        let _ = unsafe { CString::from_raw(ptr) };
    }
}

fn fail(message: String) -> *mut c_char {
    LAST_ERROR.with_borrow_mut(|last| *last = Some(message));
    std::ptr::null_mut()
}

fn into_c_string(value: Option<String>) -> *mut c_char {
    value
        .and_then(|s| CString::new(s).ok())
        .map_or(std::ptr::null_mut(), CString::into_raw)
}

fn to_local(timestamp: c_longlong) -> Option<DateTime<FixedOffset>> {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.fixed_offset())
}

pub fn authorization_status() -> AuthorizationStatus {
    if subscriptions_from_env().is_empty() {
        AuthorizationStatus::NotDetermined
    } else {
        AuthorizationStatus::Authorized
    }
}

/// Read subscriptions from `MCAL_WEBCAL`.
pub fn subscriptions_from_env() -> Vec<Subscription> {
    std::env::var(SUBSCRIPTIONS_ENV)
        .map(|spec| parse_subscriptions(&spec))
        .unwrap_or_default()
}

/// Parse `Name=URL` pairs separated by `;`. Malformed entries are skipped.
pub fn parse_subscriptions(spec: &str) -> Vec<Subscription> {
    spec.split(';')
        .filter_map(|entry| {
            let (name, url) = entry.split_once('=')?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() {
                return None;
            }
            Some(Subscription {
                name: name.to_string(),
                url: normalize_url(url),
            })
        })
        .collect()
}

/// `webcal://` feeds are served over HTTPS.
pub fn normalize_url(url: &str) -> String {
    match url.strip_prefix("webcal://") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    }
}

pub fn calendars(subscriptions: &[Subscription]) -> Vec<CalendarInfo> {
    subscriptions
        .iter()
        .map(|sub| CalendarInfo {
            name: sub.name.clone(),
            handle: sub.url.clone(),
        })
        .collect()
}

/// Download and parse every feed in `urls`, expanding recurring events.
pub fn fetch_events(
    urls: &[String],
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
) -> Result<Vec<CalendarEvent>, String> {
    let mut events = Vec::new();
    for url in urls {
        let body = download(url)?;
        for calendar in parse_ics(&body, &Local) {
            events.extend(calendar.occurrences(&Local, start, end));
        }
    }
    Ok(events_in_range(events, start, end))
}

fn download(url: &str) -> Result<String, String> {
    if let Some(body) = CACHE.lock().unwrap().get(url) {
        return Ok(body.clone());
    }

    let body = ureq::get(url)
        .call()
        .and_then(|response| response.into_body().read_to_string())
        .map_err(|e| format!("Failed to download {}: {}", url, e))?;
    CACHE
        .lock()
        .unwrap()
        .insert(url.to_string(), body.clone());
    Ok(body)
}
