//! Plugin API for dynamic loading of calendar provider plugins.
//!
//! Payloads cross the boundary as JSON in NUL-terminated strings owned by
//! the plugin and released with `provider_free_string`.

use chrono::{DateTime, FixedOffset};
use libc::{c_char, c_int, c_longlong};
use std::ffi::{CStr, CString};
use std::path::Path;

use crate::error::McalError;
use crate::source::EventSource;
use crate::types::{AuthorizationStatus, CalendarEvent, CalendarInfo};

type StatusFn = unsafe extern "C" fn() -> c_int;
type ListCalendarsFn = unsafe extern "C" fn() -> *mut c_char;
type FetchEventsFn = unsafe extern "C" fn(*const c_char, c_longlong, c_longlong) -> *mut c_char;
type FreeStringFn = unsafe extern "C" fn(*mut c_char);
type LastErrorFn = unsafe extern "C" fn() -> *mut c_char;

/// Handle to a loaded provider plugin.
pub struct PluginHandle {
    #[allow(dead_code)]
    lib: libloading::Library,
    authorization_status_fn: libloading::Symbol<'static, StatusFn>,
    list_calendars_fn: libloading::Symbol<'static, ListCalendarsFn>,
    fetch_events_fn: libloading::Symbol<'static, FetchEventsFn>,
    free_string_fn: libloading::Symbol<'static, FreeStringFn>,
    last_error_fn: libloading::Symbol<'static, LastErrorFn>,
}

impl PluginHandle {
    /// Load plugin from path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, libloading::Error> {
        let lib = unsafe { libloading::Library::new(path.as_ref())? };

        unsafe {
            let authorization_status_fn: libloading::Symbol<StatusFn> =
                lib.get(b"provider_authorization_status")?;
            let list_calendars_fn: libloading::Symbol<ListCalendarsFn> =
                lib.get(b"provider_list_calendars")?;
            let fetch_events_fn: libloading::Symbol<FetchEventsFn> =
                lib.get(b"provider_fetch_events")?;
            let free_string_fn: libloading::Symbol<FreeStringFn> =
                lib.get(b"provider_free_string")?;
            let last_error_fn: libloading::Symbol<LastErrorFn> =
                lib.get(b"provider_last_error")?;

            // Extend lifetime to match struct
            let authorization_status_fn: libloading::Symbol<'static, StatusFn> =
                std::mem::transmute(authorization_status_fn);
            let list_calendars_fn: libloading::Symbol<'static, ListCalendarsFn> =
                std::mem::transmute(list_calendars_fn);
            let fetch_events_fn: libloading::Symbol<'static, FetchEventsFn> =
                std::mem::transmute(fetch_events_fn);
            let free_string_fn: libloading::Symbol<'static, FreeStringFn> =
                std::mem::transmute(free_string_fn);
            let last_error_fn: libloading::Symbol<'static, LastErrorFn> =
                std::mem::transmute(last_error_fn);

            Ok(PluginHandle {
                lib,
                authorization_status_fn,
                list_calendars_fn,
                fetch_events_fn,
                free_string_fn,
                last_error_fn,
            })
        }
    }

    /// Copy a plugin-owned string and hand it back to the plugin.
    ///
    /// # Safety
    /// `ptr` must be null or a string returned by this plugin that was not freed yet.
    unsafe fn take_string(&self, ptr: *mut c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        let result = unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .ok()
            .map(str::to_string);
        unsafe { (self.free_string_fn)(ptr) };
        result
    }
}

impl EventSource for PluginHandle {
    fn authorization_status(&self) -> AuthorizationStatus {
        let code = unsafe { (self.authorization_status_fn)() };
        AuthorizationStatus::from_code(code)
    }

    fn calendars(&self) -> Result<Vec<CalendarInfo>, McalError> {
        let json = unsafe { self.take_string((self.list_calendars_fn)()) }
            .ok_or_else(|| McalError::Source("Provider failed to list calendars".to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn events(
        &self,
        calendars: &[CalendarInfo],
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Result<Vec<CalendarEvent>, McalError> {
        let handles: Vec<&str> = calendars.iter().map(|c| c.handle.as_str()).collect();
        let handles_cstr = CString::new(serde_json::to_string(&handles)?)
            .map_err(|e| McalError::Source(e.to_string()))?;

        let json = unsafe {
            self.take_string((self.fetch_events_fn)(
                handles_cstr.as_ptr(),
                start.timestamp() as c_longlong,
                end.timestamp() as c_longlong,
            ))
        }
        .ok_or_else(|| {
            let reason = unsafe { self.take_string((self.last_error_fn)()) };
            McalError::Source(match reason {
                Some(reason) => format!("Provider failed to fetch events: {}", reason),
                None => "Provider failed to fetch events".to_string(),
            })
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Try to load the provider plugin from standard locations.
pub fn try_load_plugin() -> Option<PluginHandle> {
    let search_paths = [
        // Build directory (development)
        "./target/debug/libwebcal_provider.so",
        "./target/release/libwebcal_provider.so",
        // User local directory
        "~/.local/lib/mcal/plugins/libwebcal_provider.so",
        // System directory
        "/usr/lib/mcal/plugins/libwebcal_provider.so",
        "/usr/local/lib/mcal/plugins/libwebcal_provider.so",
        // Relative to executable
        "./plugins/libwebcal_provider.so",
        "./libwebcal_provider.so",
    ];

    for path in &search_paths {
        let expanded = shellexpand::tilde(path);
        match PluginHandle::load(expanded.as_ref()) {
            Ok(handle) => {
                tracing::debug!(path = %expanded, "provider plugin loaded");
                return Some(handle);
            }
            Err(e) => tracing::trace!(path = %expanded, "plugin not loaded: {}", e),
        }
    }

    None
}
