//! Unit tests for webcal_provider plugin.

use std::sync::Mutex;

use mcal::types::AuthorizationStatus;
use webcal_provider::{
    SUBSCRIPTIONS_ENV, Subscription, authorization_status, calendars, normalize_url,
    parse_subscriptions, subscriptions_from_env,
};

/// Mutex to serialize tests that modify environment variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

#[test]
fn parse_single_subscription() {
    let subs = parse_subscriptions("Work=https://example.com/work.ics");
    assert_eq!(
        subs,
        vec![Subscription {
            name: "Work".to_string(),
            url: "https://example.com/work.ics".to_string(),
        }]
    );
}

#[test]
fn parse_multiple_subscriptions_trims_whitespace() {
    let subs = parse_subscriptions(" Work = https://a.example/w.ics ; Home=https://b.example/h.ics");
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0].name, "Work");
    assert_eq!(subs[0].url, "https://a.example/w.ics");
    assert_eq!(subs[1].name, "Home");
}

#[test]
fn parse_skips_malformed_entries() {
    let subs = parse_subscriptions("nourl;=https://x.example;Empty=;Ok=https://ok.example");
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].name, "Ok");
}

#[test]
fn url_with_query_keeps_equals_sign() {
    let subs = parse_subscriptions("Team=https://cal.example/feed?token=abc");
    assert_eq!(subs[0].url, "https://cal.example/feed?token=abc");
}

#[test]
fn webcal_scheme_becomes_https() {
    assert_eq!(
        normalize_url("webcal://cal.example/feed.ics"),
        "https://cal.example/feed.ics"
    );
    assert_eq!(
        normalize_url("http://cal.example/feed.ics"),
        "http://cal.example/feed.ics"
    );
}

#[test]
fn calendars_use_url_as_handle() {
    let subs = parse_subscriptions("Work=webcal://cal.example/w.ics");
    let cals = calendars(&subs);
    assert_eq!(cals.len(), 1);
    assert_eq!(cals[0].name, "Work");
    assert_eq!(cals[0].handle, "https://cal.example/w.ics");
}

#[test]
fn authorization_follows_environment() {
    let _guard = lock_env();
    unsafe {
        std::env::remove_var(SUBSCRIPTIONS_ENV);
    }
    assert!(subscriptions_from_env().is_empty());
    assert_eq!(authorization_status(), AuthorizationStatus::NotDetermined);

    unsafe {
        std::env::set_var(SUBSCRIPTIONS_ENV, "Work=https://cal.example/w.ics");
    }
    assert_eq!(subscriptions_from_env().len(), 1);
    assert_eq!(authorization_status(), AuthorizationStatus::Authorized);

    unsafe {
        std::env::remove_var(SUBSCRIPTIONS_ENV);
    }
}
