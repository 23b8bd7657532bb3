// tests/staleness_backoff.rs
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use forecast_engine::staleness::{ProviderState, StalenessPolicy};
use forecast_engine::{FetchError, Source, SourceConfig};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn hourly() -> SourceConfig {
    SourceConfig {
        interval_secs: Some(3600),
        api_key: Some("k".into()),
        location: Some("Boston,US".into()),
        ..SourceConfig::for_source(Source::Owm)
    }
}

fn policy() -> StalenessPolicy {
    StalenessPolicy::new(8, StdDuration::from_secs(24 * 3600))
}

#[test]
fn never_fetched_provider_is_due() {
    assert!(policy().should_fetch(&ProviderState::default(), &hourly(), t0()));
}

#[test]
fn disabled_provider_is_never_due() {
    let cfg = SourceConfig {
        enabled: false,
        ..hourly()
    };
    assert!(!policy().should_fetch(&ProviderState::default(), &cfg, t0()));
}

#[test]
fn three_failures_hit_the_multiplier_cap_then_success_resets() {
    let p = policy();
    let cfg = hourly();
    let mut st = ProviderState::default();
    let net = FetchError::Network("timeout".into());

    let mut last = t0();
    for _ in 0..3 {
        p.record_failure(&mut st, &cfg, last, Some(&net), net.to_string());
        last += Duration::minutes(1);
    }
    let last = last - Duration::minutes(1);
    assert_eq!(st.consecutive_failures, 3);
    assert_eq!(st.next_eligible_fetch_time, Some(last + Duration::hours(8)));
    assert!(!p.should_fetch(&st, &cfg, last + Duration::hours(7)));
    assert!(p.should_fetch(&st, &cfg, last + Duration::hours(8)));

    let ok_at = last + Duration::hours(8);
    p.record_success(&mut st, &cfg, ok_at);
    assert_eq!(st.consecutive_failures, 0);
    assert_eq!(st.last_success_time, Some(ok_at));
    assert_eq!(st.next_eligible_fetch_time, Some(ok_at + Duration::hours(1)));
}

#[test]
fn ceiling_caps_long_intervals() {
    let p = StalenessPolicy::new(8, StdDuration::from_secs(6 * 3600));
    let cfg = SourceConfig {
        interval_secs: Some(3 * 3600),
        ..hourly()
    };
    let mut st = ProviderState::default();
    p.record_failure(&mut st, &cfg, t0(), None, "parse".into());
    p.record_failure(&mut st, &cfg, t0(), None, "parse".into());
    assert_eq!(st.next_eligible_fetch_time, Some(t0() + Duration::hours(6)));
}

#[test]
fn retry_after_hint_extends_the_wait() {
    let p = policy();
    let cfg = hourly();
    let mut st = ProviderState::default();
    let limited = FetchError::RateLimit {
        retry_after: Some(StdDuration::from_secs(5 * 3600)),
    };
    p.record_failure(&mut st, &cfg, t0(), Some(&limited), limited.to_string());
    assert_eq!(st.next_eligible_fetch_time, Some(t0() + Duration::hours(5)));
}

#[test]
fn auth_failure_blocks_until_the_section_changes() {
    let p = policy();
    let cfg = hourly();
    let mut st = ProviderState::default();
    let denied = FetchError::Auth("HTTP 401".into());
    p.record_failure(&mut st, &cfg, t0(), Some(&denied), denied.to_string());

    let much_later = t0() + Duration::days(30);
    assert!(!p.should_fetch(&st, &cfg, much_later));

    let fixed = SourceConfig {
        api_key: Some("rotated".into()),
        ..cfg
    };
    assert!(p.should_fetch(&st, &fixed, much_later));
}
