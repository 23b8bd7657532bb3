// src/staleness.rs
//! Per-provider freshness bookkeeping and the backoff rule that decides when a
//! provider may be fetched again.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::SourceConfig;
use crate::error::FetchError;

/// Mutable state the engine keeps for one provider. Lives only in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderState {
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub next_eligible_fetch_time: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Config fingerprint at the time credentials were rejected.
    pub auth_blocked: Option<String>,
    pub last_error: Option<String>,
}

impl ProviderState {
    pub fn is_auth_blocked(&self, cfg: &SourceConfig) -> bool {
        self.auth_blocked
            .as_deref()
            .is_some_and(|fp| fp == cfg.fingerprint())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StalenessPolicy {
    pub max_backoff_multiplier: u32,
    /// Hard upper bound on the wait after failures.
    pub ceiling: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            max_backoff_multiplier: 8,
            ceiling: Duration::from_secs(24 * 3600),
        }
    }
}

impl StalenessPolicy {
    pub fn new(max_backoff_multiplier: u32, ceiling: Duration) -> Self {
        Self {
            max_backoff_multiplier: max_backoff_multiplier.max(1),
            ceiling,
        }
    }

    /// True iff the provider is enabled, not blocked on bad credentials, and
    /// its next eligible time has been reached (a never-fetched provider is
    /// always due).
    pub fn should_fetch(
        &self,
        state: &ProviderState,
        cfg: &SourceConfig,
        now: DateTime<Utc>,
    ) -> bool {
        if !cfg.enabled || state.is_auth_blocked(cfg) {
            return false;
        }
        match state.next_eligible_fetch_time {
            Some(next) => now >= next,
            None => true,
        }
    }

    /// Wait after `failures` consecutive failures.
    pub fn backoff_interval(&self, base: Duration, failures: u32) -> Duration {
        let factor = 2u32
            .checked_pow(failures)
            .unwrap_or(u32::MAX)
            .min(self.max_backoff_multiplier);
        base.saturating_mul(factor).min(self.ceiling.max(base))
    }

    pub fn record_success(&self, state: &mut ProviderState, cfg: &SourceConfig, now: DateTime<Utc>) {
        state.last_fetch_time = Some(now);
        state.last_success_time = Some(now);
        state.consecutive_failures = 0;
        state.auth_blocked = None;
        state.last_error = None;
        state.next_eligible_fetch_time = Some(add(now, cfg.interval()));
    }

    /// Seeds a fresh state from the newest issue time already in the store,
    /// so a restart does not refetch data that is still current.
    pub fn resume_from(&self, state: &mut ProviderState, cfg: &SourceConfig, issued: DateTime<Utc>) {
        state.last_fetch_time = Some(issued);
        state.last_success_time = Some(issued);
        state.next_eligible_fetch_time = Some(add(issued, cfg.interval()));
    }

    pub fn record_failure(
        &self,
        state: &mut ProviderState,
        cfg: &SourceConfig,
        now: DateTime<Utc>,
        error: Option<&FetchError>,
        message: String,
    ) {
        state.last_fetch_time = Some(now);
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error = Some(message);

        let mut wait = self.backoff_interval(cfg.interval(), state.consecutive_failures);
        match error {
            Some(FetchError::RateLimit {
                retry_after: Some(hint),
            }) => wait = wait.max(*hint),
            Some(FetchError::Auth(_)) => state.auth_blocked = Some(cfg.fingerprint()),
            _ => {}
        }
        state.next_eligible_fetch_time = Some(add(now, wait));
    }
}

fn add(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| t.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Source;
    use chrono::TimeZone;

    fn hourly() -> SourceConfig {
        SourceConfig {
            interval_secs: Some(3600),
            ..SourceConfig::for_source(Source::Owm)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn never_fetched_is_due() {
        let p = StalenessPolicy::default();
        assert!(p.should_fetch(&ProviderState::default(), &hourly(), t0()));
    }

    #[test]
    fn resumed_state_waits_one_interval_from_the_stored_issue() {
        let p = StalenessPolicy::default();
        let mut st = ProviderState::default();
        let issued = t0() - chrono::Duration::minutes(20);
        p.resume_from(&mut st, &hourly(), issued);
        assert!(!p.should_fetch(&st, &hourly(), t0()));
        assert!(p.should_fetch(&st, &hourly(), issued + chrono::Duration::hours(1)));
        assert_eq!(st.consecutive_failures, 0);
    }

    #[test]
    fn disabled_is_never_due() {
        let p = StalenessPolicy::default();
        let cfg = SourceConfig {
            enabled: false,
            ..hourly()
        };
        assert!(!p.should_fetch(&ProviderState::default(), &cfg, t0()));
    }

    #[test]
    fn backoff_is_capped_and_reset() {
        let p = StalenessPolicy::new(8, Duration::from_secs(24 * 3600));
        let cfg = hourly();
        let mut st = ProviderState::default();
        for _ in 0..3 {
            p.record_failure(&mut st, &cfg, t0(), None, "boom".into());
        }
        assert_eq!(st.consecutive_failures, 3);
        assert_eq!(st.next_eligible_fetch_time, Some(t0() + chrono::Duration::hours(8)));

        p.record_failure(&mut st, &cfg, t0(), None, "boom".into());
        assert_eq!(st.next_eligible_fetch_time, Some(t0() + chrono::Duration::hours(8)));

        p.record_success(&mut st, &cfg, t0());
        assert_eq!(st.consecutive_failures, 0);
        assert_eq!(st.next_eligible_fetch_time, Some(t0() + chrono::Duration::hours(1)));
    }

    #[test]
    fn ceiling_bounds_the_wait() {
        let p = StalenessPolicy::new(64, Duration::from_secs(5 * 3600));
        assert_eq!(
            p.backoff_interval(Duration::from_secs(3600), 6),
            Duration::from_secs(5 * 3600)
        );
    }

    #[test]
    fn rate_limit_hint_extends_the_wait() {
        let p = StalenessPolicy::default();
        let cfg = hourly();
        let mut st = ProviderState::default();
        let e = FetchError::RateLimit {
            retry_after: Some(Duration::from_secs(6 * 3600)),
        };
        p.record_failure(&mut st, &cfg, t0(), Some(&e), e.to_string());
        assert_eq!(st.next_eligible_fetch_time, Some(t0() + chrono::Duration::hours(6)));
    }

    #[test]
    fn auth_block_lifts_when_config_changes() {
        let p = StalenessPolicy::default();
        let cfg = hourly();
        let mut st = ProviderState::default();
        let e = FetchError::Auth("401".into());
        p.record_failure(&mut st, &cfg, t0(), Some(&e), e.to_string());

        let much_later = t0() + chrono::Duration::days(30);
        assert!(!p.should_fetch(&st, &cfg, much_later));

        let fixed = SourceConfig {
            api_key: Some("rotated".into()),
            ..cfg
        };
        assert!(p.should_fetch(&st, &fixed, much_later));
    }
}
