// src/engine.rs
//! Tick-driven orchestration: decide which providers are due, run their
//! fetch → normalize → upsert cycles in parallel, then fold the outcomes back
//! into per-provider state.
//!
//! A tick takes `&mut self`, so the host cannot overlap two of them. Within a
//! tick each provider cycle is an independent tokio task; one provider
//! failing never affects another.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{EngineConfig, SourceConfig};
use crate::diagnostics::{Diagnostics, DumpKind, DEFAULT_DIAGNOSTIC_DIR};
use crate::error::{CycleError, FetchError, StoreError};
use crate::metrics::{
    ensure_metrics_described, FETCH_ERRORS_TOTAL, FETCH_MS, FETCH_TOTAL, RECORDS_UPSERTED_TOTAL,
    TICK_LAST_RUN_TS,
};
use crate::normalize::normalize;
use crate::providers::http::RetryConfig;
use crate::providers::{build_clients, ClientDeps, ProviderClient};
use crate::staleness::{ProviderState, StalenessPolicy};
use crate::store::ForecastStore;
use crate::types::{RawPayload, Source};

/// Characters of raw payload quoted in failure logs.
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    /// Not due, disabled, or blocked on rejected credentials.
    Skipped,
    Succeeded { records: usize },
    Failed { kind: &'static str, message: String },
}

/// What one tick did, per configured provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub now: DateTime<Utc>,
    pub outcomes: BTreeMap<Source, ProviderOutcome>,
    /// Providers that succeeded but issued nothing newer than what the
    /// store already held.
    pub unchanged: BTreeSet<Source>,
    /// Records removed by retention pruning after the cycles.
    pub pruned: usize,
}

impl TickReport {
    /// Providers whose cycle ran (successfully or not).
    pub fn attempted(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| !matches!(o, ProviderOutcome::Skipped))
            .count()
    }

    pub fn succeeded(&self) -> Vec<Source> {
        self.select(|o| matches!(o, ProviderOutcome::Succeeded { .. }))
    }

    pub fn failed(&self) -> Vec<Source> {
        self.select(|o| matches!(o, ProviderOutcome::Failed { .. }))
    }

    pub fn records_written(&self) -> usize {
        self.outcomes
            .values()
            .map(|o| match o {
                ProviderOutcome::Succeeded { records } => *records,
                _ => 0,
            })
            .sum()
    }

    fn select(&self, f: impl Fn(&ProviderOutcome) -> bool) -> Vec<Source> {
        self.outcomes
            .iter()
            .filter(|(_, o)| f(o))
            .map(|(s, _)| *s)
            .collect()
    }
}

struct CycleResult {
    source: Source,
    outcome: Result<usize, CycleError>,
    excerpt: Option<String>,
    /// Newest issue time in the batch was not past the stored one.
    unchanged: bool,
}

pub struct ForecastEngine {
    config: EngineConfig,
    clients: BTreeMap<Source, Arc<dyn ProviderClient>>,
    states: BTreeMap<Source, ProviderState>,
    store: Arc<ForecastStore>,
    policy: StalenessPolicy,
    diagnostics: Arc<Diagnostics>,
}

impl ForecastEngine {
    /// Builds an engine around prepared clients. Providers whose options
    /// don't validate are disabled here and never fetched.
    pub fn new(
        config: EngineConfig,
        clients: BTreeMap<Source, Arc<dyn ProviderClient>>,
        store: Arc<ForecastStore>,
    ) -> Self {
        ensure_metrics_described();
        let policy = StalenessPolicy::new(config.max_backoff_multiplier, config.backoff_ceiling());
        let mut engine = Self {
            config: disable_invalid(config),
            clients,
            states: BTreeMap::new(),
            store,
            policy,
            diagnostics: Arc::new(Diagnostics::new()),
        };
        engine.sync_states();
        engine
    }

    /// Builds clients for every configured provider from `deps`.
    pub fn from_config(config: EngineConfig, deps: &ClientDeps, store: Arc<ForecastStore>) -> Self {
        let clients = build_clients(&config, deps);
        Self::new(config, clients, store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ForecastStore> {
        &self.store
    }

    pub fn state(&self, source: Source) -> Option<&ProviderState> {
        self.states.get(&source)
    }

    /// Swaps in a new configuration between ticks. State is kept for
    /// providers that remain configured, so backoff carries over; a changed
    /// section lifts an auth block because its fingerprint differs.
    pub fn reload_config(&mut self, config: EngineConfig, deps: &ClientDeps) {
        self.clients = build_clients(&config, deps);
        self.policy = StalenessPolicy::new(config.max_backoff_multiplier, config.backoff_ceiling());
        self.config = disable_invalid(config);
        self.sync_states();
        info!(providers = self.config.providers.len(), "forecast config reloaded");
    }

    /// Drops state for removed providers and creates it for new ones. A new
    /// state resumes from the latest issue time already stored.
    fn sync_states(&mut self) {
        let providers = &self.config.providers;
        self.states.retain(|s, _| providers.contains_key(s));
        for (src, cfg) in &self.config.providers {
            if self.states.contains_key(src) {
                continue;
            }
            let mut state = ProviderState::default();
            match self.store.latest_issued_time(*src) {
                Ok(Some(issued)) => {
                    self.policy.resume_from(&mut state, cfg, issued);
                    debug!(
                        provider = %src,
                        %issued,
                        next = ?state.next_eligible_fetch_time,
                        "resuming from stored forecast"
                    );
                }
                Ok(None) => {}
                Err(e) => warn!(provider = %src, error = %e, "could not read latest forecast time"),
            }
            self.states.insert(*src, state);
        }
    }

    /// Runs every due provider once and returns what happened.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut outcomes: BTreeMap<Source, ProviderOutcome> = BTreeMap::new();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let per_request = self.config.fetch_timeout();
        let mut tasks: JoinSet<CycleResult> = JoinSet::new();
        let mut pending: BTreeSet<Source> = BTreeSet::new();
        let mut unchanged: BTreeSet<Source> = BTreeSet::new();

        for (src, cfg) in &self.config.providers {
            let state = self.states.entry(*src).or_default();
            if !self.policy.should_fetch(state, cfg, now) {
                if cfg.enabled && state.is_auth_blocked(cfg) {
                    debug!(provider = %src, "skipped: credentials rejected for this config");
                }
                outcomes.insert(*src, ProviderOutcome::Skipped);
                continue;
            }
            let Some(client) = self.clients.get(src).cloned() else {
                warn!(provider = %src, "no client for configured provider");
                outcomes.insert(*src, ProviderOutcome::Skipped);
                continue;
            };
            pending.insert(*src);
            let cycle = Cycle {
                source: *src,
                client,
                cfg: cfg.clone(),
                store: self.store.clone(),
                diagnostics: self.diagnostics.clone(),
                timeout: fetch_budget(per_request, cfg.max_tries),
                now,
            };
            let permits = semaphore.clone();
            tasks.spawn(async move {
                // the semaphore is never closed, so acquire only fails if it is
                let _permit = permits.acquire_owned().await.ok();
                cycle.run().await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    pending.remove(&result.source);
                    if result.unchanged && result.outcome.is_ok() {
                        info!(provider = %result.source, "provider returned nothing new");
                        unchanged.insert(result.source);
                    }
                    let outcome = self.apply(result, now);
                    if let Some((src, o)) = outcome {
                        outcomes.insert(src, o);
                    }
                }
                Err(e) => error!(error = %e, "provider task aborted"),
            }
        }
        // tasks that panicked still count as a failed cycle
        for src in pending {
            if let Some(cfg) = self.config.providers.get(&src) {
                let state = self.states.entry(src).or_default();
                self.policy
                    .record_failure(state, cfg, now, None, "provider task aborted".into());
            }
            outcomes.insert(
                src,
                ProviderOutcome::Failed {
                    kind: "aborted",
                    message: "provider task aborted".into(),
                },
            );
        }

        let pruned = self.prune(now).await;
        gauge!(TICK_LAST_RUN_TS).set(now.timestamp() as f64);
        let report = TickReport {
            now,
            outcomes,
            unchanged,
            pruned,
        };
        info!(
            attempted = report.attempted(),
            succeeded = report.succeeded().len(),
            failed = report.failed().len(),
            records = report.records_written(),
            pruned,
            "forecast tick complete"
        );
        report
    }

    fn apply(&mut self, result: CycleResult, now: DateTime<Utc>) -> Option<(Source, ProviderOutcome)> {
        let src = result.source;
        let cfg = self.config.providers.get(&src)?;
        let state = self.states.entry(src).or_default();
        match result.outcome {
            Ok(records) => {
                self.policy.record_success(state, cfg, now);
                counter!(RECORDS_UPSERTED_TOTAL, "provider" => src.as_str()).increment(records as u64);
                debug!(provider = %src, records, "forecast cycle complete");
                Some((src, ProviderOutcome::Succeeded { records }))
            }
            Err(e) => {
                let fetch_err: Option<&FetchError> = match &e {
                    CycleError::Fetch(f) => Some(f),
                    _ => None,
                };
                self.policy
                    .record_failure(state, cfg, now, fetch_err, e.to_string());
                counter!(FETCH_ERRORS_TOTAL, "provider" => src.as_str(), "kind" => e.kind())
                    .increment(1);
                warn!(
                    provider = %src,
                    at = %now,
                    error = %e,
                    kind = e.kind(),
                    failures = state.consecutive_failures,
                    next = ?state.next_eligible_fetch_time,
                    excerpt = result.excerpt.as_deref().unwrap_or(""),
                    "forecast cycle failed"
                );
                if matches!(e, CycleError::Fetch(FetchError::Auth(_))) {
                    error!(provider = %src, "credentials rejected; provider paused until its config changes");
                }
                Some((
                    src,
                    ProviderOutcome::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    },
                ))
            }
        }
    }

    /// Retention pruning for every configured provider, then an optional
    /// VACUUM. Failures here are logged; the tick still completes.
    async fn prune(&self, now: DateTime<Utc>) -> usize {
        let horizons: Vec<(Source, Duration)> = self
            .config
            .providers
            .keys()
            .map(|s| (*s, self.config.retention_for(*s)))
            .collect();
        let store = self.store.clone();
        let vacuum = self.config.vacuum;
        let res = tokio::task::spawn_blocking(move || -> Result<usize, StoreError> {
            let mut total = 0;
            for (src, horizon) in horizons {
                total += store.prune_source(src, horizon, now)?;
            }
            if vacuum && total > 0 {
                store.vacuum()?;
            }
            Ok(total)
        })
        .await;
        match res {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                warn!(error = %e, "prune failed");
                0
            }
            Err(e) => {
                warn!(error = %e, "prune task aborted");
                0
            }
        }
    }
}

/// Time allowed for one provider fetch: every try may use the full
/// per-request timeout, plus the sleeps between tries.
fn fetch_budget(per_request: Duration, max_tries: u32) -> Duration {
    let tries = max_tries.max(1);
    per_request.saturating_mul(tries) + RetryConfig::default().total_delay(tries)
}

/// Disables sections whose required options are missing.
fn disable_invalid(mut config: EngineConfig) -> EngineConfig {
    for (src, cfg) in config.providers.iter_mut() {
        if !cfg.enabled {
            continue;
        }
        if let Err(e) = cfg.validate() {
            error!(provider = %src, error = %e, "forecast will not be run");
            cfg.enabled = false;
        }
    }
    config
}

/// Everything one provider cycle needs, owned so it can move into a task.
struct Cycle {
    source: Source,
    client: Arc<dyn ProviderClient>,
    cfg: SourceConfig,
    store: Arc<ForecastStore>,
    diagnostics: Arc<Diagnostics>,
    timeout: Duration,
    now: DateTime<Utc>,
}

impl Cycle {
    async fn run(self) -> CycleResult {
        let source = self.source;
        counter!(FETCH_TOTAL, "provider" => source.as_str()).increment(1);

        let started = Instant::now();
        let fetched = match tokio::time::timeout(self.timeout, self.client.fetch(&self.cfg)).await {
            Ok(r) => r,
            Err(_) => Err(FetchError::Network(format!(
                "fetch timed out after {}s",
                self.timeout.as_secs()
            ))),
        };
        histogram!(FETCH_MS, "provider" => source.as_str())
            .record(started.elapsed().as_secs_f64() * 1000.0);

        let payload = match fetched {
            Ok(p) => p,
            Err(e) => {
                return CycleResult {
                    source,
                    outcome: Err(e.into()),
                    excerpt: None,
                    unchanged: false,
                }
            }
        };
        if self.cfg.save_raw {
            self.dump(DumpKind::Raw, &payload, &[]);
        }

        let records = match normalize(source, &payload) {
            Ok(r) => r,
            Err(e) => {
                if self.cfg.save_failed {
                    self.dump(DumpKind::Failed, &payload, &[e.to_string()]);
                }
                return CycleResult {
                    source,
                    outcome: Err(e.into()),
                    excerpt: Some(payload.excerpt(EXCERPT_CHARS)),
                    unchanged: false,
                };
            }
        };
        if records.is_empty() {
            warn!(provider = %source, "payload produced no records");
            if self.cfg.save_failed {
                self.dump(DumpKind::Failed, &payload, &["no records".to_string()]);
            }
        }

        let newest = records.iter().map(|r| r.issued_time).max();
        let store = self.store.clone();
        let written = tokio::task::spawn_blocking(move || -> Result<_, StoreError> {
            let previous = store.latest_issued_time(source)?;
            let n = store.upsert(&records)?;
            Ok((n, previous))
        })
        .await
        .unwrap_or_else(|e| Err(StoreError::IoFailure(format!("store task: {e}"))));
        let unchanged = match (&written, newest) {
            (Ok((_, Some(previous))), Some(newest)) => newest <= *previous,
            (Ok(_), None) => true,
            _ => false,
        };
        CycleResult {
            source,
            excerpt: written.is_err().then(|| payload.excerpt(EXCERPT_CHARS)),
            outcome: written.map(|(n, _)| n).map_err(CycleError::from),
            unchanged,
        }
    }

    fn dump(&self, kind: DumpKind, payload: &RawPayload, messages: &[String]) {
        let dir = self
            .cfg
            .diagnostic_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_DIAGNOSTIC_DIR.into());
        match self
            .diagnostics
            .save(&dir, self.source, kind, &payload.to_text(), messages, self.now)
        {
            Ok(Some(path)) => debug!(provider = %self.source, path = %path.display(), "payload saved"),
            Ok(None) => {}
            Err(e) => warn!(provider = %self.source, error = %e, "could not save payload"),
        }
    }
}
