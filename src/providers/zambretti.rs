//! Zambretti inputs gathered from local station observations.
//!
//! The forecast is made for 09:00 UTC: today's if that has passed, otherwise
//! yesterday's. Inputs for one 09:00 are computed once and reused.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use parking_lot::{Mutex, RwLock};

use super::{Clock, ProviderClient};
use crate::config::SourceConfig;
use crate::error::FetchError;
use crate::types::{RawBody, RawPayload, Source, ZambrettiReading};
use crate::zambretti::{DEFAULT_LOWER_PRESSURE, DEFAULT_UPPER_PRESSURE};

pub const DEFAULT_PRESSURE_PERIOD_SECS: u64 = 10800;
pub const DEFAULT_WINDDIR_PERIOD_SECS: u64 = 1800;

/// Time series from the host's weather station.
pub trait ObservationSource: Send + Sync {
    /// Station pressure samples (mbar) within `[start, end]`, oldest first.
    fn pressure(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, f64)>;
    /// Wind direction samples (degrees) within `[start, end]`.
    fn wind_dir(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, f64)>;
}

/// In-memory observation buffer the host can push samples into.
#[derive(Default)]
pub struct MemoryObservations {
    pressure: RwLock<Vec<(DateTime<Utc>, f64)>>,
    wind_dir: RwLock<Vec<(DateTime<Utc>, f64)>>,
}

impl MemoryObservations {
    pub fn push_pressure(&self, at: DateTime<Utc>, mbar: f64) {
        insert_sorted(&mut self.pressure.write(), at, mbar);
    }

    pub fn push_wind_dir(&self, at: DateTime<Utc>, degrees: f64) {
        insert_sorted(&mut self.wind_dir.write(), at, degrees);
    }
}

fn insert_sorted(v: &mut Vec<(DateTime<Utc>, f64)>, at: DateTime<Utc>, value: f64) {
    let idx = v.partition_point(|(t, _)| *t <= at);
    v.insert(idx, (at, value));
}

fn window(
    v: &[(DateTime<Utc>, f64)],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, f64)> {
    v.iter()
        .filter(|(t, _)| *t >= start && *t <= end)
        .copied()
        .collect()
}

impl ObservationSource for MemoryObservations {
    fn pressure(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, f64)> {
        window(&self.pressure.read(), start, end)
    }

    fn wind_dir(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, f64)> {
        window(&self.wind_dir.read(), start, end)
    }
}

pub struct ZambrettiClient {
    observations: Arc<dyn ObservationSource>,
    clock: Clock,
    last: Mutex<Option<ZambrettiReading>>,
}

impl ZambrettiClient {
    pub fn new(observations: Arc<dyn ObservationSource>, clock: Clock) -> Self {
        Self {
            observations,
            clock,
            last: Mutex::new(None),
        }
    }
}

/// 09:00 UTC on or before `now`.
pub fn event_time(now: DateTime<Utc>) -> DateTime<Utc> {
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default();
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(nine));
    if now >= today {
        today
    } else {
        today - Duration::days(1)
    }
}

/// Gathers the algorithm inputs for the forecast made at `event`.
pub fn reading_at(
    obs: &dyn ObservationSource,
    cfg: &SourceConfig,
    event: DateTime<Utc>,
) -> ZambrettiReading {
    let p_period = cfg
        .pressure_period_secs
        .unwrap_or(DEFAULT_PRESSURE_PERIOD_SECS)
        .max(1);
    let w_period = cfg.winddir_period_secs.unwrap_or(DEFAULT_WINDDIR_PERIOD_SECS);

    let samples = obs.pressure(event - Duration::seconds(p_period as i64), event);
    let pressure_mbar = mean(samples.iter().map(|(_, v)| *v));
    let trend_mbar_per_hour = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) if samples.len() > 1 => {
            Some((last.1 - first.1) * 3600.0 / p_period as f64)
        }
        _ => None,
    };

    let dirs = obs.wind_dir(event - Duration::seconds(w_period as i64), event);
    let wind_index = circular_mean(dirs.iter().map(|(_, d)| *d))
        .map(|avg| ((avg / 22.5 + 0.5).floor() as u8) % 16);

    ZambrettiReading {
        event_time: event,
        pressure_mbar,
        trend_mbar_per_hour,
        wind_index,
        month: event.month0(),
        north: cfg.is_northern(),
        lower_pressure: cfg.lower_pressure.unwrap_or(DEFAULT_LOWER_PRESSURE),
        upper_pressure: cfg.upper_pressure.unwrap_or(DEFAULT_UPPER_PRESSURE),
    }
}

fn mean(it: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = it.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Mean bearing in [0, 360), or `None` without samples.
fn circular_mean(it: impl Iterator<Item = f64>) -> Option<f64> {
    let (mut x, mut y, mut n) = (0.0f64, 0.0f64, 0usize);
    for d in it {
        let r = d.to_radians();
        x += r.cos();
        y += r.sin();
        n += 1;
    }
    if n == 0 {
        return None;
    }
    let deg = y.atan2(x).to_degrees();
    Some(if deg < 0.0 { deg + 360.0 } else { deg })
}

fn is_complete(r: &ZambrettiReading) -> bool {
    r.pressure_mbar.is_some() && r.trend_mbar_per_hour.is_some()
}

#[async_trait]
impl ProviderClient for ZambrettiClient {
    fn source(&self) -> Source {
        Source::Zambretti
    }

    async fn fetch(&self, cfg: &SourceConfig) -> Result<RawPayload, FetchError> {
        let now = (self.clock)();
        let event = event_time(now);

        let cached = self
            .last
            .lock()
            .as_ref()
            .filter(|r| r.event_time == event)
            .cloned();
        let reading = match cached {
            Some(r) => r,
            None => {
                let r = reading_at(self.observations.as_ref(), cfg, event);
                if is_complete(&r) {
                    *self.last.lock() = Some(r.clone());
                }
                r
            }
        };
        Ok(RawPayload::new(Source::Zambretti, now, RawBody::Zambretti(reading))
            .with_location(cfg.location.clone()))
    }
}
