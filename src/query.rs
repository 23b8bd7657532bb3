// src/query.rs
//! Read-only views over the store for renderers.
//!
//! Every selection keeps only the latest issuance of each period, and rows
//! are plain JSON objects keyed by canonical field name. Missing data yields
//! empty sequences or an empty summary, never an error for the caller to
//! special-case.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::store::{FieldFilter, ForecastStore, TimeWindow};
use crate::types::{Field, FieldValue, ForecastRecord, Source};
use crate::zambretti;

/// One record as handed to a renderer.
pub type Row = Map<String, Value>;

/// Lookup tables for [`label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelModule {
    Directions,
    Tides,
    Clouds,
    Chance,
    WindChar,
    Obvis,
    Precip,
    Zambretti,
}

const DIRECTIONS: &[(&str, &str)] = &[
    ("N", "North"),
    ("NNE", "North-northeast"),
    ("NE", "Northeast"),
    ("ENE", "East-northeast"),
    ("E", "East"),
    ("ESE", "East-southeast"),
    ("SE", "Southeast"),
    ("SSE", "South-southeast"),
    ("S", "South"),
    ("SSW", "South-southwest"),
    ("SW", "Southwest"),
    ("WSW", "West-southwest"),
    ("W", "West"),
    ("WNW", "West-northwest"),
    ("NW", "Northwest"),
    ("NNW", "North-northwest"),
];

const TIDES: &[(&str, &str)] = &[("H", "High Tide"), ("L", "Low Tide")];

const CLOUDS: &[(&str, &str)] = &[
    ("CL", "Clear"),
    ("FW", "Mostly Sunny"),
    ("SC", "Partly Cloudy"),
    ("BK", "Mostly Cloudy"),
    ("B1", "Mostly Cloudy"),
    ("B2", "Mostly Cloudy"),
    ("OV", "Cloudy"),
];

const CHANCE: &[(&str, &str)] = &[
    ("S", "Slight Chance"),
    ("C", "Chance"),
    ("L", "Likely"),
    ("O", "Occasional"),
    ("D", "Definite"),
    ("IS", "Isolated"),
    ("SC", "Scattered"),
    ("NM", "Numerous"),
    ("EC", "Extensive"),
    ("PA", "Patchy"),
    ("AR", "Areas"),
    ("WD", "Widespread"),
];

const WIND_CHAR: &[(&str, &str)] = &[
    ("GN", "Gentle"),
    ("LT", "Light"),
    ("BZ", "Breezy"),
    ("WY", "Windy"),
    ("VW", "Very Windy"),
    ("SD", "Strong/Damaging"),
    ("HF", "Hurricane Force"),
];

const OBVIS: &[(&str, &str)] = &[
    ("F", "Fog"),
    ("PF", "Patchy Fog"),
    ("F+", "Dense Fog"),
    ("PF+", "Patchy Dense Fog"),
    ("H", "Haze"),
    ("BS", "Blowing Snow"),
    ("K", "Smoke"),
    ("BD", "Blowing Dust"),
    ("AF", "Volcanic Ash"),
    ("M", "Mist"),
    ("FF", "Freezing Fog"),
    ("DST", "Dust"),
    ("SND", "Sand"),
    ("SP", "Spray"),
    ("DW", "Dust Whirls"),
    ("SS", "Sandstorm"),
    ("LDS", "Low Drifting Snow"),
    ("LDD", "Low Drifting Dust"),
    ("LDs", "Low Drifting Sand"),
    ("Bs", "Blowing Sand"),
    ("SF", "Shallow Fog"),
];

const PRECIP: &[(&str, &str)] = &[
    ("rain", "Rain"),
    ("rainshwrs", "Rain Showers"),
    ("tstms", "Thunderstorms"),
    ("drizzle", "Drizzle"),
    ("snow", "Snow"),
    ("snowshwrs", "Snow Showers"),
    ("flurries", "Flurries"),
    ("sleet", "Sleet"),
    ("frzngrain", "Freezing Rain"),
    ("frzngdrzl", "Freezing Drizzle"),
    ("hail", "Hail"),
];

/// Human-readable text for a stored code.
pub fn label(module: LabelModule, code: &str) -> Option<&'static str> {
    let table = match module {
        LabelModule::Directions => DIRECTIONS,
        LabelModule::Tides => TIDES,
        LabelModule::Clouds => CLOUDS,
        LabelModule::Chance => CHANCE,
        LabelModule::WindChar => WIND_CHAR,
        LabelModule::Obvis => OBVIS,
        LabelModule::Precip => PRECIP,
        LabelModule::Zambretti => return code.chars().next().and_then(zambretti::text_for),
    };
    let code = code.trim();
    table.iter().find(|(c, _)| *c == code).map(|(_, l)| *l)
}

/// Aggregate view of one UTC day for one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherSummary {
    pub source: Option<Source>,
    pub day: Option<NaiveDate>,
    /// Periods that went into the summary.
    pub periods: usize,
    pub issued_time: Option<DateTime<Utc>>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub temp_avg: Option<f64>,
    pub dewpoint_min: Option<f64>,
    pub dewpoint_max: Option<f64>,
    pub dewpoint_avg: Option<f64>,
    pub humidity_min: Option<f64>,
    pub humidity_max: Option<f64>,
    pub humidity_avg: Option<f64>,
    pub wind_speed_min: Option<f64>,
    pub wind_speed_max: Option<f64>,
    pub wind_speed_avg: Option<f64>,
    pub wind_gust: Option<f64>,
    pub pop: Option<f64>,
    pub qpf: Option<f64>,
    pub qsf: Option<f64>,
    pub clouds: Option<String>,
    pub wind_dir: Option<String>,
    pub wind_char: Option<String>,
    /// Precipitation fields that appear in any period.
    pub precip: BTreeSet<String>,
    pub obvis: BTreeSet<String>,
}

impl WeatherSummary {
    pub fn is_empty(&self) -> bool {
        self.periods == 0
    }
}

/// Latest Zambretti forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZambrettiForecast {
    pub event_time: DateTime<Utc>,
    pub issued_time: DateTime<Utc>,
    pub code: char,
    pub text: Option<&'static str>,
}

#[derive(Default)]
struct Stat {
    min: Option<f64>,
    max: Option<f64>,
    sum: f64,
    n: usize,
}

impl Stat {
    fn add(&mut self, v: Option<f64>) {
        let Some(v) = v else { return };
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
        self.sum += v;
        self.n += 1;
    }

    fn avg(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

#[derive(Default)]
struct Tally(BTreeMap<String, usize>);

impl Tally {
    fn add(&mut self, v: Option<&str>) {
        if let Some(v) = v {
            *self.0.entry(v.to_string()).or_default() += 1;
        }
    }

    /// Most frequent value; ties go to the first in sort order.
    fn mode(&self) -> Option<String> {
        let mut best: Option<(&String, usize)> = None;
        for (k, n) in &self.0 {
            if best.map_or(true, |(_, b)| *n > b) {
                best = Some((k, *n));
            }
        }
        best.map(|(k, _)| k.clone())
    }
}

fn sum_opt(acc: Option<f64>, v: Option<f64>) -> Option<f64> {
    match (acc, v) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    }
}

fn max_opt(acc: Option<f64>, v: Option<f64>) -> Option<f64> {
    match (acc, v) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

pub fn to_row(r: &ForecastRecord) -> Row {
    let mut row = Row::new();
    row.insert("source".into(), Value::from(r.source.as_str()));
    row.insert("issued_time".into(), Value::from(r.issued_time.timestamp()));
    row.insert("event_time".into(), Value::from(r.event_time.timestamp()));
    row.insert("duration_hours".into(), Value::from(r.duration_hours));
    if let Some(loc) = &r.location {
        row.insert("location".into(), Value::from(loc.as_str()));
    }
    for (f, v) in &r.fields {
        let v = match v {
            FieldValue::Number(n) => Value::from(*n),
            FieldValue::Text(s) => Value::from(s.as_str()),
        };
        row.insert(f.column().to_string(), v);
    }
    row
}

/// Drops superseded issuances. Input must be in store order (event time
/// ascending, newest issuance first).
fn latest_per_period(records: Vec<ForecastRecord>) -> Vec<ForecastRecord> {
    let mut seen = BTreeSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert((r.event_time, r.duration_hours)))
        .collect()
}

#[derive(Clone)]
pub struct QueryFacade {
    store: Arc<ForecastStore>,
}

impl QueryFacade {
    pub fn new(store: Arc<ForecastStore>) -> Self {
        Self { store }
    }

    fn records(
        &self,
        source: Source,
        window: TimeWindow,
    ) -> Result<Vec<ForecastRecord>, StoreError> {
        let rows = self.store.query(source, &FieldFilter::All, window)?;
        Ok(latest_per_period(rows))
    }

    /// Periods starting in `[from, to)`, at most `max` of them.
    pub fn weather_periods(
        &self,
        source: Source,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        max: usize,
    ) -> Result<Vec<Row>, StoreError> {
        Ok(self
            .records(source, TimeWindow::between(from, to))?
            .iter()
            .take(max)
            .map(to_row)
            .collect())
    }

    /// Periods starting within the next `hours` hours.
    pub fn next_hours(
        &self,
        source: Source,
        now: DateTime<Utc>,
        hours: u32,
    ) -> Result<Vec<Row>, StoreError> {
        let end = now + Duration::hours(i64::from(hours));
        self.weather_periods(source, now, end, usize::MAX)
    }

    /// Aggregates every period starting on `day` (UTC).
    pub fn weather_summary(&self, source: Source, day: NaiveDate) -> Result<WeatherSummary, StoreError> {
        let Some(midnight) = day.and_hms_opt(0, 0, 0) else {
            return Ok(WeatherSummary::default());
        };
        let start = Utc.from_utc_datetime(&midnight);
        let records = self.records(source, TimeWindow::between(start, start + Duration::days(1)))?;
        if records.is_empty() {
            return Ok(WeatherSummary::default());
        }

        let mut s = WeatherSummary {
            source: Some(source),
            day: Some(day),
            periods: records.len(),
            ..Default::default()
        };
        let (mut temp, mut dew, mut hum, mut wind) =
            (Stat::default(), Stat::default(), Stat::default(), Stat::default());
        let (mut clouds, mut dir, mut chr) = (Tally::default(), Tally::default(), Tally::default());
        for r in &records {
            s.issued_time = s.issued_time.max(Some(r.issued_time));
            temp.add(r.number(Field::Temp));
            dew.add(r.number(Field::Dewpoint));
            hum.add(r.number(Field::Humidity));
            wind.add(r.number(Field::WindSpeed));
            // daily records may only carry the extremes
            s.temp_min = min_opt(s.temp_min, r.number(Field::TempMin));
            s.temp_max = max_opt(s.temp_max, r.number(Field::TempMax));
            s.wind_gust = max_opt(s.wind_gust, r.number(Field::WindGust));
            s.pop = max_opt(s.pop, r.number(Field::Pop));
            s.qpf = sum_opt(s.qpf, r.number(Field::Qpf));
            s.qsf = sum_opt(s.qsf, r.number(Field::Qsf));
            clouds.add(r.text(Field::Clouds));
            dir.add(r.text(Field::WindDir));
            chr.add(r.text(Field::WindChar));
            for f in Field::PRECIP {
                if r.text(f).is_some() {
                    s.precip.insert(f.column().to_string());
                }
            }
            if let Some(o) = r.text(Field::Obvis) {
                s.obvis.insert(o.to_string());
            }
        }
        s.temp_min = min_opt(s.temp_min, temp.min);
        s.temp_max = max_opt(s.temp_max, temp.max);
        s.temp_avg = temp.avg();
        (s.dewpoint_min, s.dewpoint_max, s.dewpoint_avg) = (dew.min, dew.max, dew.avg());
        (s.humidity_min, s.humidity_max, s.humidity_avg) = (hum.min, hum.max, hum.avg());
        (s.wind_speed_min, s.wind_speed_max, s.wind_speed_avg) = (wind.min, wind.max, wind.avg());
        s.clouds = clouds.mode();
        s.wind_dir = dir.mode();
        s.wind_char = chr.mode();
        Ok(s)
    }

    /// High/low tide events at or after `from`, in time order.
    pub fn upcoming_tides(&self, from: DateTime<Utc>, max: usize) -> Result<Vec<Row>, StoreError> {
        Ok(self
            .records(Source::XTide, TimeWindow::since(from))?
            .iter()
            .filter(|r| r.text(Field::Hilo).is_some())
            .take(max)
            .map(to_row)
            .collect())
    }

    /// The `index`-th upcoming tide event (0 = next).
    pub fn tide(&self, from: DateTime<Utc>, index: usize) -> Result<Option<Row>, StoreError> {
        Ok(self.upcoming_tides(from, index.saturating_add(1))?.into_iter().nth(index))
    }

    /// The most recent Zambretti forecast, if any was stored.
    pub fn zambretti(&self) -> Result<Option<ZambrettiForecast>, StoreError> {
        let records = self.store.query(
            Source::Zambretti,
            &FieldFilter::Only(vec![Field::Zcode]),
            TimeWindow::all(),
        )?;
        Ok(latest_per_period(records)
            .into_iter()
            .rev()
            .find_map(|r| {
                let code = r.text(Field::Zcode)?.chars().next()?;
                Some(ZambrettiForecast {
                    event_time: r.event_time,
                    issued_time: r.issued_time,
                    code,
                    text: zambretti::text_for(code),
                })
            }))
    }
}

fn min_opt(acc: Option<f64>, v: Option<f64>) -> Option<f64> {
    match (acc, v) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_cover_each_module() {
        assert_eq!(label(LabelModule::Directions, "NNE"), Some("North-northeast"));
        assert_eq!(label(LabelModule::Tides, "L"), Some("Low Tide"));
        assert_eq!(label(LabelModule::Clouds, "OV"), Some("Cloudy"));
        assert_eq!(label(LabelModule::Chance, "SC"), Some("Scattered"));
        assert_eq!(label(LabelModule::WindChar, "BZ"), Some("Breezy"));
        assert_eq!(label(LabelModule::Obvis, "PF+"), Some("Patchy Dense Fog"));
        assert_eq!(label(LabelModule::Precip, "frzngrain"), Some("Freezing Rain"));
        assert_eq!(label(LabelModule::Zambretti, "A"), Some("Settled fine"));
        assert_eq!(label(LabelModule::Directions, "XYZ"), None);
    }

    #[test]
    fn tally_mode_prefers_count_then_order() {
        let mut t = Tally::default();
        for v in ["SC", "OV", "OV", "CL", "SC"] {
            t.add(Some(v));
        }
        assert_eq!(t.mode().as_deref(), Some("OV"));
        assert_eq!(Tally::default().mode(), None);
    }

    #[test]
    fn rows_use_canonical_names() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut r = ForecastRecord::new(Source::Nws, t, t, 3);
        r.set_number(Field::TempMin, Some(41.0));
        r.set_text(Field::WindDir, Some("SW"));
        let row = to_row(&r);
        assert_eq!(row["source"], "nws");
        assert_eq!(row["temp_min"], 41.0);
        assert_eq!(row["wind_dir"], "SW");
        assert!(!row.contains_key("temp"));
    }
}
