// src/types.rs
//! Core data model: provider identifiers, the canonical field set, normalized
//! records and raw provider payloads.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of forecast providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "nws")]
    Nws,
    #[serde(rename = "wu")]
    Wu,
    #[serde(rename = "owm")]
    Owm,
    #[serde(rename = "ukmo")]
    Ukmo,
    #[serde(rename = "aeris")]
    Aeris,
    #[serde(rename = "wwo")]
    Wwo,
    #[serde(rename = "ds")]
    DarkSky,
    #[serde(rename = "zambretti")]
    Zambretti,
    #[serde(rename = "xtide")]
    XTide,
}

impl Source {
    pub const ALL: [Source; 9] = [
        Source::Nws,
        Source::Wu,
        Source::Owm,
        Source::Ukmo,
        Source::Aeris,
        Source::Wwo,
        Source::DarkSky,
        Source::Zambretti,
        Source::XTide,
    ];

    /// Stable identifier used in config tables, the store and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Nws => "nws",
            Source::Wu => "wu",
            Source::Owm => "owm",
            Source::Ukmo => "ukmo",
            Source::Aeris => "aeris",
            Source::Wwo => "wwo",
            Source::DarkSky => "ds",
            Source::Zambretti => "zambretti",
            Source::XTide => "xtide",
        }
    }

    pub fn parse(s: &str) -> Option<Source> {
        let s = s.trim().to_ascii_lowercase();
        Source::ALL.into_iter().find(|src| src.as_str() == s)
    }

    /// Upper-case tag used for environment variable names.
    pub fn env_tag(&self) -> String {
        self.as_str().to_ascii_uppercase()
    }

    /// Locally computed sources need no network access.
    pub fn is_local(&self) -> bool {
        matches!(self, Source::Zambretti | Source::XTide)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Categorical,
}

/// Canonical field set. Every field maps to one column in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Desc,
    Zcode,
    Temp,
    TempMin,
    TempMax,
    Dewpoint,
    Humidity,
    WindSpeed,
    WindGust,
    WindDir,
    WindChar,
    Clouds,
    Pop,
    Qpf,
    QpfMin,
    QpfMax,
    Qsf,
    QsfMin,
    QsfMax,
    Rain,
    Rainshwrs,
    Tstms,
    Drizzle,
    Snow,
    Snowshwrs,
    Flurries,
    Sleet,
    Frzngrain,
    Frzngdrzl,
    Hail,
    Obvis,
    WindChill,
    HeatIndex,
    UvIndex,
    AirQuality,
    Pressure,
    Condition,
    Hilo,
    TideOffset,
}

impl Field {
    pub const ALL: [Field; 39] = [
        Field::Desc,
        Field::Zcode,
        Field::Temp,
        Field::TempMin,
        Field::TempMax,
        Field::Dewpoint,
        Field::Humidity,
        Field::WindSpeed,
        Field::WindGust,
        Field::WindDir,
        Field::WindChar,
        Field::Clouds,
        Field::Pop,
        Field::Qpf,
        Field::QpfMin,
        Field::QpfMax,
        Field::Qsf,
        Field::QsfMin,
        Field::QsfMax,
        Field::Rain,
        Field::Rainshwrs,
        Field::Tstms,
        Field::Drizzle,
        Field::Snow,
        Field::Snowshwrs,
        Field::Flurries,
        Field::Sleet,
        Field::Frzngrain,
        Field::Frzngdrzl,
        Field::Hail,
        Field::Obvis,
        Field::WindChill,
        Field::HeatIndex,
        Field::UvIndex,
        Field::AirQuality,
        Field::Pressure,
        Field::Condition,
        Field::Hilo,
        Field::TideOffset,
    ];

    /// Precipitation-type fields carrying chance codes.
    pub const PRECIP: [Field; 11] = [
        Field::Rain,
        Field::Rainshwrs,
        Field::Tstms,
        Field::Drizzle,
        Field::Snow,
        Field::Snowshwrs,
        Field::Flurries,
        Field::Sleet,
        Field::Frzngrain,
        Field::Frzngdrzl,
        Field::Hail,
    ];

    /// Column name in the store; also the key in rows handed to renderers.
    pub fn column(&self) -> &'static str {
        match self {
            Field::Desc => "desc",
            Field::Zcode => "zcode",
            Field::Temp => "temp",
            Field::TempMin => "temp_min",
            Field::TempMax => "temp_max",
            Field::Dewpoint => "dewpoint",
            Field::Humidity => "humidity",
            Field::WindSpeed => "wind_speed",
            Field::WindGust => "wind_gust",
            Field::WindDir => "wind_dir",
            Field::WindChar => "wind_char",
            Field::Clouds => "clouds",
            Field::Pop => "pop",
            Field::Qpf => "qpf",
            Field::QpfMin => "qpf_min",
            Field::QpfMax => "qpf_max",
            Field::Qsf => "qsf",
            Field::QsfMin => "qsf_min",
            Field::QsfMax => "qsf_max",
            Field::Rain => "rain",
            Field::Rainshwrs => "rainshwrs",
            Field::Tstms => "tstms",
            Field::Drizzle => "drizzle",
            Field::Snow => "snow",
            Field::Snowshwrs => "snowshwrs",
            Field::Flurries => "flurries",
            Field::Sleet => "sleet",
            Field::Frzngrain => "frzngrain",
            Field::Frzngdrzl => "frzngdrzl",
            Field::Hail => "hail",
            Field::Obvis => "obvis",
            Field::WindChill => "wind_chill",
            Field::HeatIndex => "heat_index",
            Field::UvIndex => "uv_index",
            Field::AirQuality => "air_quality",
            Field::Pressure => "pressure",
            Field::Condition => "condition",
            Field::Hilo => "hilo",
            Field::TideOffset => "tide_offset",
        }
    }

    pub fn from_column(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.column() == name)
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Temp
            | Field::TempMin
            | Field::TempMax
            | Field::Dewpoint
            | Field::Humidity
            | Field::WindSpeed
            | Field::WindGust
            | Field::Pop
            | Field::Qpf
            | Field::QpfMin
            | Field::QpfMax
            | Field::Qsf
            | Field::QsfMin
            | Field::QsfMax
            | Field::WindChill
            | Field::HeatIndex
            | Field::UvIndex
            | Field::AirQuality
            | Field::Pressure
            | Field::TideOffset => FieldKind::Numeric,
            _ => FieldKind::Categorical,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            FieldValue::Number(_) => None,
        }
    }
}

/// Unique identity of a record in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub source: Source,
    pub issued_time: DateTime<Utc>,
    pub event_time: DateTime<Utc>,
    pub duration_hours: u32,
}

/// One normalized forecast period (or instantaneous event) from one provider.
///
/// Absent fields are unknown, never zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub source: Source,
    pub issued_time: DateTime<Utc>,
    pub event_time: DateTime<Utc>,
    /// 0 for instantaneous events (tides, Zambretti).
    pub duration_hours: u32,
    pub fetched_time: DateTime<Utc>,
    pub location: Option<String>,
    pub fields: BTreeMap<Field, FieldValue>,
}

impl ForecastRecord {
    pub fn new(
        source: Source,
        issued_time: DateTime<Utc>,
        event_time: DateTime<Utc>,
        duration_hours: u32,
    ) -> Self {
        Self {
            source,
            issued_time,
            event_time,
            duration_hours,
            fetched_time: issued_time,
            location: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            source: self.source,
            issued_time: self.issued_time,
            event_time: self.event_time,
            duration_hours: self.duration_hours,
        }
    }

    /// Sets a numeric field; `None` and non-finite values leave the slot empty.
    pub fn set_number(&mut self, field: Field, value: Option<f64>) {
        match value {
            Some(v) if v.is_finite() => {
                self.fields.insert(field, FieldValue::Number(v));
            }
            _ => {}
        }
    }

    /// Sets a categorical field; blank strings leave the slot empty.
    pub fn set_text<S: AsRef<str>>(&mut self, field: Field, value: Option<S>) {
        if let Some(v) = value {
            let t = v.as_ref().trim();
            if !t.is_empty() {
                self.fields.insert(field, FieldValue::Text(t.to_string()));
            }
        }
    }

    pub fn number(&self, field: Field) -> Option<f64> {
        self.fields.get(&field).and_then(FieldValue::as_f64)
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).and_then(FieldValue::as_str)
    }
}

/// Inputs for one Zambretti computation, gathered from station observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZambrettiReading {
    pub event_time: DateTime<Utc>,
    /// Mean station pressure over the pressure period, mbar.
    pub pressure_mbar: Option<f64>,
    /// Pressure change, mbar per hour.
    pub trend_mbar_per_hour: Option<f64>,
    /// Wind direction as a 16-point index, 0 = N.
    pub wind_index: Option<u8>,
    /// Month, 0 = January.
    pub month: u32,
    pub north: bool,
    pub lower_pressure: f64,
    pub upper_pressure: f64,
}

/// Provider-specific shape of a fetched payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBody {
    /// Plain text product (NWS PFM).
    Text(String),
    Json(serde_json::Value),
    /// CSV lines emitted by the tide almanac.
    Lines(Vec<String>),
    Zambretti(ZambrettiReading),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub source: Source,
    pub fetched_at: DateTime<Utc>,
    pub location: Option<String>,
    pub body: RawBody,
}

impl RawPayload {
    pub fn new(source: Source, fetched_at: DateTime<Utc>, body: RawBody) -> Self {
        Self {
            source,
            fetched_at,
            location: None,
            body,
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    /// Serialized form used for diagnostics and digests.
    pub fn to_text(&self) -> String {
        match &self.body {
            RawBody::Text(s) => s.clone(),
            RawBody::Json(v) => v.to_string(),
            RawBody::Lines(lines) => lines.join("\n"),
            RawBody::Zambretti(r) => serde_json::to_string(r).unwrap_or_default(),
        }
    }

    /// Leading part of the payload for log lines.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let text = self.to_text();
        let mut out: String = text.chars().take(max_chars).collect();
        if text.chars().count() > max_chars {
            out.push('…');
        }
        out.replace('\n', " ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn every_field_has_a_unique_column() {
        let mut names: Vec<_> = Field::ALL.iter().map(|f| f.column()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Field::ALL.len());
        for f in Field::ALL {
            assert_eq!(Field::from_column(f.column()), Some(f));
        }
    }

    #[test]
    fn source_ids_round_trip_case_insensitively() {
        assert_eq!(Source::parse("NWS"), Some(Source::Nws));
        assert_eq!(Source::parse("ds"), Some(Source::DarkSky));
        assert_eq!(Source::parse("nope"), None);
        assert_eq!(Source::XTide.env_tag(), "XTIDE");
    }

    #[test]
    fn setters_skip_missing_values() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut r = ForecastRecord::new(Source::Owm, t, t, 3);
        r.set_number(Field::Temp, None);
        r.set_number(Field::Pop, Some(f64::NAN));
        r.set_text(Field::Clouds, Some("  "));
        assert!(r.fields.is_empty());

        r.set_number(Field::Temp, Some(0.0));
        r.set_text(Field::Clouds, Some(" OV "));
        assert_eq!(r.number(Field::Temp), Some(0.0));
        assert_eq!(r.text(Field::Clouds), Some("OV"));
    }

    #[test]
    fn excerpt_truncates_and_flattens() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let p = RawPayload::new(Source::Nws, t, RawBody::Text("line one\nline two".into()));
        assert_eq!(p.excerpt(8), "line one…");
        assert_eq!(p.excerpt(100), "line one line two");
    }
}
