// src/normalize/mod.rs
//! Maps provider payloads onto [`ForecastRecord`]s in canonical units.
//!
//! Payload-level problems (no issue time, no forecast list) are a
//! [`ParseError`]. Anything smaller is salvaged: a bad field stays empty, and
//! a period without its own event time is skipped with a warning.

pub mod aeris;
pub mod darksky;
pub mod nws;
pub mod owm;
pub mod ukmo;
pub mod wu;
pub mod wwo;
pub mod xtide;
pub mod zambretti;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ParseError;
use crate::types::{ForecastRecord, RawBody, RawPayload, Source};

/// Normalizes one payload. Output is sorted by event time.
pub fn normalize(source: Source, payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let mut records = match source {
        Source::Nws => nws::normalize(payload)?,
        Source::Wu => wu::normalize(payload)?,
        Source::Owm => owm::normalize(payload)?,
        Source::Ukmo => ukmo::normalize(payload)?,
        Source::Aeris => aeris::normalize(payload)?,
        Source::Wwo => wwo::normalize(payload)?,
        Source::DarkSky => darksky::normalize(payload)?,
        Source::Zambretti => zambretti::normalize(payload)?,
        Source::XTide => xtide::normalize(payload)?,
    };
    for r in records.iter_mut() {
        r.source = source;
        r.fetched_time = payload.fetched_at;
        if r.location.is_none() {
            r.location = payload.location.clone();
        }
    }
    records.sort_by_key(|r| r.event_time);
    Ok(records)
}

pub(crate) fn json_body(payload: &RawPayload) -> Result<&Value, ParseError> {
    match &payload.body {
        RawBody::Json(v) => Ok(v),
        _ => Err(ParseError::MissingRequiredField(format!(
            "{}: expected a json payload",
            payload.source
        ))),
    }
}

/// Numbers arrive as JSON numbers or as strings depending on the provider.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Num {
    Float(f64),
    Text(String),
}

/// Sentinels some providers use for "no data".
const MISSING_SENTINELS: [f64; 2] = [-999.0, -9999.0];

pub(crate) fn as_num(v: &Value) -> Option<f64> {
    let n = match Num::deserialize(v).ok()? {
        Num::Float(f) => f,
        Num::Text(s) => s.trim().parse::<f64>().ok()?,
    };
    (n.is_finite() && !MISSING_SENTINELS.contains(&n)).then_some(n)
}

pub(crate) fn num_at(v: &Value, ptr: &str) -> Option<f64> {
    v.pointer(ptr).and_then(as_num)
}

pub(crate) fn str_at<'a>(v: &'a Value, ptr: &str) -> Option<&'a str> {
    v.pointer(ptr)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(crate) fn epoch_at(v: &Value, ptr: &str) -> Option<DateTime<Utc>> {
    num_at(v, ptr).and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
}

/// Array under `ptr`, or a `MissingRequiredField` naming it.
pub(crate) fn array_at<'a>(
    v: &'a Value,
    ptr: &str,
    source: Source,
) -> Result<&'a Vec<Value>, ParseError> {
    v.pointer(ptr)
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::MissingRequiredField(format!("{source}: {ptr}")))
}

/// Some providers collapse single-element lists to a bare object.
pub(crate) fn one_or_many(v: &Value) -> Vec<&Value> {
    match v {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

pub(crate) fn warn_skipped(source: Source, index: usize, reason: &str) {
    tracing::warn!(provider = %source, period = index, reason, "forecast period skipped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tolerant_numbers() {
        assert_eq!(as_num(&json!(12.5)), Some(12.5));
        assert_eq!(as_num(&json!(" 7 ")), Some(7.0));
        assert_eq!(as_num(&json!("-9999")), None);
        assert_eq!(as_num(&json!("n/a")), None);
        assert_eq!(as_num(&json!(null)), None);
        assert_eq!(as_num(&json!({"x": 1})), None);
    }

    #[test]
    fn single_objects_count_as_lists() {
        assert_eq!(one_or_many(&json!([1, 2])).len(), 2);
        assert_eq!(one_or_many(&json!({"a": 1})).len(), 1);
        assert!(one_or_many(&Value::Null).is_empty());
    }

    #[test]
    fn wrong_body_shape_is_a_parse_error() {
        let p = RawPayload::new(Source::Owm, Utc::now(), RawBody::Text("nope".into()));
        assert!(matches!(
            normalize(Source::Owm, &p),
            Err(ParseError::MissingRequiredField(_))
        ));
    }
}
