// src/normalize/aeris.rs
//! Aeris forecasts. The reply holds one response whose `interval` (`1hr`,
//! `3hr`, `day`) sets the period length.

use serde_json::Value;

use super::{epoch_at, json_body, num_at, one_or_many, str_at, warn_skipped};
use crate::error::ParseError;
use crate::types::{Field, ForecastRecord, RawPayload, Source};

pub fn interval_hours(interval: &str) -> Option<u32> {
    let interval = interval.trim().to_ascii_lowercase();
    if interval == "day" || interval == "daynight" {
        return Some(24);
    }
    interval.strip_suffix("hr")?.parse().ok().filter(|h| *h > 0)
}

pub fn normalize(payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let v = json_body(payload)?;
    let responses = v
        .get("response")
        .map(one_or_many)
        .ok_or_else(|| ParseError::MissingRequiredField("aeris: response".into()))?;
    if responses.len() > 1 {
        tracing::warn!(provider = %Source::Aeris, count = responses.len(), "using the first of several responses");
    }
    let response: &Value = responses
        .first()
        .copied()
        .ok_or_else(|| ParseError::MissingRequiredField("aeris: response[0]".into()))?;
    let hours = str_at(response, "/interval")
        .and_then(interval_hours)
        .unwrap_or(1);
    let periods = response
        .get("periods")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::MissingRequiredField("aeris: response.periods".into()))?;

    let mut out = Vec::with_capacity(periods.len());
    for (i, p) in periods.iter().enumerate() {
        let Some(event) = epoch_at(p, "/timestamp") else {
            warn_skipped(Source::Aeris, i, "no timestamp");
            continue;
        };
        let mut r = ForecastRecord::new(Source::Aeris, payload.fetched_at, event, hours);
        r.set_number(Field::TempMax, num_at(p, "/maxTempF"));
        r.set_number(Field::TempMin, num_at(p, "/minTempF"));
        r.set_number(Field::Temp, num_at(p, "/tempF").or_else(|| num_at(p, "/avgTempF")));
        r.set_number(Field::Pop, num_at(p, "/pop"));
        r.set_number(Field::Qpf, num_at(p, "/precipIN"));
        r.set_number(Field::Qsf, num_at(p, "/snowIN"));
        r.set_number(Field::Humidity, num_at(p, "/humidity"));
        r.set_number(Field::UvIndex, num_at(p, "/uvi"));
        r.set_number(Field::Dewpoint, num_at(p, "/dewpointF"));
        r.set_text(Field::WindDir, str_at(p, "/windDir"));
        r.set_number(Field::WindGust, num_at(p, "/windGustMPH"));
        r.set_number(Field::WindSpeed, num_at(p, "/windSpeedMPH"));
        r.set_number(Field::Pressure, num_at(p, "/pressureMB"));
        r.set_text(Field::Clouds, str_at(p, "/cloudsCoded"));
        r.set_text(Field::Condition, str_at(p, "/weatherPrimaryCoded"));
        r.set_text(Field::Desc, str_at(p, "/weatherPrimary"));
        out.push(r);
    }
    Ok(out)
}
