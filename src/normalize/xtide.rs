// src/normalize/xtide.rs
//! Tide almanac lines: `location,YYYY.MM.DD,HH:MM,-0.71 ft,Low Tide`.
//!
//! The location itself may contain commas, so lines are split from the right.
//! Only high and low tide events become records; times are UTC.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::ParseError;
use crate::types::{Field, ForecastRecord, RawBody, RawPayload, Source};
use crate::units::m_to_ft;

struct TideLine<'a> {
    time: DateTime<Utc>,
    offset: &'a str,
    event: &'a str,
}

fn split_line(line: &str) -> Option<TideLine<'_>> {
    let mut parts = line.trim_end().rsplitn(5, ',');
    let event = parts.next()?.trim();
    let offset = parts.next()?.trim();
    let time = parts.next()?.trim();
    let date = parts.next()?.trim();
    parts.next()?;
    let naive = NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y.%m.%d %H:%M").ok()?;
    Some(TideLine {
        time: Utc.from_utc_datetime(&naive),
        offset,
        event,
    })
}

/// Event time of an almanac line, if it has one.
pub fn line_time(line: &str) -> Option<DateTime<Utc>> {
    split_line(line).map(|l| l.time)
}

/// Height in feet from `"-0.71 ft"` or `"1.2 m"`.
fn offset_feet(raw: &str) -> Result<f64, ParseError> {
    let (value, unit) = raw
        .split_once(' ')
        .ok_or_else(|| ParseError::UnitConversionFailure(format!("xtide: offset {raw}")))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| ParseError::UnitConversionFailure(format!("xtide: offset {raw}")))?;
    match unit.trim() {
        "ft" => Ok(value),
        "m" => Ok(m_to_ft(value)),
        other => Err(ParseError::UnitConversionFailure(format!(
            "xtide: unknown units '{other}'"
        ))),
    }
}

pub fn normalize(payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let RawBody::Lines(lines) = &payload.body else {
        return Err(ParseError::MissingRequiredField("xtide: expected almanac lines".into()));
    };
    let mut out = Vec::new();
    for line in lines.iter().filter(|l| !l.trim().is_empty()) {
        let Some(tide) = split_line(line) else {
            tracing::debug!(line = %line, "xtide: unparseable line");
            continue;
        };
        let hilo = match tide.event {
            "High Tide" => "H",
            "Low Tide" => "L",
            _ => continue,
        };
        let feet = match offset_feet(tide.offset) {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::warn!(error = %e, "xtide: tide height dropped");
                None
            }
        };
        let mut r = ForecastRecord::new(Source::XTide, payload.fetched_at, tide.time, 0);
        r.set_text(Field::Hilo, Some(hilo));
        r.set_number(Field::TideOffset, feet);
        r.set_text(Field::Desc, Some(tide.event));
        out.push(r);
    }
    Ok(out)
}
