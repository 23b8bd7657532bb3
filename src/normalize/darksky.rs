// src/normalize/darksky.rs
//! Dark Sky `hourly` or `daily` data blocks. The unit system comes from
//! `flags.units`; everything is converted to US units.

use serde_json::Value;

use super::{epoch_at, json_body, num_at, str_at, warn_skipped};
use crate::error::ParseError;
use crate::types::{Field, ForecastRecord, RawPayload, Source};
use crate::units::{celsius_to_f, cm_to_in, deg_to_dir, kph_to_mph, mps_to_mph, pct_to_clouds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Units {
    Us,
    Si,
    Ca,
    Uk2,
}

impl Units {
    fn from_flags(v: &Value) -> Result<Self, ParseError> {
        match str_at(v, "/flags/units") {
            None | Some("us") => Ok(Units::Us),
            Some("si") => Ok(Units::Si),
            Some("ca") => Ok(Units::Ca),
            Some("uk2") => Ok(Units::Uk2),
            Some(other) => Err(ParseError::UnitConversionFailure(format!(
                "ds: unknown unit system {other}"
            ))),
        }
    }

    fn temp(self, t: f64) -> f64 {
        match self {
            Units::Us => t,
            _ => celsius_to_f(t),
        }
    }

    fn speed(self, s: f64) -> f64 {
        match self {
            Units::Us | Units::Uk2 => s,
            Units::Si => mps_to_mph(s),
            Units::Ca => kph_to_mph(s),
        }
    }

    /// Snow accumulation: inches in US units, centimetres otherwise.
    fn snow(self, a: f64) -> f64 {
        match self {
            Units::Us => a,
            _ => cm_to_in(a),
        }
    }
}

pub fn normalize(payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let v = json_body(payload)?;
    let units = Units::from_flags(v)?;
    let (block, hours) = if let Some(b) = v.pointer("/hourly/data") {
        (b, 1)
    } else if let Some(b) = v.pointer("/daily/data") {
        (b, 24)
    } else {
        return Err(ParseError::MissingRequiredField("ds: hourly.data or daily.data".into()));
    };
    let periods = block
        .as_array()
        .ok_or_else(|| ParseError::MissingRequiredField("ds: data is not a list".into()))?;

    let mut out = Vec::with_capacity(periods.len());
    for (i, p) in periods.iter().enumerate() {
        let Some(event) = epoch_at(p, "/time") else {
            warn_skipped(Source::DarkSky, i, "no time");
            continue;
        };
        let mut r = ForecastRecord::new(Source::DarkSky, payload.fetched_at, event, hours);
        r.set_text(
            Field::Clouds,
            num_at(p, "/cloudCover").and_then(|c| pct_to_clouds(c * 100.0)),
        );
        let temp = num_at(p, "/temperature").map(|t| units.temp(t));
        if hours == 24 {
            let low = num_at(p, "/temperatureLow").map(|t| units.temp(t));
            let high = num_at(p, "/temperatureHigh").map(|t| units.temp(t));
            r.set_number(Field::TempMin, low);
            r.set_number(Field::TempMax, high);
            r.set_number(
                Field::Temp,
                temp.or_else(|| low.zip(high).map(|(l, h)| (l + h) / 2.0)),
            );
        } else {
            r.set_number(Field::Temp, temp);
        }
        r.set_number(Field::Dewpoint, num_at(p, "/dewPoint").map(|t| units.temp(t)));
        r.set_number(Field::Humidity, num_at(p, "/humidity").map(|h| (h * 100.0).round()));
        r.set_number(Field::Pop, num_at(p, "/precipProbability").map(|x| (x * 100.0).round()));
        r.set_number(Field::Qsf, num_at(p, "/precipAccumulation").map(|a| units.snow(a)));
        r.set_number(Field::WindSpeed, num_at(p, "/windSpeed").map(|s| units.speed(s)));
        r.set_number(Field::WindGust, num_at(p, "/windGust").map(|s| units.speed(s)));
        r.set_text(Field::WindDir, num_at(p, "/windBearing").and_then(deg_to_dir));
        r.set_number(Field::UvIndex, num_at(p, "/uvIndex"));
        r.set_number(Field::Pressure, num_at(p, "/pressure"));
        r.set_text(Field::Desc, str_at(p, "/summary"));
        r.set_text(Field::Condition, str_at(p, "/icon"));
        out.push(r);
    }
    Ok(out)
}
