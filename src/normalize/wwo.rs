// src/normalize/wwo.rs
//! World Weather Online: `data.weather[]` days, each with `hourly[]` entries
//! whose `time` is a local clock value (`"300"` is 03:00).

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use serde_json::Value;

use super::{array_at, json_body, num_at, str_at, warn_skipped};
use crate::error::ParseError;
use crate::providers::wwo::DEFAULT_PERIOD_HOURS;
use crate::types::{Field, ForecastRecord, RawPayload, Source};
use crate::units::{mm_to_in, pct_to_clouds};

/// Offset from `data.time_zone[0].utcOffset` (hours, may be fractional).
fn local_offset(v: &Value) -> FixedOffset {
    num_at(v, "/data/time_zone/0/utcOffset")
        .and_then(|h| FixedOffset::east_opt((h * 3600.0).round() as i32))
        .unwrap_or_else(|| Utc.fix())
}

/// Minutes after local midnight for a `time` value such as `"1330"`.
fn clock_minutes(p: &Value) -> Option<i64> {
    let t = num_at(p, "/time")? as i64;
    (0..2400).contains(&t).then(|| (t / 100) * 60 + t % 100)
}

/// Period length from the spacing of the first two entries of a day.
fn spacing_hours(hourly: &[Value]) -> u32 {
    let mins: Vec<i64> = hourly.iter().filter_map(clock_minutes).take(2).collect();
    match mins.as_slice() {
        [a, b] if b > a && (b - a) % 60 == 0 => ((b - a) / 60) as u32,
        [_] => 24,
        _ => DEFAULT_PERIOD_HOURS,
    }
}

fn event_time(day: NaiveDate, minutes: i64, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let local = day.and_hms_opt(0, 0, 0)? + Duration::minutes(minutes);
    offset
        .from_local_datetime(&local)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

pub fn normalize(payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let v = json_body(payload)?;
    let days = array_at(v, "/data/weather", Source::Wwo)?;
    let offset = local_offset(v);

    let mut out = Vec::new();
    let mut idx = 0;
    for d in days {
        let Some(day) = str_at(d, "/date").and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        else {
            warn_skipped(Source::Wwo, idx, "day without a date");
            continue;
        };
        let hourly = d
            .get("hourly")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let hours = spacing_hours(hourly);
        for p in hourly {
            idx += 1;
            let Some(event) = clock_minutes(p).and_then(|m| event_time(day, m, offset)) else {
                warn_skipped(Source::Wwo, idx, "no usable time");
                continue;
            };
            let mut r = ForecastRecord::new(Source::Wwo, payload.fetched_at, event, hours);
            r.set_text(Field::Clouds, num_at(p, "/cloudcover").and_then(pct_to_clouds));
            r.set_number(Field::Dewpoint, num_at(p, "/DewPointF"));
            r.set_number(Field::HeatIndex, num_at(p, "/HeatIndexF"));
            r.set_number(Field::Humidity, num_at(p, "/humidity"));
            r.set_number(Field::Qpf, num_at(p, "/precipMM").map(mm_to_in));
            r.set_number(Field::Pressure, num_at(p, "/pressure"));
            r.set_number(Field::Temp, num_at(p, "/tempF"));
            r.set_number(Field::WindChill, num_at(p, "/WindChillF"));
            r.set_text(Field::WindDir, str_at(p, "/winddir16Point"));
            r.set_number(Field::WindGust, num_at(p, "/WindGustMiles"));
            r.set_number(Field::WindSpeed, num_at(p, "/windspeedMiles"));
            r.set_number(Field::Pop, num_at(p, "/chanceofrain"));
            r.set_text(Field::Condition, num_at(p, "/weatherCode").map(|c| (c as i64).to_string()));
            r.set_text(Field::Desc, str_at(p, "/weatherDesc/0/value"));
            out.push(r);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawBody;
    use serde_json::json;

    #[test]
    fn local_times_shift_by_the_zone_offset() {
        let v = json!({"data": {
            "time_zone": [{"localtime": "2014-05-13 10:00", "utcOffset": "-4.0"}],
            "weather": [{"date": "2014-05-13", "hourly": [
                {"time": "0", "tempF": "50", "precipMM": "2.54", "cloudcover": "90",
                 "winddir16Point": "NNE", "weatherCode": "302"},
                {"time": "300", "tempF": "48"},
                {"time": "2500", "tempF": "40"}
            ]}]
        }});
        let p = RawPayload::new(Source::Wwo, Utc::now(), RawBody::Json(v));
        let recs = normalize(&p).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].event_time, Utc.with_ymd_and_hms(2014, 5, 13, 4, 0, 0).unwrap());
        assert_eq!(recs[1].event_time, Utc.with_ymd_and_hms(2014, 5, 13, 7, 0, 0).unwrap());
        assert_eq!(recs[0].duration_hours, 3);
        assert!((recs[0].number(Field::Qpf).unwrap() - 0.1).abs() < 1e-9);
        assert_eq!(recs[0].text(Field::Clouds), Some("OV"));
        assert_eq!(recs[0].text(Field::Condition), Some("302"));
    }

    #[test]
    fn hourly_spacing_sets_duration() {
        let v = json!({"data": {"weather": [{"date": "2014-05-13", "hourly": [
            {"time": "0"}, {"time": "100"}
        ]}]}});
        let p = RawPayload::new(Source::Wwo, Utc::now(), RawBody::Json(v));
        let recs = normalize(&p).unwrap();
        assert!(recs.iter().all(|r| r.duration_hours == 1));
        assert_eq!(recs[0].event_time, Utc.with_ymd_and_hms(2014, 5, 13, 0, 0, 0).unwrap());
    }
}
