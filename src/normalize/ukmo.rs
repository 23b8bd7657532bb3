// src/normalize/ukmo.rs
//! UK Met Office DataPoint 3-hourly site forecast.
//!
//! Each `Period` is one UTC day (`2014-05-13Z`); each `Rep` within it is
//! offset from midnight by `$` minutes.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{json_body, num_at, one_or_many, str_at, warn_skipped};
use crate::error::ParseError;
use crate::types::{Field, ForecastRecord, RawPayload, Source};
use crate::units::celsius_to_f;

fn issued_time(dv: &Value) -> Result<DateTime<Utc>, ParseError> {
    let raw = str_at(dv, "/dataDate")
        .ok_or_else(|| ParseError::MissingRequiredField("ukmo: SiteRep.DV.dataDate".into()))?;
    let parsed = OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|e| ParseError::MissingRequiredField(format!("ukmo: dataDate {raw}: {e}")))?;
    DateTime::from_timestamp(parsed.unix_timestamp(), 0)
        .ok_or_else(|| ParseError::MissingRequiredField(format!("ukmo: dataDate {raw}")))
}

fn period_day(value: &str) -> Option<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(value.trim_end_matches('Z'), "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?))
}

pub fn normalize(payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let v = json_body(payload)?;
    let dv = v
        .pointer("/SiteRep/DV")
        .ok_or_else(|| ParseError::MissingRequiredField("ukmo: SiteRep.DV".into()))?;
    let issued = issued_time(dv)?;
    let periods = dv
        .pointer("/Location/Period")
        .ok_or_else(|| ParseError::MissingRequiredField("ukmo: Location.Period".into()))?;

    if let (Some(got), Some(want)) = (str_at(dv, "/Location/i"), payload.location.as_deref()) {
        if got != want {
            tracing::info!(provider = %Source::Ukmo, got, want, "location mismatch");
        }
    }

    let mut out = Vec::new();
    let mut idx = 0;
    for period in one_or_many(periods) {
        let Some(day) = str_at(period, "/value").and_then(period_day) else {
            warn_skipped(Source::Ukmo, idx, "period without a date");
            continue;
        };
        for rep in period.get("Rep").map(one_or_many).unwrap_or_default() {
            idx += 1;
            let Some(offset) = num_at(rep, "/$") else {
                warn_skipped(Source::Ukmo, idx, "rep without an offset");
                continue;
            };
            let event = day + Duration::minutes(offset as i64);
            let mut r = ForecastRecord::new(Source::Ukmo, issued, event, 3);
            r.set_number(Field::Temp, num_at(rep, "/T").map(celsius_to_f));
            r.set_number(Field::Humidity, num_at(rep, "/H"));
            r.set_number(Field::WindSpeed, num_at(rep, "/S"));
            r.set_number(Field::WindGust, num_at(rep, "/G"));
            r.set_text(Field::WindDir, str_at(rep, "/D"));
            r.set_number(Field::Pop, num_at(rep, "/Pp"));
            r.set_number(Field::UvIndex, num_at(rep, "/U"));
            r.set_text(Field::Condition, str_at(rep, "/W"));
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

    fn payload(v: Value) -> RawPayload {
        RawPayload::new(Source::Ukmo, Utc::now(), RawBody::Json(v))
            .with_location(Some("310069".into()))
    }

    #[test]
    fn reps_offset_from_period_day() {
        let v = json!({"SiteRep": {"DV": {"dataDate": "2014-05-13T14:00:00Z", "type": "Forecast",
            "Location": {"i": "310069", "Period": [
                {"type": "Day", "value": "2014-05-13Z", "Rep": [
                    {"D": "SW", "G": "16", "H": "72", "Pp": "8", "S": "9", "T": "15", "U": "1", "W": "7", "$": "900"},
                    {"D": "WSW", "T": "12", "$": "1080"}
                ]},
                {"type": "Day", "value": "2014-05-14Z", "Rep": {"T": "10", "$": "0"}}
            ]}}}});
        let recs = normalize(&payload(v)).unwrap();
        assert_eq!(recs.len(), 3);
        let issued = Utc.with_ymd_and_hms(2014, 5, 13, 14, 0, 0).unwrap();
        assert!(recs.iter().all(|r| r.issued_time == issued));
        assert_eq!(recs[0].event_time, Utc.with_ymd_and_hms(2014, 5, 13, 15, 0, 0).unwrap());
        assert_eq!(recs[0].number(Field::Temp), Some(59.0));
        assert_eq!(recs[0].number(Field::WindGust), Some(16.0));
        assert_eq!(recs[0].text(Field::Condition), Some("7"));
        assert_eq!(recs[2].event_time, Utc.with_ymd_and_hms(2014, 5, 14, 0, 0, 0).unwrap());
        assert_eq!(recs[2].number(Field::Temp), Some(50.0));
    }

    #[test]
    fn data_date_is_required() {
        let v = json!({"SiteRep": {"DV": {"Location": {"Period": []}}}});
        assert!(matches!(normalize(&payload(v)), Err(ParseError::MissingRequiredField(_))));
    }
}
