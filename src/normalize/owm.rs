// src/normalize/owm.rs
//! OpenWeatherMap 5 day / 3 hour forecast. Temperatures arrive in kelvin,
//! wind in m/s and precipitation in mm.

use super::{array_at, epoch_at, json_body, num_at, str_at, warn_skipped};
use crate::error::ParseError;
use crate::types::{Field, ForecastRecord, RawPayload, Source};
use crate::units::{deg_to_dir, kelvin_to_f, mm_to_in, mps_to_mph, pct_to_clouds};

pub fn normalize(payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let v = json_body(payload)?;
    let periods = array_at(v, "/list", Source::Owm)?;
    let mut out = Vec::with_capacity(periods.len());
    for (i, p) in periods.iter().enumerate() {
        let Some(event) = epoch_at(p, "/dt") else {
            warn_skipped(Source::Owm, i, "no dt");
            continue;
        };
        let mut r = ForecastRecord::new(Source::Owm, payload.fetched_at, event, 3);
        r.set_text(Field::Clouds, num_at(p, "/clouds/all").and_then(pct_to_clouds));
        r.set_number(Field::Temp, num_at(p, "/main/temp").map(kelvin_to_f));
        r.set_number(Field::TempMin, num_at(p, "/main/temp_min").map(kelvin_to_f));
        r.set_number(Field::TempMax, num_at(p, "/main/temp_max").map(kelvin_to_f));
        r.set_number(Field::Humidity, num_at(p, "/main/humidity"));
        r.set_number(Field::Pressure, num_at(p, "/main/pressure"));
        r.set_number(Field::WindSpeed, num_at(p, "/wind/speed").map(mps_to_mph));
        r.set_text(Field::WindDir, num_at(p, "/wind/deg").and_then(deg_to_dir));
        r.set_number(Field::Qpf, num_at(p, "/rain/3h").map(mm_to_in));
        r.set_number(Field::Qsf, num_at(p, "/snow/3h").map(mm_to_in));
        r.set_text(
            Field::Desc,
            str_at(p, "/weather/0/description").or_else(|| str_at(p, "/main/description")),
        );
        r.set_text(
            Field::Condition,
            num_at(p, "/weather/0/id").map(|id| (id as i64).to_string()),
        );
        out.push(r);
    }
    if let Some(total) = num_at(v, "/cnt") {
        if total as usize != periods.len() {
            tracing::warn!(
                provider = %Source::Owm,
                total,
                parsed = periods.len(),
                "record count mismatch"
            );
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawBody;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn converts_to_canonical_units() {
        let v = json!({"cnt": 2, "list": [
            {"dt": 1400000400, "main": {"temp": 283.15, "humidity": 80, "pressure": 1012.5},
             "wind": {"speed": 10.0, "deg": 225}, "clouds": {"all": 40},
             "rain": {"3h": 25.4}, "weather": [{"id": 500, "description": "light rain"}]},
            {"dt": 1400011200, "main": {"temp": "273.15"}}
        ]});
        let p = RawPayload::new(
            Source::Owm,
            Utc.with_ymd_and_hms(2014, 5, 13, 16, 0, 0).unwrap(),
            RawBody::Json(v),
        );
        let recs = normalize(&p).unwrap();
        assert_eq!(recs.len(), 2);
        let r = &recs[0];
        assert_eq!(r.duration_hours, 3);
        assert_eq!(r.issued_time, p.fetched_at);
        assert!((r.number(Field::Temp).unwrap() - 50.0).abs() < 1e-6);
        assert!((r.number(Field::WindSpeed).unwrap() - 22.369363).abs() < 1e-6);
        assert_eq!(r.text(Field::WindDir), Some("SW"));
        assert_eq!(r.text(Field::Clouds), Some("SC"));
        assert_eq!(r.number(Field::Qpf), Some(1.0));
        assert_eq!(r.text(Field::Desc), Some("light rain"));
        assert_eq!(r.text(Field::Condition), Some("500"));
        assert!((recs[1].number(Field::Temp).unwrap() - 32.0).abs() < 1e-6);
        assert_eq!(recs[1].number(Field::Humidity), None);
    }

    #[test]
    fn missing_list_is_an_error() {
        let p = RawPayload::new(Source::Owm, Utc::now(), RawBody::Json(json!({"cod": "200"})));
        assert!(matches!(normalize(&p), Err(ParseError::MissingRequiredField(_))));
    }
}
