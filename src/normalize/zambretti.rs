// src/normalize/zambretti.rs
//! A Zambretti reading becomes one instantaneous record at the reading time.

use crate::error::ParseError;
use crate::types::{Field, ForecastRecord, RawBody, RawPayload, Source};
use crate::zambretti::{forecast_reading, text_for};

pub fn normalize(payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let RawBody::Zambretti(reading) = &payload.body else {
        return Err(ParseError::MissingRequiredField("zambretti: expected a reading".into()));
    };
    let code = forecast_reading(reading).ok_or_else(|| {
        ParseError::MissingRequiredField("zambretti: pressure or trend missing".into())
    })?;
    let mut r = ForecastRecord::new(Source::Zambretti, reading.event_time, reading.event_time, 0);
    r.set_text(Field::Zcode, Some(code.to_string()));
    r.set_text(Field::Desc, text_for(code));
    r.set_number(Field::Pressure, reading.pressure_mbar);
    Ok(vec![r])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ZambrettiReading;
    use chrono::{TimeZone, Utc};

    fn reading(pressure: Option<f64>) -> ZambrettiReading {
        ZambrettiReading {
            event_time: Utc.with_ymd_and_hms(2013, 6, 20, 9, 0, 0).unwrap(),
            pressure_mbar: pressure,
            trend_mbar_per_hour: Some(0.0),
            wind_index: Some(0),
            month: 5,
            north: true,
            lower_pressure: 950.0,
            upper_pressure: 1050.0,
        }
    }

    #[test]
    fn one_record_at_the_reading_time() {
        let r = reading(Some(1013.0));
        let p = RawPayload::new(Source::Zambretti, Utc::now(), RawBody::Zambretti(r.clone()));
        let recs = normalize(&p).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].event_time, r.event_time);
        assert_eq!(recs[0].issued_time, r.event_time);
        let code = recs[0].text(Field::Zcode).unwrap();
        assert_eq!(Some(code.chars().next().unwrap()), forecast_reading(&r));
        assert!(recs[0].text(Field::Desc).is_some());
    }

    #[test]
    fn calm_station_still_forecasts() {
        let r = ZambrettiReading {
            wind_index: None,
            ..reading(Some(1013.0))
        };
        let p = RawPayload::new(Source::Zambretti, Utc::now(), RawBody::Zambretti(r));
        let recs = normalize(&p).unwrap();
        assert_eq!(recs[0].text(Field::Zcode), Some("E"));
    }

    #[test]
    fn incomplete_reading_is_an_error() {
        let p = RawPayload::new(Source::Zambretti, Utc::now(), RawBody::Zambretti(reading(None)));
        assert!(matches!(normalize(&p), Err(ParseError::MissingRequiredField(_))));
    }
}
