// src/normalize/wu.rs
//! Weather Underground: `hourly_forecast` (1h periods) or
//! `forecast.simpleforecast.forecastday` (24h periods).
//!
//! Precipitation types and obstructions come from free-text phrases such as
//! "Chance of Rain Showers"; the chance prefix becomes the code stored in the
//! matching precipitation field.

use serde_json::Value;

use super::{array_at, epoch_at, json_body, num_at, str_at, warn_skipped};
use crate::error::ParseError;
use crate::types::{Field, ForecastRecord, RawPayload, Source};
use crate::units::pct_to_clouds;

const PRECIP_PHRASES: &[(&str, Field)] = &[
    ("Rain", Field::Rain),
    ("Rain Showers", Field::Rainshwrs),
    ("Thunderstorms", Field::Tstms),
    ("Thunderstorm", Field::Tstms),
    ("Drizzle", Field::Drizzle),
    ("Snow", Field::Snow),
    ("Snow Showers", Field::Snowshwrs),
    ("Flurries", Field::Flurries),
    ("Sleet", Field::Sleet),
    ("Freezing Rain", Field::Frzngrain),
    ("Freezing Drizzle", Field::Frzngdrzl),
    ("Snow Grains", Field::Snow),
    ("Ice Crystals", Field::Sleet),
    ("Hail", Field::Hail),
    ("Rain Mist", Field::Rain),
    ("Ice Pellets", Field::Sleet),
    ("Ice Pellet Showers", Field::Sleet),
    ("Hail Showers", Field::Hail),
    ("Small Hail", Field::Hail),
    ("Small Hail Showers", Field::Hail),
];

const CHANCE_PREFIXES: &[(&str, &str)] = &[
    ("Slight Chance", "S"),
    ("Chance", "C"),
    ("Likely", "L"),
    ("Occasional", "O"),
    ("Definite", "D"),
    ("Isolated", "IS"),
    ("Scattered", "SC"),
    ("Numerous", "NM"),
    ("Extensive", "EC"),
];

const OBVIS_PHRASES: &[(&str, &str)] = &[
    ("Fog", "F"),
    ("Patchy Fog", "PF"),
    ("Dense Fog", "F+"),
    ("Patchy Dense Fog", "PF+"),
    ("Haze", "H"),
    ("Blowing Snow", "BS"),
    ("Smoke", "K"),
    ("Blowing Dust", "BD"),
    ("Volcanic Ash", "AF"),
    ("Mist", "M"),
    ("Fog Patches", "PF"),
    ("Freezing Fog", "FF"),
    ("Widespread Dust", "DST"),
    ("Sand", "SND"),
    ("Spray", "SP"),
    ("Dust Whirls", "DW"),
    ("Sandstorm", "SS"),
    ("Low Drifting Snow", "LDS"),
    ("Low Drifting Widespread Dust", "LDD"),
    ("Low Drifting Sand", "LDs"),
    ("Blowing Widespread Dust", "BD"),
    ("Blowing Sand", "Bs"),
    ("Snow Blowing Snow Mist", "BS"),
    ("Patches of Fog", "PF"),
    ("Shallow Fog", "SF"),
    ("Partial Fog", "PF"),
    ("Blizzard", "BS"),
    ("Rain Mist", "M"),
];

/// Forecast icon codes that imply a precipitation type and chance.
fn fct_precip(code: u32) -> Option<(Field, &'static str)> {
    Some(match code {
        10 => (Field::Rainshwrs, "C"),
        11 => (Field::Rainshwrs, "L"),
        12 => (Field::Rain, "C"),
        13 => (Field::Rain, "L"),
        14 => (Field::Tstms, "C"),
        15 => (Field::Tstms, "L"),
        16 => (Field::Flurries, "L"),
        18 => (Field::Snowshwrs, "C"),
        19 => (Field::Snowshwrs, "L"),
        20 => (Field::Snow, "C"),
        21 => (Field::Snow, "L"),
        22 => (Field::Sleet, "C"),
        23 => (Field::Sleet, "L"),
        24 => (Field::Snowshwrs, "L"),
        _ => return None,
    })
}

fn fct_obvis(code: u32) -> Option<&'static str> {
    match code {
        5 => Some("H"),
        6 => Some("F"),
        9 | 24 => Some("BS"),
        _ => None,
    }
}

/// Splits "Chance of Rain Showers" into the precipitation field and chance
/// code. The longest matching phrase wins, so "Rain Showers" beats "Rain".
pub fn phrase_to_precip(phrase: &str) -> Option<(Field, &'static str)> {
    let phrase = phrase.trim();
    let (name, field) = PRECIP_PHRASES
        .iter()
        .filter(|(name, _)| ends_with_word(phrase, name))
        .max_by_key(|(name, _)| name.len())?;
    let rest = phrase[..phrase.len() - name.len()].trim();
    let rest = rest.strip_suffix(" of").unwrap_or(rest).trim();
    let chance = if rest.is_empty() {
        "D"
    } else {
        CHANCE_PREFIXES
            .iter()
            .find(|(p, _)| rest.eq_ignore_ascii_case(p))
            .map(|(_, c)| *c)?
    };
    Some((*field, chance))
}

pub fn phrase_to_obvis(phrase: &str) -> Option<&'static str> {
    let phrase = phrase.trim();
    OBVIS_PHRASES
        .iter()
        .filter(|(name, _)| ends_with_word(phrase, name))
        .max_by_key(|(name, _)| name.len())
        .map(|(_, code)| *code)
}

fn ends_with_word(phrase: &str, word: &str) -> bool {
    let Some(split) = phrase.len().checked_sub(word.len()) else {
        return false;
    };
    match (phrase.get(..split), phrase.get(split..)) {
        (Some(head), Some(tail)) => {
            tail.eq_ignore_ascii_case(word)
                && head.chars().last().map_or(true, char::is_whitespace)
        }
        _ => false,
    }
}

fn long_dir(dir: &str) -> &str {
    match dir {
        "North" => "N",
        "South" => "S",
        "East" => "E",
        "West" => "W",
        other => other,
    }
}

fn sky_icon(icon: &str) -> Option<&'static str> {
    Some(match icon {
        "sunny" | "clear" => "CL",
        "mostlysunny" => "FW",
        "partlysunny" => "SC",
        "partlycloudy" => "B1",
        "mostlycloudy" => "B2",
        "cloudy" => "OV",
        _ => return None,
    })
}

pub fn normalize(payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let v = json_body(payload)?;
    if v.get("hourly_forecast").is_some() {
        hourly(v, payload)
    } else if v.pointer("/forecast/simpleforecast").is_some() {
        daily(v, payload)
    } else {
        Err(ParseError::MissingRequiredField(
            "wu: hourly_forecast or forecast.simpleforecast".into(),
        ))
    }
}

fn hourly(v: &Value, payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let periods = array_at(v, "/hourly_forecast", Source::Wu)?;
    let mut out = Vec::with_capacity(periods.len());
    for (i, p) in periods.iter().enumerate() {
        let Some(event) = epoch_at(p, "/FCTTIME/epoch") else {
            warn_skipped(Source::Wu, i, "no FCTTIME.epoch");
            continue;
        };
        let mut r = ForecastRecord::new(Source::Wu, payload.fetched_at, event, 1);
        r.set_text(Field::Clouds, num_at(p, "/sky").and_then(pct_to_clouds));
        r.set_number(Field::Temp, num_at(p, "/temp/english"));
        r.set_number(Field::Dewpoint, num_at(p, "/dewpoint/english"));
        r.set_number(Field::Humidity, num_at(p, "/humidity"));
        r.set_number(Field::WindSpeed, num_at(p, "/wspd/english"));
        r.set_text(Field::WindDir, str_at(p, "/wdir/dir").map(long_dir));
        r.set_number(Field::Pop, num_at(p, "/pop"));
        r.set_number(Field::Qpf, num_at(p, "/qpf/english"));
        r.set_number(Field::Qsf, num_at(p, "/snow/english"));
        r.set_number(Field::UvIndex, num_at(p, "/uvi"));
        r.set_number(Field::HeatIndex, num_at(p, "/heatindex/english"));
        r.set_number(Field::WindChill, num_at(p, "/windchill/english"));
        r.set_number(Field::Pressure, num_at(p, "/mslp/metric"));
        let fctcode = num_at(p, "/fctcode").map(|c| c as u32);
        r.set_text(Field::Condition, fctcode.map(|c| c.to_string()));
        let condition = str_at(p, "/condition");
        r.set_text(Field::Desc, condition);
        let wx = str_at(p, "/wx");
        apply_phrases(&mut r, condition, fctcode, wx);
        out.push(r);
    }
    Ok(out)
}

/// Precipitation from the condition phrase, then the icon code, then the
/// comma separated `wx` list. Obstruction from `wx`, the code, the condition.
fn apply_phrases(r: &mut ForecastRecord, condition: Option<&str>, fctcode: Option<u32>, wx: Option<&str>) {
    let mut precip: Vec<(Field, &str)> = condition
        .map(|c| {
            c.split(" and ")
                .flat_map(|part| part.split(" with "))
                .filter_map(phrase_to_precip)
                .collect()
        })
        .unwrap_or_default();
    if precip.is_empty() {
        precip.extend(fctcode.and_then(fct_precip));
    }
    if precip.is_empty() {
        if let Some(wx) = wx {
            precip.extend(wx.split(',').filter_map(phrase_to_precip));
        }
    }
    for (field, chance) in precip {
        r.set_text(field, Some(chance));
    }

    let obvis = wx
        .and_then(|w| w.split(',').find_map(phrase_to_obvis))
        .or_else(|| fctcode.and_then(fct_obvis))
        .or_else(|| condition.and_then(phrase_to_obvis));
    r.set_text(Field::Obvis, obvis);
}

fn daily(v: &Value, payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let days = array_at(v, "/forecast/simpleforecast/forecastday", Source::Wu)?;
    let mut out = Vec::with_capacity(days.len());
    for (i, d) in days.iter().enumerate() {
        let Some(event) = epoch_at(d, "/date/epoch") else {
            warn_skipped(Source::Wu, i, "no date.epoch");
            continue;
        };
        let mut r = ForecastRecord::new(Source::Wu, payload.fetched_at, event, 24);
        let low = num_at(d, "/low/fahrenheit");
        let high = num_at(d, "/high/fahrenheit");
        r.set_number(Field::TempMin, low);
        r.set_number(Field::TempMax, high);
        r.set_number(Field::Temp, low.zip(high).map(|(l, h)| (l + h) / 2.0));
        r.set_number(Field::Humidity, num_at(d, "/avehumidity"));
        r.set_number(Field::Pop, num_at(d, "/pop"));
        r.set_number(Field::Qpf, num_at(d, "/qpf_allday/in"));
        r.set_number(Field::Qsf, num_at(d, "/snow_allday/in"));
        r.set_number(Field::WindSpeed, num_at(d, "/avewind/mph"));
        r.set_text(Field::WindDir, str_at(d, "/avewind/dir").map(long_dir));
        r.set_number(Field::WindGust, num_at(d, "/maxwind/mph"));
        r.set_text(Field::Clouds, str_at(d, "/skyicon").and_then(sky_icon));
        let conditions = str_at(d, "/conditions");
        r.set_text(Field::Desc, conditions);
        r.set_text(Field::Condition, str_at(d, "/icon"));
        apply_phrases(&mut r, conditions, None, None);
        out.push(r);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RawBody, RawPayload};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn payload(v: Value) -> RawPayload {
        RawPayload::new(
            Source::Wu,
            Utc.with_ymd_and_hms(2014, 5, 1, 12, 0, 0).unwrap(),
            RawBody::Json(v),
        )
    }

    #[test]
    fn phrases_prefer_the_longest_match() {
        assert_eq!(phrase_to_precip("Chance of Rain Showers"), Some((Field::Rainshwrs, "C")));
        assert_eq!(phrase_to_precip("Rain"), Some((Field::Rain, "D")));
        assert_eq!(phrase_to_precip("Slight Chance of Thunderstorms"), Some((Field::Tstms, "S")));
        assert_eq!(phrase_to_precip("Heavy Rain"), None);
        assert_eq!(phrase_to_precip("Overcast"), None);
        assert_eq!(phrase_to_obvis("Patchy Dense Fog"), Some("PF+"));
        assert_eq!(phrase_to_obvis("Fog"), Some("F"));
    }

    #[test]
    fn hourly_periods() {
        let v = json!({"hourly_forecast": [
            {"FCTTIME": {"epoch": "1398945600"}, "sky": "100", "temp": {"english": "58"},
             "dewpoint": {"english": "50"}, "humidity": "75", "wspd": {"english": "12"},
             "wdir": {"dir": "North"}, "pop": "60", "qpf": {"english": "0.04"},
             "snow": {"english": "0.0"}, "uvi": "1", "fctcode": "13",
             "condition": "Chance of Rain and Thunderstorm", "wx": "Rain, Patchy Fog"},
            {"FCTTIME": {}, "temp": {"english": "60"}},
            {"FCTTIME": {"epoch": "1398949200"}, "sky": "10", "temp": {"english": "-9999"},
             "fctcode": "6", "condition": "Fog"}
        ]});
        let recs = normalize(&payload(v)).unwrap();
        assert_eq!(recs.len(), 2);
        let r = &recs[0];
        assert_eq!(r.duration_hours, 1);
        assert_eq!(r.event_time.timestamp(), 1398945600);
        assert_eq!(r.text(Field::Clouds), Some("OV"));
        assert_eq!(r.number(Field::Temp), Some(58.0));
        assert_eq!(r.text(Field::WindDir), Some("N"));
        assert_eq!(r.text(Field::Rain), Some("C"));
        assert_eq!(r.text(Field::Tstms), Some("D"));
        assert_eq!(r.text(Field::Obvis), Some("PF"));
        assert_eq!(r.text(Field::Condition), Some("13"));

        let r = &recs[1];
        assert_eq!(r.number(Field::Temp), None);
        assert_eq!(r.text(Field::Clouds), Some("FW"));
        assert_eq!(r.text(Field::Obvis), Some("F"));
        assert!(Field::PRECIP.iter().all(|f| r.text(*f).is_none()));
    }

    #[test]
    fn daily_periods() {
        let v = json!({"forecast": {"simpleforecast": {"forecastday": [
            {"date": {"epoch": "1398985200"}, "high": {"fahrenheit": "70"},
             "low": {"fahrenheit": "50"}, "conditions": "Chance of Snow Showers",
             "skyicon": "mostlycloudy", "pop": 40, "qpf_allday": {"in": 0.1},
             "snow_allday": {"in": 1.5}, "avewind": {"mph": 8, "dir": "West"},
             "maxwind": {"mph": 20}, "avehumidity": 65}
        ]}}});
        let recs = normalize(&payload(v)).unwrap();
        let r = &recs[0];
        assert_eq!(r.duration_hours, 24);
        assert_eq!(r.number(Field::Temp), Some(60.0));
        assert_eq!(r.number(Field::WindGust), Some(20.0));
        assert_eq!(r.text(Field::WindDir), Some("W"));
        assert_eq!(r.text(Field::Clouds), Some("B2"));
        assert_eq!(r.text(Field::Snowshwrs), Some("C"));
        assert_eq!(r.number(Field::Qsf), Some(1.5));
    }

    #[test]
    fn unknown_shape_is_rejected() {
        assert!(matches!(
            normalize(&payload(json!({"response": {}}))),
            Err(ParseError::MissingRequiredField(_))
        ));
    }
}
