// src/units.rs
//! Unit conversions into the canonical record units (°F, mph, inch, foot,
//! mbar) plus the small code mappings several normalizers share.

/// Amount stored for a trace of precipitation.
pub const TRACE_INCHES: f64 = 0.001;

pub fn kelvin_to_f(k: f64) -> f64 {
    k * 9.0 / 5.0 - 459.67
}

pub fn celsius_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Metres in a statute mile.
const METRES_PER_MILE: f64 = 1609.344;

pub fn mps_to_mph(v: f64) -> f64 {
    v * 3600.0 / METRES_PER_MILE
}

pub fn kph_to_mph(v: f64) -> f64 {
    v * 1000.0 / METRES_PER_MILE
}

pub fn mm_to_in(v: f64) -> f64 {
    v / 25.4
}

pub fn cm_to_in(v: f64) -> f64 {
    v / 2.54
}

pub fn m_to_ft(v: f64) -> f64 {
    v * 3.280839895
}

pub fn inhg_to_mbar(v: f64) -> f64 {
    v * 33.8639
}

/// Cloud cover percentage to sky code.
pub fn pct_to_clouds(pct: f64) -> Option<&'static str> {
    if !(0.0..=100.0).contains(&pct) {
        return None;
    }
    Some(if pct <= 5.0 {
        "CL"
    } else if pct <= 25.0 {
        "FW"
    } else if pct <= 50.0 {
        "SC"
    } else if pct <= 69.0 {
        "B1"
    } else if pct <= 87.0 {
        "B2"
    } else {
        "OV"
    })
}

const COMPASS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Bearing in degrees to a 16-point compass name.
pub fn deg_to_dir(deg: f64) -> Option<&'static str> {
    if !deg.is_finite() || deg < 0.0 {
        return None;
    }
    let idx = ((deg % 360.0) / 22.5 + 0.5).floor() as usize % 16;
    Some(COMPASS[idx])
}

/// Compass name to 16-point index (0 = N).
pub fn dir_to_index(dir: &str) -> Option<u8> {
    let d = dir.trim().to_ascii_uppercase();
    COMPASS.iter().position(|c| *c == d).map(|i| i as u8)
}

pub fn compass_points() -> &'static [&'static str] {
    &COMPASS
}

/// Quantity with its range, as parsed from strings like `0.5-0.8`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrecipQty {
    pub qty: f64,
    pub min: f64,
    pub max: f64,
}

/// Parses precipitation amounts as providers print them.
///
/// `T` is a trace, `MM` or blank is missing, `a-b` yields the midpoint and its
/// bounds. A `-` following `e`/`E` is an exponent, not a range.
pub fn parse_precip_qty(s: &str) -> Option<PrecipQty> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("MM") {
        return None;
    }
    if s.eq_ignore_ascii_case("T") {
        return Some(PrecipQty {
            qty: TRACE_INCHES,
            min: TRACE_INCHES,
            max: TRACE_INCHES,
        });
    }
    let split = s
        .char_indices()
        .skip(1)
        .find(|(i, c)| *c == '-' && !matches!(s.as_bytes()[i - 1], b'e' | b'E'))
        .map(|(i, _)| i);
    match split {
        Some(i) => {
            let lo = parse_amount(&s[..i])?;
            let hi = parse_amount(&s[i + 1..])?;
            Some(PrecipQty {
                qty: (lo + hi) / 2.0,
                min: lo,
                max: hi,
            })
        }
        None => {
            let v = parse_amount(s)?;
            Some(PrecipQty {
                qty: v,
                min: v,
                max: v,
            })
        }
    }
}

fn parse_amount(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("T") {
        return Some(TRACE_INCHES);
    }
    s.parse::<f64>().ok()
}

/// Masks all but the last four characters of a credential.
pub fn mask_secret(secret: &str) -> String {
    let n = secret.chars().count();
    if n <= 4 {
        return "X".repeat(n);
    }
    let tail: String = secret.chars().skip(n - 4).collect();
    format!("{}{}", "X".repeat(n - 4), tail)
}

/// Replaces every occurrence of `secret` in `text` with its masked form.
pub fn mask_in(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(s) if !s.is_empty() => text.replace(s, &mask_secret(s)),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn temperature_conversions() {
        assert!(close(kelvin_to_f(273.15), 32.0));
        assert!(close(kelvin_to_f(300.0), 80.33));
        assert!(close(celsius_to_f(100.0), 212.0));
        assert!(close(celsius_to_f(-40.0), -40.0));
    }

    #[test]
    fn speed_and_length_conversions() {
        assert!(close(mps_to_mph(10.0), 22.369363));
        assert!(close(kph_to_mph(100.0), 62.137119));
        assert!(close(mm_to_in(25.4), 1.0));
        assert!(close(cm_to_in(2.54), 1.0));
        assert!((m_to_ft(1.0) - 3.2808).abs() < 1e-4);
        assert!((inhg_to_mbar(29.92) - 1013.21).abs() < 0.01);
    }

    #[test]
    fn cloud_codes_follow_thresholds() {
        assert_eq!(pct_to_clouds(0.0), Some("CL"));
        assert_eq!(pct_to_clouds(5.0), Some("CL"));
        assert_eq!(pct_to_clouds(20.0), Some("FW"));
        assert_eq!(pct_to_clouds(40.0), Some("SC"));
        assert_eq!(pct_to_clouds(60.0), Some("B1"));
        assert_eq!(pct_to_clouds(80.0), Some("B2"));
        assert_eq!(pct_to_clouds(100.0), Some("OV"));
        assert_eq!(pct_to_clouds(120.0), None);
    }

    #[test]
    fn compass_points_wrap() {
        assert_eq!(deg_to_dir(0.0), Some("N"));
        assert_eq!(deg_to_dir(359.0), Some("N"));
        assert_eq!(deg_to_dir(45.0), Some("NE"));
        assert_eq!(deg_to_dir(200.0), Some("SSW"));
        assert_eq!(deg_to_dir(-1.0), None);
        assert_eq!(dir_to_index("wsw"), Some(11));
    }

    #[test]
    fn precip_strings() {
        assert_eq!(parse_precip_qty("MM"), None);
        assert_eq!(parse_precip_qty(""), None);
        assert_eq!(parse_precip_qty("T").map(|q| q.qty), Some(TRACE_INCHES));
        let r = parse_precip_qty("0.50-0.80").unwrap();
        assert!(close(r.qty, 0.65));
        assert!(close(r.min, 0.5));
        assert!(close(r.max, 0.8));
        let e = parse_precip_qty("1e-3").unwrap();
        assert!(close(e.qty, 0.001));
        let t = parse_precip_qty("T-0.10").unwrap();
        assert!(close(t.min, TRACE_INCHES));
        assert!(close(t.max, 0.1));
    }

    #[test]
    fn secrets_keep_last_four() {
        assert_eq!(mask_secret("abcdef123456"), "XXXXXXXX3456");
        assert_eq!(mask_secret("abc"), "XXX");
        assert_eq!(
            mask_in("https://x/api/abcdef123456/q", Some("abcdef123456")),
            "https://x/api/XXXXXXXX3456/q"
        );
    }
}
