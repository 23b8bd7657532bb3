// src/zambretti.rs
//! Negretti & Zambra barometric forecaster.
//!
//! Pressure is normalised into the 950..1050 mbar band of the original
//! instrument, adjusted for wind direction and season, then looked up in one
//! of three tables depending on the pressure trend.

use crate::types::ZambrettiReading;

/// Adjustment in mbar per 16-point wind direction (0 = N).
const WIND_ADJUST: [f64; 16] = [
    5.2, 4.2, 3.2, 1.05, -1.1, -3.15, -5.2, -8.35, -11.5, -9.4, -7.3, -5.25, -3.2, -1.15, 0.9,
    3.05,
];

const RISING: &[u8] = b"ABBCFGIJLMMQTY";
const FALLING: &[u8] = b"BDHORUVXXZ";
const STEADY: &[u8] = b"ABBBEKNNPPSWWXXXZ";

/// Trend magnitude (mbar/h) separating steady from rising or falling.
const TREND_THRESHOLD: f64 = 0.1;

pub const DEFAULT_LOWER_PRESSURE: f64 = 950.0;
pub const DEFAULT_UPPER_PRESSURE: f64 = 1050.0;

/// Computes the forecast letter (A..Z).
///
/// `month` is 0-based, `wind` is a 16-point index. Without a wind direction
/// the wind adjustment is skipped. Returns `None` when pressure or trend is
/// missing or an input is out of range.
pub fn forecast_code(
    pressure: Option<f64>,
    month: u32,
    wind: Option<u8>,
    trend: Option<f64>,
    north: bool,
    bounds: (f64, f64),
) -> Option<char> {
    let mut p = pressure?;
    let trend = trend?;
    if month > 11 || wind.is_some_and(|w| w > 15) {
        return None;
    }
    let (bottom, top) = bounds;
    if top <= bottom {
        return None;
    }

    p = 950.0 + 100.0 * (p - bottom) / (top - bottom);

    if let Some(w) = wind {
        let w = if north { w as usize } else { (w as usize + 8) % 16 };
        p += WIND_ADJUST[w];
    }

    // northern summer and southern winter share an adjustment
    let summer = north == (4..=9).contains(&month);

    let (f, table) = if trend >= TREND_THRESHOLD {
        if summer {
            p += 3.2;
        }
        (0.1740 * (1031.40 - p), RISING)
    } else if trend <= -TREND_THRESHOLD {
        if summer {
            p -= 3.2;
        }
        (0.1553 * (1029.95 - p), FALLING)
    } else {
        (0.2314 * (1030.81 - p), STEADY)
    };

    let idx = ((f + 0.5).floor() as i64).clamp(0, table.len() as i64 - 1) as usize;
    Some(table[idx] as char)
}

pub fn forecast_reading(r: &ZambrettiReading) -> Option<char> {
    forecast_code(
        r.pressure_mbar,
        r.month,
        r.wind_index,
        r.trend_mbar_per_hour,
        r.north,
        (r.lower_pressure, r.upper_pressure),
    )
}

const TEXT: [&str; 26] = [
    "Settled fine",
    "Fine weather",
    "Becoming fine",
    "Fine, becoming less settled",
    "Fine, possible showers",
    "Fairly fine, improving",
    "Fairly fine, possible showers early",
    "Fairly fine, showery later",
    "Showery early, improving",
    "Changeable, mending",
    "Fairly fine, showers likely",
    "Rather unsettled clearing later",
    "Unsettled, probably improving",
    "Showery, bright intervals",
    "Showery, becoming less settled",
    "Changeable, some rain",
    "Unsettled, short fine intervals",
    "Unsettled, rain later",
    "Unsettled, some rain",
    "Mostly very unsettled",
    "Occasional rain, worsening",
    "Rain at times, very unsettled",
    "Rain at frequent intervals",
    "Rain, very unsettled",
    "Stormy, may improve",
    "Stormy, much rain",
];

pub fn text_for(code: char) -> Option<&'static str> {
    let c = code.to_ascii_uppercase();
    if c.is_ascii_uppercase() {
        TEXT.get((c as u8 - b'A') as usize).copied()
    } else {
        None
    }
}
