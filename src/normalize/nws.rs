// src/normalize/nws.rs
//! Point forecast matrix (PFM) parser.
//!
//! A PFM block starts at the line beginning with the location id and ends at
//! `$$`. Rows are fixed-width: a 14 character label followed by columns
//! aligned under the hour row. The block has a 3-hourly section followed by a
//! 6-hourly one; hours are local to the issuing office.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::ParseError;
use crate::types::{Field, ForecastRecord, RawBody, RawPayload, Source};
use crate::units::parse_precip_qty;

const LABEL_WIDTH: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Row {
    Hour,
    MinMax,
    MaxMin,
    Value(Field),
}

fn row_for_label(label: &str) -> Option<Row> {
    Some(match label {
        "HOUR" => Row::Hour,
        "MIN/MAX" => Row::MinMax,
        "MAX/MIN" => Row::MaxMin,
        "TEMP" => Row::Value(Field::Temp),
        "DEWPT" => Row::Value(Field::Dewpoint),
        "RH" => Row::Value(Field::Humidity),
        "WIND DIR" | "PWIND DIR" => Row::Value(Field::WindDir),
        "WIND SPD" => Row::Value(Field::WindSpeed),
        "WIND GUST" => Row::Value(Field::WindGust),
        "WIND CHAR" => Row::Value(Field::WindChar),
        "CLOUDS" | "AVG CLOUDS" => Row::Value(Field::Clouds),
        "POP 12HR" => Row::Value(Field::Pop),
        "QPF 12HR" => Row::Value(Field::Qpf),
        "SNOW 12HR" => Row::Value(Field::Qsf),
        "RAIN" => Row::Value(Field::Rain),
        "RAIN SHWRS" => Row::Value(Field::Rainshwrs),
        "TSTMS" => Row::Value(Field::Tstms),
        "DRIZZLE" => Row::Value(Field::Drizzle),
        "SNOW" => Row::Value(Field::Snow),
        "SNOWSHWRS" | "SNOW SHWRS" => Row::Value(Field::Snowshwrs),
        "FLURRIES" => Row::Value(Field::Flurries),
        "SLEET" => Row::Value(Field::Sleet),
        "FRZNG RAIN" | "FRZG RAIN" => Row::Value(Field::Frzngrain),
        "FRZNG DRZL" => Row::Value(Field::Frzngdrzl),
        "OBVIS" => Row::Value(Field::Obvis),
        "WIND CHILL" => Row::Value(Field::WindChill),
        "HEAT INDEX" => Row::Value(Field::HeatIndex),
        _ => return None,
    })
}

/// Width of a value column; precipitation amounts only appear every 12h.
fn field_width(row: Row) -> (usize, bool) {
    match row {
        Row::Value(Field::Qpf) => (8, true),
        Row::Value(Field::Qsf) => (5, true),
        _ => (3, false),
    }
}

/// Returns the lines from the one starting with `lid` up to `$$`.
pub fn extract_block<'a>(text: &'a str, lid: &str) -> Option<Vec<&'a str>> {
    let mut block: Option<Vec<&str>> = None;
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with(lid) {
            block = Some(vec![line]);
        } else if let Some(b) = block.as_mut() {
            if line.starts_with("$$") {
                break;
            }
            b.push(line);
        }
    }
    block
}

fn tz_offset_hours(abbr: &str) -> Option<i32> {
    Some(match abbr {
        "UTC" | "GMT" | "Z" => 0,
        "AST" | "EDT" => -4,
        "ADT" => -3,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" | "AKDT" => -8,
        "AKST" => -9,
        "HST" => -10,
        "SST" => -11,
        "CHST" => 10,
        _ => return None,
    })
}

fn month_number(abbr: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(abbr))
        .map(|i| i as u32 + 1)
}

/// Parses a product header time such as `418 PM EDT SAT MAY 11 2013` into
/// local time plus the zone offset.
pub fn parse_issued(line: &str) -> Option<(NaiveDateTime, FixedOffset)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 7 {
        return None;
    }
    let hm = parts[0];
    if !(3..=4).contains(&hm.len()) || !hm.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (h, m) = hm.split_at(hm.len() - 2);
    let mut hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    match parts[1].to_ascii_uppercase().as_str() {
        "AM" if hour == 12 => hour = 0,
        "AM" => {}
        "PM" if hour != 12 => hour += 12,
        "PM" => {}
        _ => return None,
    }
    let offset = FixedOffset::east_opt(tz_offset_hours(&parts[2].to_ascii_uppercase())? * 3600)?;
    let month = month_number(parts[4])?;
    let day: u32 = parts[5].parse().ok()?;
    let year: i32 = parts[6].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
    Some((date.and_time(time), offset))
}

pub fn parse_issued_utc(line: &str) -> Option<DateTime<Utc>> {
    let (local, offset) = parse_issued(line)?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|t| t.with_timezone(&Utc))
}

fn slice(s: &str, start: usize, end: usize) -> &str {
    let end = end.min(s.len());
    let start = start.min(end);
    s.get(start..end).unwrap_or("")
}

/// One forecast column: its end position in the row and the period it covers.
struct Column {
    end: usize,
    event: DateTime<Utc>,
    hours: u32,
}

struct Section {
    rows: HashMap<Row, String>,
    columns: Vec<usize>,
}

pub fn normalize(payload: &RawPayload) -> Result<Vec<ForecastRecord>, ParseError> {
    let RawBody::Text(text) = &payload.body else {
        return Err(ParseError::MissingRequiredField("nws: expected a text product".into()));
    };
    let lid = payload
        .location
        .as_deref()
        .ok_or_else(|| ParseError::MissingRequiredField("nws: location id".into()))?;
    let block = extract_block(text, lid)
        .ok_or_else(|| ParseError::MissingRequiredField(format!("nws: forecast block {lid}")))?;

    let mut issued: Option<(NaiveDateTime, FixedOffset)> = None;
    let mut rows3: HashMap<Row, String> = HashMap::new();
    let mut rows6: HashMap<Row, String> = HashMap::new();
    let mut mode: Option<u32> = None;

    for line in &block {
        if issued.is_none() && line.split(' ').count() == 7 {
            if let Some(t) = parse_issued(line) {
                issued = Some(t);
                continue;
            }
        }
        let mut label = slice(line, 0, LABEL_WIDTH).trim().to_ascii_uppercase();
        if label.starts_with("UTC") {
            continue;
        }
        // a leading pad keeps negative values inside their column
        let mut prefix = ' ';
        if label.ends_with("3HRLY") {
            label = "HOUR".into();
            mode = Some(3);
        } else if label.ends_with("6HRLY") {
            label = "HOUR".into();
            mode = Some(6);
        } else if let Some(stripped) = label.strip_suffix('-') {
            label = stripped.trim().to_string();
            prefix = '-';
        }
        let Some(row) = row_for_label(&label) else {
            continue;
        };
        let data = format!("{prefix}{}", slice(line, LABEL_WIDTH, line.len()));
        match mode {
            Some(3) => {
                rows3.insert(row, data);
            }
            Some(6) => {
                rows6.insert(row, data);
            }
            _ => tracing::debug!(label = %label, "nws: row before any hour row ignored"),
        }
    }

    let (issued_local, offset) =
        issued.ok_or_else(|| ParseError::MissingRequiredField(format!("nws: issued time for {lid}")))?;
    let issued_utc = offset
        .from_local_datetime(&issued_local)
        .single()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| ParseError::MissingRequiredField("nws: issued time".into()))?;

    let mut day = issued_local.date();
    let mut last_hour: Option<u32> = None;
    let mut columns: Vec<Column> = Vec::new();
    let mut to_event = |hour: u32, hours: u32, end: usize, columns: &mut Vec<Column>| {
        if last_hour.is_some_and(|l| hour < l) {
            day = day.succ_opt().unwrap_or(day);
        }
        last_hour = Some(hour);
        let local = day.and_time(NaiveTime::default()) + Duration::hours(i64::from(hour));
        if let Some(event) = offset.from_local_datetime(&local).single() {
            columns.push(Column {
                end,
                event: event.with_timezone(&Utc),
                hours,
            });
        }
    };

    let mut s3 = Section {
        rows: rows3,
        columns: Vec::new(),
    };
    if let Some(hours) = s3.rows.get(&Row::Hour).cloned() {
        let mut i = 1;
        while i < hours.len() {
            if let Ok(h) = slice(&hours, i, i + 2).trim().parse::<u32>() {
                to_event(h, 3, i + 1, &mut columns);
                s3.columns.push(columns.len() - 1);
            }
            i += 3;
        }
    }

    let mut s6 = Section {
        rows: rows6,
        columns: Vec::new(),
    };
    if let Some(hours) = s6.rows.get(&Row::Hour).cloned() {
        let bytes = hours.as_bytes();
        let mut start: Option<usize> = None;
        for i in 0..=bytes.len() {
            let blank = i == bytes.len() || bytes[i].is_ascii_whitespace();
            match (blank, start) {
                (false, None) => start = Some(i),
                (true, Some(s)) => {
                    if let Ok(h) = slice(&hours, s, i).parse::<u32>() {
                        to_event(h, 6, i - 1, &mut columns);
                        s6.columns.push(columns.len() - 1);
                    }
                    start = None;
                }
                _ => {}
            }
        }
    }

    let mut cells: HashMap<Row, Vec<Option<String>>> = HashMap::new();
    fill(&mut cells, &s3, &columns);
    fill(&mut cells, &s6, &columns);

    let mut records: Vec<ForecastRecord> = columns
        .iter()
        .map(|c| ForecastRecord::new(Source::Nws, issued_utc, c.event, c.hours))
        .collect();

    assign_min_max(&cells, &mut records, Row::MinMax, true);
    assign_min_max(&cells, &mut records, Row::MaxMin, false);

    for (row, values) in &cells {
        let Row::Value(field) = row else { continue };
        for (rec, cell) in records.iter_mut().zip(values) {
            if let Some(v) = cell {
                set_cell(rec, *field, v);
            }
        }
    }
    Ok(records)
}

/// Reads each row's cells, right aligned at the column end positions.
fn fill(cells: &mut HashMap<Row, Vec<Option<String>>>, section: &Section, columns: &[Column]) {
    for (row, data) in &section.rows {
        if *row == Row::Hour {
            continue;
        }
        let (width, sparse) = field_width(*row);
        let slots = cells.entry(*row).or_insert_with(|| vec![None; columns.len()]);
        for (q, &idx) in section.columns.iter().rev().enumerate() {
            if sparse && q % 4 != 0 {
                continue;
            }
            let end = columns[idx].end;
            let chunk = slice(data, (end + 1).saturating_sub(width), end + 1).trim();
            if !chunk.is_empty() {
                slots[idx] = Some(chunk.to_string());
            }
        }
    }
}

/// MIN/MAX rows alternate between minimum and maximum temperature.
fn assign_min_max(
    cells: &HashMap<Row, Vec<Option<String>>>,
    records: &mut [ForecastRecord],
    row: Row,
    min_first: bool,
) {
    let Some(values) = cells.get(&row) else { return };
    let mut is_min = min_first;
    for (rec, cell) in records.iter_mut().zip(values) {
        if let Some(v) = cell {
            let field = if is_min { Field::TempMin } else { Field::TempMax };
            rec.set_number(field, v.parse().ok());
            is_min = !is_min;
        }
    }
}

fn set_cell(rec: &mut ForecastRecord, field: Field, raw: &str) {
    match field {
        Field::Qpf | Field::Qsf => {
            let (lo, hi) = if field == Field::Qpf {
                (Field::QpfMin, Field::QpfMax)
            } else {
                (Field::QsfMin, Field::QsfMax)
            };
            if let Some(q) = parse_precip_qty(raw) {
                rec.set_number(field, Some(q.qty));
                rec.set_number(lo, Some(q.min));
                rec.set_number(hi, Some(q.max));
            }
        }
        Field::Temp
        | Field::Dewpoint
        | Field::Humidity
        | Field::WindSpeed
        | Field::WindGust
        | Field::Pop
        | Field::WindChill
        | Field::HeatIndex => rec.set_number(field, raw.parse().ok()),
        _ => rec.set_text(field, Some(raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_header_times() {
        let ts = |s: &str| parse_issued_utc(s).map(|t| t.timestamp());
        assert_eq!(ts("418 PM EDT SAT MAY 11 2013"), Some(1368303480));
        assert_eq!(ts("1200 AM EDT SAT MAY 11 2013"), Some(1368244800));
        assert_eq!(ts("1239 PM EDT TUE SEP 3 2013"), Some(1378226340));
        assert_eq!(ts("418 PM XYZ SAT MAY 11 2013"), None);
    }

    #[test]
    fn block_stops_at_terminator() {
        let text = "junk\nMEZ020-1\nline a\n$$\nMEZ021-1\nline b\n$$\n";
        assert_eq!(extract_block(text, "MEZ020"), Some(vec!["MEZ020-1", "line a"]));
        assert_eq!(extract_block(text, "MEZ099"), None);
    }
}
