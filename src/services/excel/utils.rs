use std::collections::HashSet;

use calamine::Data;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};

use crate::models::Value;

/// Cell strings pandas treats as missing when reading a workbook.
const NA_MARKERS: [&str; 11] = [
    "", "NA", "N/A", "n/a", "NULL", "null", "NaN", "nan", "#N/A", "<NA>", "None",
];

const DATETIME_FORMATS: [&str; 12] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%d-%m-%Y %H:%M:%S%.f",
    "%d-%m-%Y %H:%M",
];

// 9999-12-31, the last date a workbook can hold.
const MAX_EXCEL_SERIAL: f64 = 2_958_466.0;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];

/// Header for column `idx`. Blank headers become `Unnamed: idx` and repeats get a `.N` suffix.
pub fn header_name(cell: &Data, idx: usize, existing_names: &mut HashSet<String>) -> String {
    let raw = match cell {
        Data::Empty => String::new(),
        other => cell_to_value(other).to_string().trim().to_string(),
    };

    let base = if raw.is_empty() {
        format!("Unnamed: {}", idx)
    } else {
        raw
    };

    // If the name already exists, add a numeric suffix
    let mut name = base.clone();
    let mut counter = 1;
    while !existing_names.insert(name.clone()) {
        name = format!("{}.{}", base, counter);
        counter += 1;
    }

    name
}

pub fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::String(s) if is_na_marker(s) => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::DateTime(d) => excel_serial_to_datetime(d.as_f64())
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) => parse_datetime_str(s)
            .map(Value::DateTime)
            .unwrap_or_else(|| Value::Text(s.clone())),
        Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

pub fn is_na_marker(s: &str) -> bool {
    let trimmed = s.trim();
    NA_MARKERS.iter().any(|marker| *marker == trimmed)
}

/// Converts an Excel serial date (days since 1899-12-30, fraction = time of day).
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }

    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;

    epoch
        .checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::seconds(seconds))
}

/// Permissive timestamp parsing; date-only inputs resolve to midnight.
pub fn parse_datetime_str(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }

    for format in DATETIME_FORMATS.iter() {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
