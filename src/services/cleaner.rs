use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::AppResult;
use crate::models::{columns, Table, Value, DATETIME_FORMAT};
use crate::services::excel::utils::{excel_serial_to_datetime, parse_datetime_str};

pub const LATITUDE_RANGE: (f64, f64) = (41.6445, 42.0231);
pub const LONGITUDE_RANGE: (f64, f64) = (-87.9401, -87.5245);

const UNKNOWN_FBI_CODE: &str = "Unknown";

// Unanchored: any "XX" is rewritten, including inside words.
static MASKED_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new("XX").expect("static pattern"));

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct CleanSummary {
    pub rows_in: usize,
    pub dates_coerced: usize,
    pub x_imputed: usize,
    pub y_imputed: usize,
    pub fbi_codes_filled: usize,
    pub community_areas_filled: usize,
    pub wards_filled: usize,
    pub out_of_bounds: usize,
    pub duplicates_removed: usize,
    pub rows_out: usize,
}

/// Normalizes a raw crime export. Steps run in a fixed order over the whole table:
/// dates, imputation, text, bounding box, dedup, location.
pub struct DataCleaner;

impl DataCleaner {
    pub fn clean(&self, table: &Table) -> AppResult<Table> {
        self.clean_with_summary(table).map(|(table, _)| table)
    }

    pub fn clean_with_summary(&self, table: &Table) -> AppResult<(Table, CleanSummary)> {
        info!("Cleaning {} rows", table.row_count());
        let mut summary = CleanSummary {
            rows_in: table.row_count(),
            ..CleanSummary::default()
        };

        // Dates
        let (table, coerced_date) = self.normalize_timestamps(table, columns::DATE)?;
        let (table, coerced_updated) = self.normalize_timestamps(&table, columns::UPDATED_ON)?;
        summary.dates_coerced = coerced_date + coerced_updated;

        // Missing values; means are taken before any row is dropped
        let (table, filled) = self.impute_mean(&table, columns::X_COORDINATE)?;
        summary.x_imputed = filled;
        let (table, filled) = self.impute_mean(&table, columns::Y_COORDINATE)?;
        summary.y_imputed = filled;
        let (table, filled) =
            self.fill_nulls(&table, columns::FBI_CODE, Value::Text(UNKNOWN_FBI_CODE.to_string()))?;
        summary.fbi_codes_filled = filled;
        let (table, filled) = self.fill_nulls(&table, columns::COMMUNITY_AREA, Value::Int(0))?;
        summary.community_areas_filled = filled;
        let (table, filled) = self.fill_nulls(&table, columns::WARD, Value::Int(0))?;
        summary.wards_filled = filled;

        // Text
        let table = self.map_text(&table, columns::PRIMARY_TYPE, title_case)?;
        let table = self.map_text(&table, columns::DESCRIPTION, capitalize)?;
        let table = self.map_text(&table, columns::LOCATION_DESCRIPTION, title_case)?;
        let table = self.map_text(&table, columns::BLOCK, normalize_block)?;

        let before = table.row_count();
        let table = self.retain_in_bounds(&table)?;
        summary.out_of_bounds = before - table.row_count();

        let before = table.row_count();
        let table = self.drop_duplicates(&table)?;
        summary.duplicates_removed = before - table.row_count();

        let table = self.rebuild_location(&table)?;
        summary.rows_out = table.row_count();

        info!(
            rows_in = summary.rows_in,
            rows_out = summary.rows_out,
            out_of_bounds = summary.out_of_bounds,
            duplicates = summary.duplicates_removed,
            dates_coerced = summary.dates_coerced,
            "Data cleaning completed"
        );
        Ok((table, summary))
    }

    /// Rewrites a timestamp column as canonical text; unparsable cells become null.
    fn normalize_timestamps(&self, table: &Table, name: &str) -> AppResult<(Table, usize)> {
        let idx = table.require_column(name)?;
        let mut coerced = 0;
        let table = table.map_column(idx, |value| match coerce_timestamp(value) {
            Some(ts) => Value::Text(ts),
            None => {
                if !value.is_null() {
                    debug!("Unparsable {} value {:?}, setting to null", name, value);
                    coerced += 1;
                }
                Value::Null
            }
        });
        Ok((table, coerced))
    }

    fn impute_mean(&self, table: &Table, name: &str) -> AppResult<(Table, usize)> {
        let idx = table.require_column(name)?;
        let parsed: Vec<Option<f64>> = table.column_values(idx).map(Value::as_f64).collect();

        let present: Vec<f64> = parsed.iter().flatten().copied().collect();
        let mean = if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        };
        debug!("Mean of {} over {} values: {:?}", name, present.len(), mean);

        let mut filled = 0;
        let values = parsed
            .into_iter()
            .map(|v| match (v, mean) {
                (Some(v), _) => Value::Float(v),
                (None, Some(mean)) => {
                    filled += 1;
                    Value::Float(mean)
                }
                (None, None) => Value::Null,
            })
            .collect();

        Ok((table.with_column(name, values)?, filled))
    }

    fn fill_nulls(&self, table: &Table, name: &str, fill: Value) -> AppResult<(Table, usize)> {
        let idx = table.require_column(name)?;
        let mut filled = 0;
        let table = table.map_column(idx, |value| {
            if value.is_null() {
                filled += 1;
                fill.clone()
            } else {
                value.clone()
            }
        });
        Ok((table, filled))
    }

    /// Applies `f` to text cells only.
    fn map_text(&self, table: &Table, name: &str, f: fn(&str) -> String) -> AppResult<Table> {
        let idx = table.require_column(name)?;
        Ok(table.map_column(idx, |value| match value {
            Value::Text(s) => Value::Text(f(s)),
            other => other.clone(),
        }))
    }

    /// Null or non-numeric coordinates count as out of bounds.
    fn retain_in_bounds(&self, table: &Table) -> AppResult<Table> {
        let lat_idx = table.require_column(columns::LATITUDE)?;
        let lon_idx = table.require_column(columns::LONGITUDE)?;
        Ok(table.filter_rows(|row| {
            let keep = in_range(row[lat_idx].as_f64(), LATITUDE_RANGE)
                && in_range(row[lon_idx].as_f64(), LONGITUDE_RANGE);
            if !keep {
                debug!(
                    "Dropping row outside Chicago: lat={:?} lon={:?}",
                    row[lat_idx], row[lon_idx]
                );
            }
            keep
        }))
    }

    /// First occurrence of each (ID, Case Number) wins.
    fn drop_duplicates(&self, table: &Table) -> AppResult<Table> {
        let id_idx = table.require_column(columns::ID)?;
        let case_idx = table.require_column(columns::CASE_NUMBER)?;
        let mut seen: HashSet<(KeyPart, KeyPart)> = HashSet::new();
        Ok(table.filter_rows(|row| {
            seen.insert((KeyPart::from(&row[id_idx]), KeyPart::from(&row[case_idx])))
        }))
    }

    fn rebuild_location(&self, table: &Table) -> AppResult<Table> {
        let lat_idx = table.require_column(columns::LATITUDE)?;
        let lon_idx = table.require_column(columns::LONGITUDE)?;
        let locations = table
            .rows()
            .iter()
            .map(|row| match (row[lat_idx].as_f64(), row[lon_idx].as_f64()) {
                (Some(lat), Some(lon)) => Value::Text(format_location(lat, lon)),
                _ => Value::Null,
            })
            .collect();
        table.with_column(columns::LOCATION, locations)
    }
}

/// Canonical text for a timestamp cell, or `None` when it cannot be read as one.
pub fn coerce_timestamp(value: &Value) -> Option<String> {
    let parsed = match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Text(s) => parse_datetime_str(s),
        Value::Int(i) => excel_serial_to_datetime(*i as f64),
        Value::Float(f) => excel_serial_to_datetime(*f),
        Value::Null | Value::Bool(_) => None,
    };
    parsed.map(|dt| dt.format(DATETIME_FORMAT).to_string())
}

/// Title-cases a letter that follows a non-letter, lower-cases every other letter.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                push_titled(&mut out, c);
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    let mut out = String::with_capacity(s.len());
    if let Some(first) = chars.next() {
        push_titled(&mut out, first);
        out.extend(chars.flat_map(char::to_lowercase));
    }
    out
}

// Only the first char of an upper-case expansion stays upper: `ß` -> `Ss`.
fn push_titled(out: &mut String, c: char) {
    let mut upper = c.to_uppercase();
    if let Some(head) = upper.next() {
        out.push(head);
    }
    out.extend(upper.flat_map(char::to_lowercase));
}

/// `XX` becomes `00`, then title case.
pub fn normalize_block(s: &str) -> String {
    title_case(&MASKED_DIGITS.replace_all(s, "00"))
}

pub fn format_location(lat: f64, lon: f64) -> String {
    format!("({}, {})", format_coordinate(lat), format_coordinate(lon))
}

fn format_coordinate(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

fn in_range(value: Option<f64>, (low, high): (f64, f64)) -> bool {
    value.map_or(false, |v| v >= low && v <= high)
}

/// Hashable view of a key cell; numbers compare by value so `7` matches `7.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Null,
    Number(u64),
    Bool(bool),
    Text(String),
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Int(i) => KeyPart::number(*i as f64),
            Value::Float(f) if f.is_nan() => KeyPart::Null,
            Value::Float(f) => KeyPart::number(*f),
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::Text(s) => KeyPart::Text(s.clone()),
            Value::DateTime(_) => KeyPart::Text(value.to_string()),
        }
    }
}

impl KeyPart {
    fn number(v: f64) -> Self {
        // -0.0 and 0.0 are the same key
        KeyPart::Number(if v == 0.0 { 0.0f64.to_bits() } else { v.to_bits() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: [&str; 21] = columns::REQUIRED;

    struct Incident {
        id: Value,
        case_number: &'static str,
        date: Value,
        block: &'static str,
        description: &'static str,
        fbi_code: Value,
        ward: Value,
        community_area: Value,
        x: Value,
        y: Value,
        lat: Value,
        lon: Value,
    }

    impl Incident {
        fn new(id: i64, case_number: &'static str, lat: f64, lon: f64) -> Self {
            Self {
                id: Value::Int(id),
                case_number,
                date: Value::Text("01/05/2023 03:40:00 PM".into()),
                block: "001XX N STATE ST",
                description: "RETAIL THEFT",
                fbi_code: Value::Text("06".into()),
                ward: Value::Int(42),
                community_area: Value::Int(32),
                x: Value::Float(1_176_000.0),
                y: Value::Float(1_901_000.0),
                lat: Value::Float(lat),
                lon: Value::Float(lon),
            }
        }

        fn row(self) -> Vec<Value> {
            vec![
                self.id,
                Value::Text(self.case_number.into()),
                self.date,
                Value::Text(self.block.into()),
                Value::Text("0860".into()),
                Value::Text("THEFT".into()),
                Value::Text(self.description.into()),
                Value::Text("DEPARTMENT STORE".into()),
                Value::Bool(false),
                Value::Bool(false),
                Value::Int(111),
                Value::Int(1),
                self.ward,
                self.community_area,
                self.fbi_code,
                self.x,
                self.y,
                Value::Int(2023),
                Value::Text("2023-01-12T15:41:00.000".into()),
                self.lat,
                self.lon,
            ]
        }
    }

    fn table(incidents: Vec<Incident>) -> Table {
        Table::new(
            HEADER.iter().map(|h| h.to_string()).collect(),
            incidents.into_iter().map(Incident::row).collect(),
        )
    }

    fn ids(table: &Table) -> Vec<Value> {
        let idx = table.column_index(columns::ID).unwrap();
        table.column_values(idx).cloned().collect()
    }

    #[test]
    fn rows_outside_bounding_box_or_without_coordinates_are_dropped() {
        let mut no_lat = Incident::new(3, "JA3", 41.88, -87.63);
        no_lat.lat = Value::Null;
        let mut text_lon = Incident::new(4, "JA4", 41.88, -87.63);
        text_lon.lon = Value::Text("west".into());

        let input = table(vec![
            Incident::new(1, "JA1", 41.88, -87.63),
            Incident::new(2, "JA2", 50.0, -87.63),
            no_lat,
            text_lon,
            Incident::new(5, "JA5", 41.88, -88.5),
            Incident::new(6, "JA6", 41.6445, -87.5245),
        ]);

        let (cleaned, summary) = DataCleaner.clean_with_summary(&input).unwrap();
        assert_eq!(ids(&cleaned), vec![Value::Int(1), Value::Int(6)]);
        assert_eq!(summary.out_of_bounds, 4);
    }

    #[test]
    fn first_occurrence_of_duplicate_key_survives() {
        let mut second = Incident::new(1, "JA1", 41.9, -87.7);
        second.description = "SECOND";
        let mut float_id = Incident::new(1, "JA1", 41.9, -87.7);
        float_id.id = Value::Float(1.0);

        let input = table(vec![
            Incident::new(1, "JA1", 41.88, -87.63),
            second,
            Incident::new(1, "JA2", 41.88, -87.63),
            float_id,
        ]);

        let (cleaned, summary) = DataCleaner.clean_with_summary(&input).unwrap();
        assert_eq!(cleaned.row_count(), 2);
        assert_eq!(
            cleaned.value(0, columns::DESCRIPTION),
            Some(&Value::Text("Retail theft".into()))
        );
        assert_eq!(
            cleaned.value(1, columns::CASE_NUMBER),
            Some(&Value::Text("JA2".into()))
        );
        assert_eq!(summary.duplicates_removed, 2);
    }

    #[test]
    fn missing_coordinates_receive_batch_mean() {
        let mut a = Incident::new(1, "JA1", 41.88, -87.63);
        a.x = Value::Float(100.0);
        let mut b = Incident::new(2, "JA2", 41.88, -87.63);
        b.x = Value::Int(300);
        let mut c = Incident::new(3, "JA3", 41.88, -87.63);
        c.x = Value::Null;
        // Dropped later, but its X still counts toward the mean
        let mut d = Incident::new(4, "JA4", 60.0, -87.63);
        d.x = Value::Float(500.0);

        let (cleaned, summary) = DataCleaner.clean_with_summary(&table(vec![a, b, c, d])).unwrap();
        assert_eq!(cleaned.row_count(), 3);
        assert_eq!(
            cleaned.value(2, columns::X_COORDINATE),
            Some(&Value::Float(300.0))
        );
        assert_eq!(summary.x_imputed, 1);
        assert_eq!(summary.y_imputed, 0);
    }

    #[test]
    fn categorical_gaps_get_defaults() {
        let mut gaps = Incident::new(1, "JA1", 41.88, -87.63);
        gaps.fbi_code = Value::Null;
        gaps.ward = Value::Null;
        gaps.community_area = Value::Null;

        let cleaned = DataCleaner.clean(&table(vec![gaps])).unwrap();
        assert_eq!(
            cleaned.value(0, columns::FBI_CODE),
            Some(&Value::Text("Unknown".into()))
        );
        assert_eq!(cleaned.value(0, columns::WARD), Some(&Value::Int(0)));
        assert_eq!(cleaned.value(0, columns::COMMUNITY_AREA), Some(&Value::Int(0)));
    }

    #[test]
    fn dates_are_canonicalized_or_nulled() {
        let mut bad = Incident::new(2, "JA2", 41.88, -87.63);
        bad.date = Value::Text("sometime last week".into());

        let (cleaned, summary) = DataCleaner
            .clean_with_summary(&table(vec![Incident::new(1, "JA1", 41.88, -87.63), bad]))
            .unwrap();
        assert_eq!(
            cleaned.value(0, columns::DATE),
            Some(&Value::Text("2023-01-05 15:40:00".into()))
        );
        assert_eq!(
            cleaned.value(0, columns::UPDATED_ON),
            Some(&Value::Text("2023-01-12 15:41:00".into()))
        );
        assert_eq!(cleaned.value(1, columns::DATE), Some(&Value::Null));
        assert_eq!(summary.dates_coerced, 1);
    }

    #[test]
    fn block_masks_are_replaced_then_title_cased() {
        assert_eq!(normalize_block("123XX S WABASH"), "12300 S Wabash");
        assert_eq!(normalize_block("001XX N STATE ST"), "00100 N State St");
    }

    #[test]
    fn block_mask_replacement_is_unanchored() {
        // Known quirk: "XX" inside a word is rewritten too
        assert_eq!(normalize_block("0000X W XXL LOUNGE"), "0000X W 00L Lounge");
    }

    #[test]
    fn text_casing_rules() {
        assert_eq!(title_case("CRIMINAL DAMAGE"), "Criminal Damage");
        assert_eq!(title_case("o'hare 1st"), "O'Hare 1St");
        assert_eq!(capitalize("RETAIL THEFT"), "Retail theft");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn expanding_capitals_keep_only_the_first_letter_upper() {
        assert_eq!(title_case("ßx"), "Ssx");
        assert_eq!(title_case("straße ßx"), "Straße Ssx");
        assert_eq!(capitalize("ßAB"), "Ssab");
        assert_eq!(title_case("ßx ÉCOLE"), "Ssx École");
        assert_eq!(title_case("Ssx École"), "Ssx École");
    }

    #[test]
    fn non_ascii_text_is_stable_across_cleanings() {
        let input = table(vec![Incident::new(1, "JA1", 41.88, -87.63)]);
        let idx = input.require_column(columns::PRIMARY_TYPE).unwrap();
        let input = input.map_column(idx, |_| Value::Text("ßX".into()));

        let once = DataCleaner.clean(&input).unwrap();
        assert_eq!(
            once.value(0, columns::PRIMARY_TYPE),
            Some(&Value::Text("Ssx".into()))
        );
        assert_eq!(DataCleaner.clean(&once).unwrap(), once);
    }

    #[test]
    fn coordinate_column_without_numbers_keeps_its_nulls() {
        let mut a = Incident::new(1, "JA1", 41.88, -87.63);
        a.x = Value::Null;
        let mut b = Incident::new(2, "JA2", 41.88, -87.63);
        b.x = Value::Text("unknown".into());

        let (cleaned, summary) = DataCleaner.clean_with_summary(&table(vec![a, b])).unwrap();
        assert_eq!(cleaned.row_count(), 2);
        assert_eq!(cleaned.value(0, columns::X_COORDINATE), Some(&Value::Null));
        assert_eq!(cleaned.value(1, columns::X_COORDINATE), Some(&Value::Null));
        assert_eq!(summary.x_imputed, 0);
    }

    #[test]
    fn numeric_date_cells_are_read_as_excel_serials() {
        let mut serial_float = Incident::new(1, "JA1", 41.88, -87.63);
        serial_float.date = Value::Float(44931.5);
        let mut serial_int = Incident::new(2, "JA2", 41.88, -87.63);
        serial_int.date = Value::Int(44931);
        let mut out_of_range = Incident::new(3, "JA3", 41.88, -87.63);
        out_of_range.date = Value::Float(-5.0);

        let (cleaned, summary) = DataCleaner
            .clean_with_summary(&table(vec![serial_float, serial_int, out_of_range]))
            .unwrap();
        assert_eq!(
            cleaned.value(0, columns::DATE),
            Some(&Value::Text("2023-01-05 12:00:00".into()))
        );
        assert_eq!(
            cleaned.value(1, columns::DATE),
            Some(&Value::Text("2023-01-05 00:00:00".into()))
        );
        assert_eq!(cleaned.value(2, columns::DATE), Some(&Value::Null));
        assert_eq!(summary.dates_coerced, 1);
    }

    #[test]
    fn location_is_rebuilt_from_coordinates() {
        let cleaned = DataCleaner
            .clean(&table(vec![Incident::new(1, "JA1", 41.8781, -87.6298)]))
            .unwrap();
        assert_eq!(cleaned.columns().last().map(String::as_str), Some("Location"));
        assert_eq!(
            cleaned.value(0, columns::LOCATION),
            Some(&Value::Text("(41.8781, -87.6298)".into()))
        );
        assert_eq!(format_location(42.0, -87.6), "(42.0, -87.6)");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let mut gaps = Incident::new(2, "JA2", 41.9, -87.7);
        gaps.x = Value::Null;
        gaps.fbi_code = Value::Null;
        let input = table(vec![
            Incident::new(1, "JA1", 41.88, -87.63),
            gaps,
            Incident::new(1, "JA1", 41.88, -87.63),
            Incident::new(3, "JA3", 10.0, -87.63),
        ]);

        let once = DataCleaner.clean(&input).unwrap();
        let twice = DataCleaner.clean(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_required_column_fails() {
        let input = Table::new(vec!["ID".to_string()], vec![vec![Value::Int(1)]]);
        assert!(DataCleaner.clean(&input).is_err());
    }
}
