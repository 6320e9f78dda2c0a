#![allow(dead_code)]

use std::path::Path;

use crime_cleaner::models::columns;
use crime_cleaner::Value;
use rust_xlsxwriter::{Format, Workbook};

pub fn incident(id: i64, case_number: &str, lat: f64, lon: f64) -> Vec<Value> {
    vec![
        Value::Int(id),
        Value::Text(case_number.to_string()),
        Value::Text("01/05/2023 03:40:00 PM".into()),
        Value::Text("064XX S DR MARTIN LUTHER KING JR DR".into()),
        Value::Text("0486".into()),
        Value::Text("BATTERY".into()),
        Value::Text("DOMESTIC BATTERY SIMPLE".into()),
        Value::Text("APARTMENT".into()),
        Value::Bool(false),
        Value::Bool(true),
        Value::Int(312),
        Value::Int(3),
        Value::Int(20),
        Value::Int(42),
        Value::Text("08B".into()),
        Value::Float(1_180_200.0),
        Value::Float(1_862_500.0),
        Value::Int(2023),
        Value::Text("01/12/2023 03:41:00 PM".into()),
        Value::Float(lat),
        Value::Float(lon),
    ]
}

pub fn header() -> Vec<String> {
    columns::REQUIRED.iter().map(|c| c.to_string()).collect()
}

pub fn set(row: &mut [Value], column: &str, value: Value) {
    let idx = columns::REQUIRED
        .iter()
        .position(|c| *c == column)
        .expect("known column");
    row[idx] = value;
}

/// Writes a single-sheet crime export with the standard header.
pub fn write_crime_workbook(path: &Path, rows: &[Vec<Value>]) {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("Crimes").unwrap();

    for (col, name) in header().iter().enumerate() {
        ws.write_string(0, col as u16, name.as_str()).unwrap();
    }

    for (r, row) in rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, value) in row.iter().enumerate() {
            let c = c as u16;
            match value {
                Value::Null => {}
                Value::Int(i) => {
                    ws.write_number(r, c, *i as f64).unwrap();
                }
                Value::Float(f) => {
                    ws.write_number(r, c, *f).unwrap();
                }
                Value::Bool(b) => {
                    ws.write_boolean(r, c, *b).unwrap();
                }
                Value::Text(s) => {
                    ws.write_string(r, c, s.as_str()).unwrap();
                }
                Value::DateTime(_) => panic!("use write_workbook_with_date_cell for date cells"),
            }
        }
    }

    wb.save(path).unwrap();
}

/// Writes a one-row sheet whose `Date` cell is a date-formatted serial number.
pub fn write_workbook_with_date_cell(path: &Path, serial: f64) {
    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    let date_format = Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");

    ws.write_string(0, 0, "ID").unwrap();
    ws.write_string(0, 1, "Date").unwrap();
    ws.write_number(1, 0, 7).unwrap();
    ws.write_number_with_format(1, 1, serial, &date_format).unwrap();

    wb.save(path).unwrap();
}
