use std::fmt;

use chrono::NaiveDateTime;

use crate::error::{AppError, AppResult};

/// Canonical rendering for every timestamp the pipeline emits.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header names of the Chicago crime export.
pub mod columns {
    pub const ID: &str = "ID";
    pub const CASE_NUMBER: &str = "Case Number";
    pub const DATE: &str = "Date";
    pub const BLOCK: &str = "Block";
    pub const IUCR: &str = "IUCR";
    pub const PRIMARY_TYPE: &str = "Primary Type";
    pub const DESCRIPTION: &str = "Description";
    pub const LOCATION_DESCRIPTION: &str = "Location Description";
    pub const ARREST: &str = "Arrest";
    pub const DOMESTIC: &str = "Domestic";
    pub const BEAT: &str = "Beat";
    pub const DISTRICT: &str = "District";
    pub const WARD: &str = "Ward";
    pub const COMMUNITY_AREA: &str = "Community Area";
    pub const FBI_CODE: &str = "FBI Code";
    pub const X_COORDINATE: &str = "X Coordinate";
    pub const Y_COORDINATE: &str = "Y Coordinate";
    pub const YEAR: &str = "Year";
    pub const UPDATED_ON: &str = "Updated On";
    pub const LATITUDE: &str = "Latitude";
    pub const LONGITUDE: &str = "Longitude";
    pub const LOCATION: &str = "Location";

    pub const REQUIRED: [&str; 21] = [
        ID,
        CASE_NUMBER,
        DATE,
        BLOCK,
        IUCR,
        PRIMARY_TYPE,
        DESCRIPTION,
        LOCATION_DESCRIPTION,
        ARREST,
        DOMESTIC,
        BEAT,
        DISTRICT,
        WARD,
        COMMUNITY_AREA,
        FBI_CODE,
        X_COORDINATE,
        Y_COORDINATE,
        YEAR,
        UPDATED_ON,
        LATITUDE,
        LONGITUDE,
    ];
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the cell. Text is parsed; NaN counts as missing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if f.is_nan() => None,
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| !f.is_nan()),
            _ => None,
        }
    }

    /// Text view of the cell, `None` for nulls.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{}", *v as i64),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "{}", s),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

/// Ordered rows sharing one column list. Transformations return new tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Rows shorter than the header are padded with nulls, longer ones truncated.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> AppResult<usize> {
        self.column_index(name)
            .ok_or_else(|| AppError::MissingColumn(name.to_string()))
    }

    /// Cell lookup by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    pub fn filter_rows<F>(&self, mut predicate: F) -> Table
    where
        F: FnMut(&[Value]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|row| predicate(row.as_slice()))
            .cloned()
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Rewrites a single column cell by cell.
    pub fn map_column<F>(&self, idx: usize, mut mapper: F) -> Table
    where
        F: FnMut(&Value) -> Value,
    {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut out = row.clone();
                out[idx] = mapper(&row[idx]);
                out
            })
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Replaces `name` in place when present, appends it otherwise.
    pub fn with_column(&self, name: &str, values: Vec<Value>) -> AppResult<Table> {
        if values.len() != self.rows.len() {
            return Err(AppError::InvalidInput(format!(
                "column '{}' has {} values for {} rows",
                name,
                values.len(),
                self.rows.len()
            )));
        }

        let mut columns = self.columns.clone();
        let existing = self.column_index(name);
        if existing.is_none() {
            columns.push(name.to_string());
        }

        let rows = self
            .rows
            .iter()
            .zip(values)
            .map(|(row, value)| {
                let mut out = row.clone();
                match existing {
                    Some(idx) => out[idx] = value,
                    None => out.push(value),
                }
                out
            })
            .collect();

        Ok(Table { columns, rows })
    }
}

/// Typed view of one cleaned row, in the shape the relational sink binds.
#[derive(Debug, Clone, PartialEq)]
pub struct CrimeRecord {
    pub id: Option<i64>,
    pub case_number: Option<String>,
    pub occurred_at: Option<String>,
    pub block: Option<String>,
    pub iucr: Option<String>,
    pub primary_type: Option<String>,
    pub description: Option<String>,
    pub location_description: Option<String>,
    pub arrest: i64,
    pub domestic: i64,
    pub beat: Option<i64>,
    pub district: Option<i64>,
    pub ward: Option<i64>,
    pub community_area: Option<i64>,
    pub fbi_code: Option<String>,
    pub x_coordinate: Option<f64>,
    pub y_coordinate: Option<f64>,
    pub year: Option<i64>,
    pub updated_at: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub location: Option<String>,
}

impl CrimeRecord {
    /// Fails with `ParseError` when a cell cannot be coerced to its column type.
    pub fn from_row(table: &Table, row: usize) -> AppResult<Self> {
        let cells = RowCells { table, row };

        Ok(CrimeRecord {
            id: cells.int(columns::ID)?,
            case_number: cells.text(columns::CASE_NUMBER)?,
            occurred_at: cells.text(columns::DATE)?,
            block: cells.text(columns::BLOCK)?,
            iucr: cells.text(columns::IUCR)?,
            primary_type: cells.text(columns::PRIMARY_TYPE)?,
            description: cells.text(columns::DESCRIPTION)?,
            location_description: cells.text(columns::LOCATION_DESCRIPTION)?,
            arrest: cells.flag(columns::ARREST)?,
            domestic: cells.flag(columns::DOMESTIC)?,
            beat: cells.int(columns::BEAT)?,
            district: cells.int(columns::DISTRICT)?,
            ward: cells.int(columns::WARD)?,
            community_area: cells.int(columns::COMMUNITY_AREA)?,
            fbi_code: cells.text(columns::FBI_CODE)?,
            x_coordinate: cells.float(columns::X_COORDINATE)?,
            y_coordinate: cells.float(columns::Y_COORDINATE)?,
            year: cells.int(columns::YEAR)?,
            updated_at: cells.text(columns::UPDATED_ON)?,
            latitude: cells.required_float(columns::LATITUDE)?,
            longitude: cells.required_float(columns::LONGITUDE)?,
            location: table.value(row, columns::LOCATION).and_then(Value::as_text),
        })
    }
}

struct RowCells<'a> {
    table: &'a Table,
    row: usize,
}

impl<'a> RowCells<'a> {
    fn cell(&self, name: &str) -> AppResult<&'a Value> {
        self.table
            .value(self.row, name)
            .ok_or_else(|| AppError::MissingColumn(name.to_string()))
    }

    fn text(&self, name: &str) -> AppResult<Option<String>> {
        self.cell(name).map(Value::as_text)
    }

    fn int(&self, name: &str) -> AppResult<Option<i64>> {
        coerce_int(name, self.cell(name)?)
    }

    fn float(&self, name: &str) -> AppResult<Option<f64>> {
        coerce_float(name, self.cell(name)?)
    }

    fn required_float(&self, name: &str) -> AppResult<f64> {
        self.float(name)?
            .ok_or_else(|| AppError::ParseError(format!("column '{}' is null", name)))
    }

    fn flag(&self, name: &str) -> AppResult<i64> {
        coerce_flag(name, self.cell(name)?)
    }
}

fn mismatch(column: &str, value: &Value, expected: &str) -> AppError {
    AppError::ParseError(format!(
        "column '{}': expected {}, got {:?}",
        column, expected, value
    ))
}

fn coerce_int(column: &str, value: &Value) -> AppResult<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        Value::Int(i) => Ok(Some(*i)),
        Value::Float(f) if f.is_nan() => Ok(None),
        Value::Float(f) if f.fract() == 0.0 => Ok(Some(*f as i64)),
        Value::Bool(b) => Ok(Some(i64::from(*b))),
        Value::Text(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
                .map(Some)
                .ok_or_else(|| mismatch(column, value, "integer"))
        }
        _ => Err(mismatch(column, value, "integer")),
    }
}

fn coerce_float(column: &str, value: &Value) -> AppResult<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Float(f) if f.is_nan() => Ok(None),
        other => other
            .as_f64()
            .map(Some)
            .ok_or_else(|| mismatch(column, value, "number")),
    }
}

/// Booleans are bound as 0/1.
fn coerce_flag(column: &str, value: &Value) -> AppResult<i64> {
    let flag = match value {
        Value::Bool(b) => Some(*b),
        Value::Int(i) => Some(*i != 0),
        Value::Float(f) if !f.is_nan() => Some(*f != 0.0),
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Some(true),
            "false" | "f" | "0" | "no" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    };
    flag.map(i64::from)
        .ok_or_else(|| mismatch(column, value, "boolean"))
}
