use std::path::Path;

use rust_xlsxwriter::Workbook;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{Table, Value, DATETIME_FORMAT};

pub const CLEANED_SHEET_NAME: &str = "Cleaned Data";

/// Writes a [`Table`] to a new single-sheet workbook, header row first.
pub struct ExcelWriter;

impl ExcelWriter {
    pub fn write_workbook(&self, table: &Table, path: &Path) -> AppResult<()> {
        info!("Writing {} rows to {}", table.row_count(), path.display());

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(CLEANED_SHEET_NAME)?;

        for (col_idx, name) in table.columns().iter().enumerate() {
            worksheet.write_string(0, column_number(col_idx)?, name.as_str())?;
        }

        for (row_idx, row) in table.rows().iter().enumerate() {
            let row_num = u32::try_from(row_idx + 1)
                .map_err(|_| AppError::WriteError(format!("row {} exceeds sheet limits", row_idx)))?;

            for (col_idx, value) in row.iter().enumerate() {
                let col_num = column_number(col_idx)?;
                match value {
                    Value::Null => {}
                    Value::Int(i) => {
                        worksheet.write_number(row_num, col_num, *i as f64)?;
                    }
                    Value::Float(f) if f.is_finite() => {
                        worksheet.write_number(row_num, col_num, *f)?;
                    }
                    Value::Float(_) => {}
                    Value::Bool(b) => {
                        worksheet.write_boolean(row_num, col_num, *b)?;
                    }
                    Value::Text(s) => {
                        worksheet.write_string(row_num, col_num, s.as_str())?;
                    }
                    Value::DateTime(dt) => {
                        let formatted = dt.format(DATETIME_FORMAT).to_string();
                        worksheet.write_string(row_num, col_num, formatted.as_str())?;
                    }
                }
            }
        }

        workbook.save(path)?;
        info!("Cleaned data written to {}", path.display());
        Ok(())
    }
}

fn column_number(idx: usize) -> AppResult<u16> {
    u16::try_from(idx)
        .map_err(|_| AppError::WriteError(format!("column {} exceeds sheet limits", idx)))
}
