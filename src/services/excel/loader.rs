use std::collections::HashSet;
use std::io::{Cursor, ErrorKind};
use std::path::Path;

use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use tracing::{debug, info, warn};

use super::utils::{cell_to_value, header_name};
use crate::error::{AppError, AppResult};
use crate::models::{Table, Value};

/// Reads the first sheet of a workbook into a [`Table`]. The first row is the header.
pub struct ExcelLoader;

impl ExcelLoader {
    pub fn load_workbook(&self, path: &Path) -> AppResult<Table> {
        info!("Loading Excel file {}", path.display());
        let file_data = match std::fs::read(path) {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(AppError::IoError(e)),
        };

        let table = self.load_workbook_from_bytes(file_data)?;
        info!(
            "Data loaded successfully: {} rows x {} columns",
            table.row_count(),
            table.column_count()
        );
        Ok(table)
    }

    pub fn load_workbook_from_bytes(&self, file_data: Bytes) -> AppResult<Table> {
        let cursor = Cursor::new(file_data);
        let mut workbook = open_workbook_auto_from_rs(cursor).map_err(|e| {
            tracing::error!("Failed to open Excel file: {}", e);
            AppError::ParseError(format!("Failed to open Excel file: {}", e))
        })?;

        let sheet_names = workbook.sheet_names();
        let sheet_name = sheet_names
            .first()
            .ok_or_else(|| AppError::ParseError("No sheets found in workbook".to_string()))?;
        debug!("Found {} sheets, reading {}", sheet_names.len(), sheet_name);

        let range = workbook.worksheet_range(sheet_name).map_err(|e| {
            AppError::ParseError(format!("Failed to read worksheet {}: {}", sheet_name, e))
        })?;

        Ok(self.build_table(&range))
    }

    fn build_table(&self, range: &Range<Data>) -> Table {
        let mut rows = range.rows();

        let mut existing_names = HashSet::new();
        let headers: Vec<String> = match rows.next() {
            Some(header_row) => header_row
                .iter()
                .enumerate()
                .map(|(idx, cell)| header_name(cell, idx, &mut existing_names))
                .collect(),
            None => {
                warn!("Sheet is empty");
                Vec::new()
            }
        };

        let data: Vec<Vec<Value>> = rows
            .map(|row| row.iter().map(cell_to_value).collect())
            .collect();

        Table::new(headers, data)
    }
}
