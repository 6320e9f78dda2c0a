use std::path::Path;

use tracing::{debug, info};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::Table;
use crate::services::cleaner::{CleanSummary, DataCleaner};
use crate::services::db_loader::{BatchReport, DbLoader};
use crate::services::excel::{preview, ExcelLoader, ExcelWriter};

const PREVIEW_ROWS: usize = 5;

/// Loads the source workbook and cleans it. Load errors abort before cleaning.
pub fn load_and_clean(source: &Path) -> AppResult<(Table, CleanSummary)> {
    let raw = ExcelLoader.load_workbook(source)?;
    log_table("Loaded", &raw);

    let (cleaned, summary) = DataCleaner.clean_with_summary(&raw)?;
    log_table("Cleaned", &cleaned);
    Ok((cleaned, summary))
}

/// Source workbook → cleaner → `crime_incidents`.
pub fn run_database_pipeline(config: &Config) -> AppResult<BatchReport> {
    let mut db = DbLoader::open(&config.database)?;
    db.ensure_schema()?;

    let (cleaned, _) = load_and_clean(&config.source_path)?;
    let report = db.insert_table(&cleaned)?;
    debug!("Table now holds {} rows", db.row_count()?);
    Ok(report)
}

/// Source workbook → cleaner → new workbook at the destination path.
pub fn run_spreadsheet_pipeline(config: &Config) -> AppResult<CleanSummary> {
    let (cleaned, summary) = load_and_clean(&config.source_path)?;
    ExcelWriter.write_workbook(&cleaned, &config.destination_path)?;
    Ok(summary)
}

fn log_table(stage: &str, table: &Table) {
    info!(
        "{} table: {} rows x {} columns",
        stage,
        table.row_count(),
        table.column_count()
    );
    if tracing::enabled!(tracing::Level::DEBUG) {
        debug!("{} preview:\n{}", stage, preview(table, PREVIEW_ROWS));
    }
}
