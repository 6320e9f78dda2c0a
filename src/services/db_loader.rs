use rusqlite::{params, Connection, Transaction};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::models::{CrimeRecord, Table};

pub const TABLE_NAME: &str = "crime_incidents";

// Bounded strings carry CHECK constraints; SQLite ignores VARCHAR widths otherwise.
const CREATE_TABLE_SQL: &str = "
    CREATE TABLE IF NOT EXISTS crime_incidents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        case_number VARCHAR(50) CHECK (length(case_number) <= 50),
        date DATETIME,
        block VARCHAR(255) CHECK (length(block) <= 255),
        iucr VARCHAR(10) CHECK (length(iucr) <= 10),
        primary_type VARCHAR(100) CHECK (length(primary_type) <= 100),
        description TEXT,
        location_description VARCHAR(255) CHECK (length(location_description) <= 255),
        arrest TINYINT(1),
        domestic TINYINT(1),
        beat INT,
        district INT,
        ward INT,
        community_area INT,
        fbi_code VARCHAR(10) CHECK (length(fbi_code) <= 10),
        x_coordinate FLOAT,
        y_coordinate FLOAT,
        year INT,
        updated_on DATETIME,
        latitude DECIMAL(9,6),
        longitude DECIMAL(9,6),
        location VARCHAR(50) CHECK (length(location) <= 50)
    )";

// Location is not inserted; it only exists for the spreadsheet output.
const INSERT_SQL: &str = "
    INSERT INTO crime_incidents (
        case_number, date, block, iucr, primary_type, description, location_description,
        arrest, domestic, beat, district, ward, community_area, fbi_code,
        x_coordinate, y_coordinate, year, updated_on, latitude, longitude
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted { row: usize },
    Failed { row: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub inserted: usize,
    pub failed: usize,
    pub failures: Vec<RowFailure>,
}

impl BatchReport {
    fn record(&mut self, outcome: &InsertOutcome) {
        self.attempted += 1;
        match outcome {
            InsertOutcome::Inserted { .. } => self.inserted += 1,
            InsertOutcome::Failed { row, reason } => {
                self.failed += 1;
                self.failures.push(RowFailure {
                    row: *row,
                    reason: reason.clone(),
                });
            }
        }
    }
}

/// Relational sink for cleaned incidents.
pub struct DbLoader {
    conn: Connection,
}

impl DbLoader {
    pub fn open(config: &DatabaseConfig) -> AppResult<Self> {
        let path = config.sqlite_path();
        info!("Connecting to {} ({})", config.target(), path.display());
        let conn = Connection::open(&path).map_err(|e| {
            error!("Failed to open database {}: {}", path.display(), e);
            AppError::DatabaseError(e.to_string())
        })?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            error!("Failed to open in-memory database: {}", e);
            AppError::DatabaseError(e.to_string())
        })?;
        debug!("Successfully created in-memory database connection");
        Ok(Self { conn })
    }

    /// Creates `crime_incidents` if absent. Safe to call on every run.
    pub fn ensure_schema(&self) -> AppResult<()> {
        self.conn.execute(CREATE_TABLE_SQL, []).map_err(|e| {
            error!("Failed to create table: {}", e);
            AppError::DatabaseError(e.to_string())
        })?;
        info!("Table '{}' created if it did not exist", TABLE_NAME);
        Ok(())
    }

    /// Opens the single transaction used for a run's inserts.
    pub fn begin_batch(&mut self) -> AppResult<InsertBatch<'_>> {
        let tx = self.conn.transaction()?;
        Ok(InsertBatch {
            tx,
            report: BatchReport::default(),
        })
    }

    /// Attempts every row of `table`, then commits once.
    pub fn insert_table(&mut self, table: &Table) -> AppResult<BatchReport> {
        info!("Inserting {} rows into {}", table.row_count(), TABLE_NAME);
        let mut batch = self.begin_batch()?;
        for row in 0..table.row_count() {
            if row % 100 == 0 {
                debug!("Processing row {}/{}", row, table.row_count());
            }
            batch.attempt(table, row);
        }
        let report = batch.commit()?;

        info!(
            attempted = report.attempted,
            inserted = report.inserted,
            failed = report.failed,
            "Data insertion completed"
        );
        Ok(report)
    }

    pub fn row_count(&self) -> AppResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", TABLE_NAME);
        let count = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Open transaction collecting per-row outcomes. Dropping it without
/// [`InsertBatch::commit`] rolls every attempted row back.
pub struct InsertBatch<'conn> {
    tx: Transaction<'conn>,
    report: BatchReport,
}

impl InsertBatch<'_> {
    /// Converts and inserts one cleaned row. Failures are recorded, never raised.
    pub fn attempt(&mut self, table: &Table, row: usize) -> InsertOutcome {
        let result = CrimeRecord::from_row(table, row).and_then(|record| self.insert(&record));
        let outcome = match result {
            Ok(()) => InsertOutcome::Inserted { row },
            Err(e) => {
                warn!("Error inserting record {}: {}", row, e);
                InsertOutcome::Failed {
                    row,
                    reason: e.to_string(),
                }
            }
        };
        self.report.record(&outcome);
        outcome
    }

    pub fn insert(&self, record: &CrimeRecord) -> AppResult<()> {
        debug!("Values being inserted: {:?}", record);
        let mut stmt = self.tx.prepare_cached(INSERT_SQL)?;
        stmt.execute(params![
            record.case_number,
            record.occurred_at,
            record.block,
            record.iucr,
            record.primary_type,
            record.description,
            record.location_description,
            record.arrest,
            record.domestic,
            record.beat,
            record.district,
            record.ward,
            record.community_area,
            record.fbi_code,
            record.x_coordinate,
            record.y_coordinate,
            record.year,
            record.updated_at,
            record.latitude,
            record.longitude,
        ])?;
        Ok(())
    }

    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    pub fn commit(self) -> AppResult<BatchReport> {
        let InsertBatch { tx, report } = self;
        tx.commit().map_err(|e| {
            error!("Failed to commit batch: {}", e);
            AppError::DatabaseError(e.to_string())
        })?;
        Ok(report)
    }
}
