pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{CrimeRecord, Table, Value};
pub use services::cleaner::{CleanSummary, DataCleaner};
pub use services::db_loader::{BatchReport, DbLoader, InsertOutcome};
pub use services::excel::{ExcelLoader, ExcelWriter};
