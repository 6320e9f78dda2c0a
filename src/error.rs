use std::path::PathBuf;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Write error: {0}")]
    WriteError(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<calamine::Error> for AppError {
    fn from(err: calamine::Error) -> Self {
        AppError::ParseError(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        AppError::WriteError(err.to_string())
    }
}
