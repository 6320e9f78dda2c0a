use std::fmt;
use std::path::PathBuf;

use dotenvy::dotenv;
use serde::Deserialize;

use crate::error::{AppError, AppResult};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 3306;
const DEFAULT_USER: &str = "root";
const DEFAULT_DATABASE: &str = "crime_data";
const DEFAULT_SOURCE_PATH: &str = "Crime_Data.xlsx";
const DEFAULT_DESTINATION_PATH: &str = "cleaned_chicago_crime.xlsx";

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DatabaseConfig {
    /// File the embedded engine opens for `database`.
    pub fn sqlite_path(&self) -> PathBuf {
        if self.database == ":memory:" || PathBuf::from(&self.database).extension().is_some() {
            PathBuf::from(&self.database)
        } else {
            PathBuf::from(format!("{}.db", self.database))
        }
    }

    /// `user@host:port/database`, never including the password.
    pub fn target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
}

impl Config {
    pub fn new() -> AppResult<Self> {
        // Load .env file first
        dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = match lookup("CRIME_DB_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                AppError::InvalidInput(format!("CRIME_DB_PORT '{}' is not a valid port: {}", raw, e))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Config {
            database: DatabaseConfig {
                host: get("CRIME_DB_HOST", DEFAULT_HOST),
                port,
                user: get("CRIME_DB_USER", DEFAULT_USER),
                password: get("CRIME_DB_PASSWORD", ""),
                database: get("CRIME_DB_NAME", DEFAULT_DATABASE),
            },
            source_path: PathBuf::from(get("CRIME_SOURCE_PATH", DEFAULT_SOURCE_PATH)),
            destination_path: PathBuf::from(get("CRIME_DESTINATION_PATH", DEFAULT_DESTINATION_PATH)),
        })
    }
}
