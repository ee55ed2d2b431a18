use std::env;
use std::str::FromStr;

use compsync_common::error::{CompsyncError, CompsyncResult};
use serde::Deserialize;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:8080";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    /// Loads `.env` file if present, then reads required vars.
    pub fn from_env() -> CompsyncResult<Self> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();

        let cors_origins = get_var_or("CORS_ORIGINS", DEFAULT_CORS_ORIGINS)
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url: get_var("DATABASE_URL")?,
            host: get_var_or("HOST", "0.0.0.0"),
            port: get_parsed_or("PORT", 8000)?,
            log_level: get_var_or("LOG_LEVEL", "info"),
            cors_origins,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn get_var(key: &str) -> CompsyncResult<String> {
    env::var(key).map_err(|_| CompsyncError::Config(format!("{key} is required but not set")))
}

pub fn get_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse `key` when set; a present but malformed value is an error, not a silent default.
pub fn get_parsed_or<T>(key: &str, default: T) -> CompsyncResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CompsyncError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}
