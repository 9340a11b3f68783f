//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The database URL is wrapped in secrecy::SecretString to prevent log
//! leaks.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Cadence of the periodic analytics refresh.
    pub analytics_refresh: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let analytics_refresh_secs = match std::env::var("ANALYTICS_REFRESH_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                Error::Config(format!("ANALYTICS_REFRESH_SECS is not a number: {raw}"))
            })?,
            Err(_) => 60,
        };

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            analytics_refresh: Duration::from_secs(analytics_refresh_secs),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
