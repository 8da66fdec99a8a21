//! Runtime configuration from environment variables (and `.env` if present).

use crate::period::Period;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Per-device session file, the stand-in for browser storage.
    pub device_state_path: PathBuf,
    /// File backing the in-process room/check-in store.
    pub backend_data_path: PathBuf,
    pub period: Period,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid TRACKED_PERIOD {0:?}, expected YYYY-MM")]
    InvalidPeriod(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let period = match env::var("TRACKED_PERIOD") {
            Ok(raw) => Period::parse(&raw).ok_or(ConfigError::InvalidPeriod(raw))?,
            Err(_) => Period::sober_february(),
        };

        Ok(Self {
            port: env::var("PORT")
                .ok()
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(8080),
            device_state_path: env::var("APP_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/devices.json")),
            backend_data_path: env::var("BACKEND_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/backend.json")),
            period,
        })
    }
}
