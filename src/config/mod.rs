//! Process settings from environment variables, plus the live
//! configuration store and its flat-file persistence.
//!
//! Settings load once at startup and fail fast on malformed values.

pub mod persist;
pub mod store;

pub use store::{ConfigStore, EditOutcome, WORKERS_KEY};

use crate::error::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub listen: SocketAddr,
    pub config_path: PathBuf,
    pub shrink_retry: Duration,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let listen = optional_var("CALCQ_LISTEN")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| Error::Config(format!("CALCQ_LISTEN is not a socket address: {e}")))?;

        let shrink_retry = match optional_var("CALCQ_SHRINK_RETRY_MS") {
            Some(raw) => Duration::from_millis(raw.parse().map_err(|e| {
                Error::Config(format!("CALCQ_SHRINK_RETRY_MS is not a millisecond count: {e}"))
            })?),
            None => Duration::from_millis(10),
        };

        Ok(Self {
            listen,
            config_path: optional_var("CALCQ_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config.csv")),
            shrink_retry,
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
