use crate::errors::{Error, Result};
use std::env;
use std::str::FromStr;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_BATCH_TIMEOUT_MS: u64 = 500;
const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;
// Three bound parameters per row; SQLite allows 999 per statement on older builds
const MAX_BATCH_SIZE: usize = 333;

/// Collector settings, read from the environment:
///
/// - `HTTP_ADDR` (default `0.0.0.0:8080`)
/// - `DATABASE_URL` (optional, e.g. `sqlite://readings.db`; unset disables history)
/// - `HISTORY_BATCH_SIZE` (default 100)
/// - `HISTORY_BATCH_TIMEOUT_MS` (default 500)
/// - `CHANNEL_CAPACITY` (default 10000)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub http_addr: String,
    pub database_url: Option<String>,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let http_addr = lookup("HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let batch_size = parse_or(&lookup, "HISTORY_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if batch_size == 0 || batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config {
                var: "HISTORY_BATCH_SIZE",
                message: format!("must be between 1 and {}", MAX_BATCH_SIZE),
            });
        }

        let batch_timeout_ms = parse_or(&lookup, "HISTORY_BATCH_TIMEOUT_MS", DEFAULT_BATCH_TIMEOUT_MS)?;
        if batch_timeout_ms == 0 {
            return Err(Error::Config {
                var: "HISTORY_BATCH_TIMEOUT_MS",
                message: "must be positive".to_string(),
            });
        }

        let channel_capacity = parse_or(&lookup, "CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY)?;
        if channel_capacity == 0 {
            return Err(Error::Config {
                var: "CHANNEL_CAPACITY",
                message: "must be positive".to_string(),
            });
        }

        Ok(Self {
            http_addr,
            database_url,
            batch_size,
            batch_timeout_ms,
            channel_capacity,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| Error::Config {
            var,
            message: format!("{:?}: {}", raw, e),
        }),
    }
}
