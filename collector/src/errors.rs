use thiserror::Error;
use wire::DecodeError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error for {var}: {message}")]
    Config { var: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single ingestion. Never fatal to the server.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Malformed payload: {0}")]
    Malformed(#[from] DecodeError),
}
