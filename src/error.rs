//! Custom error types for mai-streaming

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ingestion operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A requested column is missing from the source file
    #[error("Schema error in {}: missing field '{field}'", path.display())]
    Schema { path: PathBuf, field: String },

    /// The file could not be decoded (possibly still being written)
    #[error("Read error in {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// The whole bulk call failed to reach the store or was refused outright
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Ingestion cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a file that failed with this error should be picked up again on the next scan.
    ///
    /// Nothing here is marked done on failure, so this only affects how the failure is logged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Http(_)
                | Error::Read { .. }
                | Error::Io(_)
                | Error::Arrow(_)
                | Error::Schema { .. }
                | Error::Cancelled
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Other(format!("worker task failed: {}", err))
    }
}

/// Result type alias for mai-streaming
pub type Result<T> = std::result::Result<T, Error>;
