//! Error types for signage-player
//!
//! Module-specific error type built with thiserror.

use thiserror::Error;

/// Main error type for signage-player
#[derive(Error, Debug)]
pub enum Error {
    /// Shared-library errors that carry no more specific meaning here
    #[error(transparent)]
    Common(signage_common::Error),

    /// Local database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store contract violations and backend-independent store failures
    #[error("Store error: {0}")]
    Store(String),

    /// Remote backend request failed (network, HTTP status, permission)
    #[error("Remote backend error: {0}")]
    Remote(String),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Malformed caller input, rejected before any write
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<signage_common::Error> for Error {
    fn from(e: signage_common::Error) -> Self {
        match e {
            signage_common::Error::InvalidInput(msg) => Error::InvalidInput(msg),
            signage_common::Error::NotFound(msg) => Error::NotFound(msg),
            signage_common::Error::Database(e) => Error::Database(e),
            other => Error::Common(other),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Remote(e.to_string())
    }
}

/// Convenience Result type using signage-player Error
pub type Result<T> = std::result::Result<T, Error>;
