//! Error types for the binding store

use std::path::PathBuf;
use thiserror::Error;

/// Binding store error type
#[derive(Error, Debug)]
pub enum Error {
    /// Sled database error
    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored data could not be understood
    #[error("Corrupt store at {path:?}: {reason}")]
    Corrupt {
        /// Where the store lives
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
