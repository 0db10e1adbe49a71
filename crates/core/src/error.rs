//! Core error types

use thiserror::Error;

/// Core error type for Orchard.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Backing-store error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing store is temporarily unavailable; the operation may be retried
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl CoreError {
    /// Whether the operation that produced this error may be retried.
    ///
    /// Busy/locked store conditions are transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::StorageUnavailable(_) => true,
            CoreError::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
