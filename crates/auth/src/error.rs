//! Error types for authentication operations.
//!
//! A wrong password or a locked account is not an error — those outcomes
//! are carried in [`AuthResult`](crate::types::AuthResult) so the caller
//! cannot distinguish them beyond what the result exposes.

use thiserror::Error;

/// Errors that can occur in authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The backing store is temporarily unavailable; retryable
    #[error("Storage unavailable: {0}")]
    Storage(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// Username already registered
    #[error("User already exists: {username}")]
    UserExists { username: String },

    /// No credential for the given user
    #[error("User not found: {user_id}")]
    UserNotFound { user_id: String },

    /// Candidate password fails the configured policy
    #[error("Password policy violation: {reason}")]
    PolicyViolation { reason: String },

    /// Vault failure during hashing or sealing
    #[error("Vault error: {0}")]
    Vault(#[from] orchard_vault::VaultError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// Whether the failed operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Storage(_))
    }
}

impl From<rusqlite::Error> for AuthError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(inner, _) = &e {
            if matches!(
                inner.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) {
                return AuthError::Storage(e.to_string());
            }
        }
        AuthError::Database(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_maps_to_retryable_storage() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let err = AuthError::from(busy);
        assert!(err.is_retryable());

        let other = rusqlite::Error::InvalidQuery;
        assert!(!AuthError::from(other).is_retryable());
    }
}
