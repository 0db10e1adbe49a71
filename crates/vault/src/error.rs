//! Error types for vault operations.

use thiserror::Error;

/// Errors that can occur in credential vault operations.
///
/// Policy rejections are not errors — they are structured verdicts — and a
/// wrong password is a plain `false` from verification. These variants
/// cover cryptographic and key-storage faults.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Password hashing failed
    #[error("Hashing error: {0}")]
    Hash(String),

    /// Authenticated encryption or decryption failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Master key file missing, malformed, or unwritable
    #[error("Key store error: {0}")]
    KeyStore(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;
