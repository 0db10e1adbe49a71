//! Error types for partition discovery and verification.

use thiserror::Error;

use crate::record::PartitionRole;

/// Errors that can occur in partition operations.
///
/// Ordinary business findings (a missing required file, a candidate outside
/// the size range) are reported through structured results, not through this
/// type. These variants cover rule violations that must stop the caller and
/// true I/O faults.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// No partition was found for the requested role
    #[error("No {role} partition found")]
    NotFound { role: PartitionRole },

    /// A role invariant (writability, size) does not hold
    #[error("{role} partition invariant violation: {reason}")]
    InvariantViolation { role: PartitionRole, reason: String },

    /// Manifest digest mismatch or missing manifest-listed file
    #[error("Integrity check failed with {} mismatch(es)", .0.len())]
    IntegrityMismatch(Vec<String>),

    /// Volume enumeration failed entirely
    #[error("Volume enumeration failed: {0}")]
    Enumeration(String),

    /// Manifest missing or structurally invalid
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// I/O fault unrelated to a business check (e.g. device removed mid-scan)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for partition operations.
pub type PartitionResult<T> = Result<T, PartitionError>;
