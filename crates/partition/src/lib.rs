//! Partition discovery and verification for the Orchard dual-partition device.
//!
//! The device ships with a read-only system partition and a writable data
//! partition, each identified by a marker file at its volume root. This crate
//! discovers mounted volumes, classifies them by role, enforces the
//! writability and size invariants for each role, and verifies partition
//! content against a manufacturing manifest.

pub mod enumerate;
pub mod error;
pub mod integrity;
pub mod locator;
pub mod probe;
pub mod record;
pub mod verify;

pub use enumerate::{platform_enumerator, FallbackEnumerator, NativeEnumerator, VolumeEnumerator, VolumeInfo};
pub use error::{PartitionError, PartitionResult};
pub use integrity::{hash_file, verify_integrity, IntegrityReport, Manifest, ManifestEntry};
pub use locator::{PartitionLocator, ScanOutcome, ScanState};
pub use record::{PartitionRecord, PartitionRole};
pub use verify::{HealthReport, HealthStatus, VerificationReport, Verifier};
