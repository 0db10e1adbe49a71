//! Core functionality for the Orchard device trust and access layer.
//!
//! This crate provides the fundamental types shared across the Orchard
//! workspace: configuration, the error taxonomy, the security-event schema,
//! the append-only audit store, and logging initialization.

pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;

pub use audit::{AuditLog, AuditMetrics, EventFilter};
pub use clock::now_millis;
pub use config::{
    AuthConfig, DeviceConfig, PartitionConfig, PolicyConfig, StorageConfig,
};
pub use error::{CoreError, Result};
pub use event::{EventBuilder, EventKind, EventSeverity, SecurityEvent};
