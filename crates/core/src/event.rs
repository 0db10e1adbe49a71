//! Security-event schema for the Orchard access layer.
//!
//! Provides standardized event types for authentication outcomes, partition
//! verification, and device trust decisions. All events are timestamped and
//! carry user attribution where applicable.

use serde::{Deserialize, Serialize};

use crate::clock::now_millis;

/// Severity level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Informational event
    Info,
    /// Warning condition
    Warning,
    /// Error condition
    Error,
    /// Critical security event
    Critical,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSeverity::Info => "info",
            EventSeverity::Warning => "warning",
            EventSeverity::Error => "error",
            EventSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(EventSeverity::Info),
            "warning" => Some(EventSeverity::Warning),
            "error" => Some(EventSeverity::Error),
            "critical" => Some(EventSeverity::Critical),
            _ => None,
        }
    }
}

/// Kind of security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Successful login
    LoginSuccess,
    /// Failed login attempt
    LoginFailure,
    /// Account locked after repeated failures
    Lockout,
    /// Session revoked by the operator
    Logout,
    /// Session reclaimed by the expiry sweep
    SessionExpired,
    /// Password re-hashed or changed
    PasswordChanged,
    /// Partition verification passed
    PartitionVerified,
    /// Partition verification failed
    PartitionVerificationFailed,
    /// Manifest digest mismatch or missing required file
    IntegrityMismatch,
    /// Device token validated successfully
    DeviceTokenAccepted,
    /// Device token rejected
    DeviceTokenRejected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LoginSuccess => "auth.login_success",
            EventKind::LoginFailure => "auth.login_failure",
            EventKind::Lockout => "auth.lockout",
            EventKind::Logout => "auth.logout",
            EventKind::SessionExpired => "auth.session_expired",
            EventKind::PasswordChanged => "auth.password_changed",
            EventKind::PartitionVerified => "partition.verified",
            EventKind::PartitionVerificationFailed => "partition.verification_failed",
            EventKind::IntegrityMismatch => "partition.integrity_mismatch",
            EventKind::DeviceTokenAccepted => "trust.token_accepted",
            EventKind::DeviceTokenRejected => "trust.token_rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auth.login_success" => Some(EventKind::LoginSuccess),
            "auth.login_failure" => Some(EventKind::LoginFailure),
            "auth.lockout" => Some(EventKind::Lockout),
            "auth.logout" => Some(EventKind::Logout),
            "auth.session_expired" => Some(EventKind::SessionExpired),
            "auth.password_changed" => Some(EventKind::PasswordChanged),
            "partition.verified" => Some(EventKind::PartitionVerified),
            "partition.verification_failed" => Some(EventKind::PartitionVerificationFailed),
            "partition.integrity_mismatch" => Some(EventKind::IntegrityMismatch),
            "trust.token_accepted" => Some(EventKind::DeviceTokenAccepted),
            "trust.token_rejected" => Some(EventKind::DeviceTokenRejected),
            _ => None,
        }
    }
}

/// A single security-relevant event. Append-only once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Unique event identifier
    pub event_id: String,
    /// Event kind
    pub kind: EventKind,
    /// User that triggered the event (if applicable)
    pub user_id: Option<String>,
    /// Timestamp (Unix epoch milliseconds)
    pub timestamp: u64,
    /// Event severity
    pub severity: EventSeverity,
    /// Structured details
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Builder for creating security events.
pub struct EventBuilder {
    event: SecurityEvent,
}

impl EventBuilder {
    /// Create a new event builder.
    pub fn new(kind: EventKind) -> Self {
        Self {
            event: SecurityEvent {
                event_id: uuid::Uuid::new_v4().to_string(),
                kind,
                user_id: None,
                timestamp: now_millis(),
                severity: EventSeverity::Info,
                details: serde_json::Map::new(),
            },
        }
    }

    /// Set the severity.
    pub fn severity(mut self, severity: EventSeverity) -> Self {
        self.event.severity = severity;
        self
    }

    /// Attribute the event to a user.
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.event.user_id = Some(user_id.into());
        self
    }

    /// Add a detail entry.
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.event.details.insert(key.into(), value.into());
        self
    }

    /// Build the event.
    pub fn build(self) -> SecurityEvent {
        self.event
    }
}
