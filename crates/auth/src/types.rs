//! Credential, session, and authentication-result types.

use serde::{Deserialize, Serialize};

/// Operator role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Parent,
    Educator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Educator => "educator",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "parent" => Some(Role::Parent),
            "educator" => Some(Role::Educator),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// A stored operator credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Stable user identifier
    pub user_id: String,
    /// Login name, unique per device
    pub username: String,
    /// Self-describing encoded password hash
    pub password_hash: String,
    /// Operator role
    pub role: Role,
    /// Creation timestamp (epoch milliseconds)
    pub created_at: u64,
    /// Consecutive failed login attempts; reset only by a successful login
    pub failed_attempts: u32,
    /// Active lockout expiry (epoch milliseconds), if any
    pub lockout_until: Option<u64>,
    /// Whether this credential additionally requires a second factor
    pub requires_2fa: bool,
}

/// An issued session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    /// Opaque session identifier handed to the caller
    pub token_id: String,
    /// Owning user
    pub user_id: String,
    /// Role captured at login time
    pub role: Role,
    /// Creation timestamp (epoch milliseconds)
    pub created_at: u64,
    /// Expiry timestamp; never precedes `created_at`
    pub expires_at: u64,
    /// Last observed activity; only moves forward
    pub last_activity: u64,
    /// Caller-supplied metadata
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SessionToken {
    /// Whether the session is past its expiry at `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// Outcome of a login attempt.
///
/// Failures are deliberately generic: a wrong password and an unknown
/// username produce identical results, and a locked account exposes only
/// the lockout expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResult {
    pub success: bool,
    /// Present on success
    pub session: Option<SessionToken>,
    /// Whether a second factor is still required to complete the login
    pub requires_2fa: bool,
    /// Attempts left before lockout; present on ordinary failure
    pub remaining_attempts: Option<u32>,
    /// Lockout expiry (epoch milliseconds); present when locked
    pub locked_until: Option<u64>,
    /// Generic, user-presentable message
    pub message: String,
}

impl AuthResult {
    pub fn succeeded(session: SessionToken, requires_2fa: bool) -> Self {
        Self {
            success: true,
            session: Some(session),
            requires_2fa,
            remaining_attempts: None,
            locked_until: None,
            message: "Login successful".to_string(),
        }
    }

    pub fn rejected(remaining_attempts: u32) -> Self {
        Self {
            success: false,
            session: None,
            requires_2fa: false,
            remaining_attempts: Some(remaining_attempts),
            locked_until: None,
            message: format!(
                "Invalid username or password ({remaining_attempts} attempt(s) remaining)"
            ),
        }
    }

    pub fn locked(locked_until: u64) -> Self {
        Self {
            success: false,
            session: None,
            requires_2fa: false,
            remaining_attempts: None,
            locked_until: Some(locked_until),
            message: "Account temporarily locked. Try again later".to_string(),
        }
    }
}
