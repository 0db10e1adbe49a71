//! Credential and session persistence.
//!
//! Owns the `users` and `sessions` tables of the device database. Access
//! goes through short-lived statements bounded by the connection busy
//! timeout; a busy store surfaces as a retryable error, never a crash.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::error::AuthError;
use crate::types::{Credential, Role, SessionToken};

/// SQLite-backed store for credentials and sessions.
pub struct CredentialStore {
    conn: Mutex<Connection>,
}

impl CredentialStore {
    /// Open or create the store at the given database path.
    pub fn open(db_path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Self, AuthError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(path = %db_path.display(), "Opening credential store");
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;

        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), AuthError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                failed_attempts INTEGER NOT NULL DEFAULT 0,
                lockout_until INTEGER,
                requires_2fa INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS sessions (
                token_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                last_activity INTEGER NOT NULL,
                metadata TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON sessions(expires_at);
            "#,
        )?;
        Ok(())
    }

    /// Insert a new credential. Fails if the username is taken.
    pub fn create_credential(&self, credential: &Credential) -> Result<(), AuthError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            r#"
            INSERT INTO users
                (user_id, username, password_hash, role, created_at,
                 failed_attempts, lockout_until, requires_2fa)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                credential.user_id,
                credential.username,
                credential.password_hash,
                credential.role.as_str(),
                credential.created_at as i64,
                credential.failed_attempts,
                credential.lockout_until.map(|v| v as i64),
                credential.requires_2fa as i64,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AuthError::UserExists {
                    username: credential.username.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a credential by login name.
    pub fn find_by_username(&self, username: &str) -> Result<Option<Credential>, AuthError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, username, password_hash, role, created_at,
                   failed_attempts, lockout_until, requires_2fa
            FROM users WHERE username = ?1
            "#,
        )?;
        let credential = stmt
            .query_row([username], |row| {
                Ok(Credential {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    role: Role::parse(&row.get::<_, String>(3)?).unwrap_or(Role::Parent),
                    created_at: row.get::<_, i64>(4)? as u64,
                    failed_attempts: row.get(5)?,
                    lockout_until: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
                    requires_2fa: row.get::<_, i64>(7)? != 0,
                })
            })
            .optional()?;
        Ok(credential)
    }

    /// Replace a credential's password hash (rehash or password change).
    pub fn update_password_hash(&self, user_id: &str, password_hash: &str) -> Result<(), AuthError> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE users SET password_hash = ?2 WHERE user_id = ?1",
            params![user_id, password_hash],
        )?;
        if updated == 0 {
            return Err(AuthError::UserNotFound {
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    /// Mirror the in-memory attempt/lockout state so restarts keep lockouts.
    pub fn update_attempt_state(
        &self,
        user_id: &str,
        failed_attempts: u32,
        lockout_until: Option<u64>,
    ) -> Result<(), AuthError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE users SET failed_attempts = ?2, lockout_until = ?3 WHERE user_id = ?1",
            params![user_id, failed_attempts, lockout_until.map(|v| v as i64)],
        )?;
        Ok(())
    }

    /// Attempt/lockout state persisted for any user (startup restore).
    pub fn load_attempt_states(&self) -> Result<Vec<(String, u32, Option<u64>)>, AuthError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT username, failed_attempts, lockout_until
            FROM users
            WHERE failed_attempts > 0 OR lockout_until IS NOT NULL
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, Option<i64>>(2)?.map(|v| v as u64),
            ))
        })?;
        let mut states = Vec::new();
        for row in rows {
            states.push(row?);
        }
        Ok(states)
    }

    /// Insert or replace a session row.
    pub fn save_session(&self, session: &SessionToken) -> Result<(), AuthError> {
        let metadata = serde_json::to_string(&session.metadata)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT OR REPLACE INTO sessions
                (token_id, user_id, role, created_at, expires_at, last_activity, metadata)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                session.token_id,
                session.user_id,
                session.role.as_str(),
                session.created_at as i64,
                session.expires_at as i64,
                session.last_activity as i64,
                metadata,
            ],
        )?;
        Ok(())
    }

    /// Delete a session row. Deleting an absent row is not an error.
    pub fn delete_session(&self, token_id: &str) -> Result<(), AuthError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sessions WHERE token_id = ?1", params![token_id])?;
        Ok(())
    }

    /// Load all persisted sessions (startup restore).
    pub fn load_sessions(&self) -> Result<Vec<SessionToken>, AuthError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT token_id, user_id, role, created_at, expires_at, last_activity, metadata
            FROM sessions
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (token_id, user_id, role, created_at, expires_at, last_activity, metadata) = row?;
            sessions.push(SessionToken {
                token_id,
                user_id,
                role: Role::parse(&role).unwrap_or(Role::Parent),
                created_at: created_at as u64,
                expires_at: expires_at as u64,
                last_activity: last_activity as u64,
                metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            });
        }
        Ok(sessions)
    }
}
