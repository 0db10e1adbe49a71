//! Login, session validation, and lockout enforcement.

use rand::RngCore;
use std::sync::Arc;
use tracing::{error, info, warn};

use orchard_core::config::AuthConfig;
use orchard_core::event::{EventBuilder, EventKind, EventSeverity, SecurityEvent};
use orchard_core::{now_millis, AuditLog};
use orchard_vault::CredentialVault;

use crate::error::AuthError;
use crate::registry::{FailedAttempts, LockoutTable, SessionRegistry};
use crate::store::CredentialStore;
use crate::types::{AuthResult, Credential, Role, SessionToken};

/// Authenticates operators and owns the session lifecycle.
///
/// Every authentication failure and lockout is recorded to the audit log
/// before the result is returned. The session, failed-attempt, and lockout
/// tables are independent registries with their own locks.
pub struct SessionAuthenticator {
    store: CredentialStore,
    vault: Arc<CredentialVault>,
    audit: Arc<AuditLog>,
    config: AuthConfig,
    sessions: SessionRegistry,
    attempts: FailedAttempts,
    lockouts: LockoutTable,
}

impl SessionAuthenticator {
    /// Build the authenticator, restoring persisted sessions and lockout
    /// state from the store.
    pub fn new(
        store: CredentialStore,
        vault: Arc<CredentialVault>,
        audit: Arc<AuditLog>,
        config: AuthConfig,
    ) -> Result<Self, AuthError> {
        let authenticator = Self {
            store,
            vault,
            audit,
            config,
            sessions: SessionRegistry::new(),
            attempts: FailedAttempts::new(),
            lockouts: LockoutTable::new(),
        };

        let now = now_millis();
        let mut restored = 0usize;
        for session in authenticator.store.load_sessions()? {
            if session.is_expired(now) {
                let _ = authenticator.store.delete_session(&session.token_id);
            } else {
                authenticator.sessions.insert(session);
                restored += 1;
            }
        }
        for (username, failed_attempts, lockout_until) in
            authenticator.store.load_attempt_states()?
        {
            authenticator.attempts.restore(&username, failed_attempts);
            if let Some(until) = lockout_until {
                if now < until {
                    authenticator.lockouts.lock_until(&username, until);
                }
            }
        }
        info!(sessions = restored, "Session authenticator ready");
        Ok(authenticator)
    }

    /// Register a new operator credential.
    ///
    /// The password must satisfy the configured policy; `personal` carries
    /// context the password must not contain (username is always included).
    pub fn create_credential(
        &self,
        username: &str,
        password: &str,
        role: Role,
        personal: &[&str],
        requires_2fa: bool,
    ) -> Result<Credential, AuthError> {
        let mut context: Vec<&str> = Vec::with_capacity(personal.len() + 1);
        context.push(username);
        context.extend_from_slice(personal);

        let verdict = self.vault.validate_policy(password, &context);
        if !verdict.ok {
            return Err(AuthError::PolicyViolation {
                reason: verdict.reason,
            });
        }

        let credential = Credential {
            user_id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: self.vault.hash_password(password)?,
            role,
            created_at: now_millis(),
            failed_attempts: 0,
            lockout_until: None,
            requires_2fa,
        };
        self.store.create_credential(&credential)?;
        info!(username, role = role.as_str(), "Credential created");
        Ok(credential)
    }

    /// Authenticate an operator.
    ///
    /// The lockout table is consulted first, read-only: a locked account
    /// returns immediately with the unchanged expiry and no counter
    /// mutation. Otherwise the password is verified through the vault; a
    /// success clears the failed-attempt counter and mints a session, a
    /// failure increments it and locks the account when the configured
    /// maximum is reached.
    pub fn login(&self, username: &str, password: &str) -> Result<AuthResult, AuthError> {
        let now = now_millis();

        if let Some(until) = self.lockouts.active_lockout(username, now) {
            self.record_event(
                EventBuilder::new(EventKind::LoginFailure)
                    .severity(EventSeverity::Warning)
                    .user(username)
                    .detail("reason", "account_locked")
                    .build(),
            );
            return Ok(AuthResult::locked(until));
        }

        let credential = self.store.find_by_username(username)?;
        let verified_credential = credential
            .as_ref()
            .filter(|c| self.vault.verify_password(password, &c.password_hash));

        if let Some(credential) = verified_credential {
            self.attempts.clear(username);
            self.lockouts.clear(username);
            if let Err(e) = self.store.update_attempt_state(&credential.user_id, 0, None) {
                warn!(username, error = %e, "Failed to persist cleared attempt state");
            }
            self.rehash_if_needed(credential, password);

            let session = self.mint_session(credential, now);
            self.sessions.insert(session.clone());
            if let Err(e) = self.store.save_session(&session) {
                warn!(username, error = %e, "Failed to persist session");
            }
            self.record_event(
                EventBuilder::new(EventKind::LoginSuccess)
                    .user(&credential.user_id)
                    .detail("token_id", session.token_id.clone())
                    .build(),
            );
            return Ok(AuthResult::succeeded(session, credential.requires_2fa));
        }

        // Failures count against the identifier whether or not it names a
        // real account, so the two cases stay indistinguishable outside.
        let count = self.attempts.record(username);
        let max = self.config.max_failed_attempts;

        if count >= max {
            let until = now + self.config.lockout_secs * 1_000;
            self.lockouts.lock_until(username, until);
            if let Some(c) = &credential {
                if let Err(e) = self
                    .store
                    .update_attempt_state(&c.user_id, count, Some(until))
                {
                    warn!(username, error = %e, "Failed to persist lockout state");
                }
            }
            self.record_event(
                EventBuilder::new(EventKind::Lockout)
                    .severity(EventSeverity::Critical)
                    .user(username)
                    .detail("locked_until", until)
                    .build(),
            );
            return Ok(AuthResult::locked(until));
        }

        if let Some(c) = &credential {
            if let Err(e) = self.store.update_attempt_state(&c.user_id, count, None) {
                warn!(username, error = %e, "Failed to persist attempt state");
            }
        }
        let remaining = max.saturating_sub(count);
        self.record_event(
            EventBuilder::new(EventKind::LoginFailure)
                .severity(EventSeverity::Warning)
                .user(username)
                .detail("remaining_attempts", remaining)
                .build(),
        );
        Ok(AuthResult::rejected(remaining))
    }

    /// Validate a session token.
    ///
    /// Returns `None` for absent or expired tokens. A live token's
    /// `last_activity` advances to now, extending the rolling idle window
    /// but never past the absolute maximum lifetime from creation.
    pub fn validate(&self, token_id: &str) -> Option<SessionToken> {
        let now = now_millis();
        match self.sessions.validate_and_touch(
            token_id,
            now,
            self.config.session_idle_secs * 1_000,
            self.config.session_max_lifetime_secs * 1_000,
        ) {
            Ok(live) => live,
            Err(expired) => {
                if let Err(e) = self.store.delete_session(&expired.token_id) {
                    warn!(token_id, error = %e, "Failed to delete expired session");
                }
                self.record_event(
                    EventBuilder::new(EventKind::SessionExpired)
                        .user(&expired.user_id)
                        .detail("token_id", expired.token_id)
                        .build(),
                );
                None
            }
        }
    }

    /// Revoke a session. Idempotent: revoking an absent token is not an error.
    pub fn revoke(&self, token_id: &str) {
        if let Some(session) = self.sessions.remove(token_id) {
            if let Err(e) = self.store.delete_session(token_id) {
                warn!(token_id, error = %e, "Failed to delete revoked session");
            }
            self.record_event(
                EventBuilder::new(EventKind::Logout)
                    .user(&session.user_id)
                    .detail("token_id", session.token_id)
                    .build(),
            );
        }
    }

    /// Remove every expired session; called by the background sweep.
    pub fn expire_sessions(&self, now: u64) -> usize {
        let reclaimed = self.sessions.remove_expired(now);
        for session in &reclaimed {
            if let Err(e) = self.store.delete_session(&session.token_id) {
                warn!(token_id = %session.token_id, error = %e, "Failed to delete swept session");
            }
            self.record_event(
                EventBuilder::new(EventKind::SessionExpired)
                    .user(&session.user_id)
                    .detail("token_id", session.token_id.clone())
                    .detail("reclaimed_by", "sweep")
                    .build(),
            );
        }
        reclaimed.len()
    }

    /// Persist all live sessions. Part of the flush-then-stop teardown.
    pub fn flush(&self) -> Result<(), AuthError> {
        for session in self.sessions.snapshot() {
            self.store.save_session(&session)?;
        }
        Ok(())
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Sweep interval from the active configuration.
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.sweep_interval_secs)
    }

    fn mint_session(&self, credential: &Credential, now: u64) -> SessionToken {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let idle = self.config.session_idle_secs * 1_000;
        let max_lifetime = self.config.session_max_lifetime_secs * 1_000;
        SessionToken {
            token_id: hex::encode(raw),
            user_id: credential.user_id.clone(),
            role: credential.role,
            created_at: now,
            expires_at: now + idle.min(max_lifetime),
            last_activity: now,
            metadata: serde_json::Map::new(),
        }
    }

    fn rehash_if_needed(&self, credential: &Credential, password: &str) {
        if !self.vault.needs_rehash(&credential.password_hash) {
            return;
        }
        match self.vault.hash_password(password) {
            Ok(new_hash) => {
                if let Err(e) = self.store.update_password_hash(&credential.user_id, &new_hash) {
                    warn!(user_id = %credential.user_id, error = %e, "Failed to persist rehash");
                    return;
                }
                self.record_event(
                    EventBuilder::new(EventKind::PasswordChanged)
                        .user(&credential.user_id)
                        .detail("reason", "rehash")
                        .build(),
                );
                info!(user_id = %credential.user_id, "Password silently re-hashed with current parameters");
            }
            Err(e) => warn!(user_id = %credential.user_id, error = %e, "Rehash failed"),
        }
    }

    /// Append to the audit log. A store fault here is logged but never
    /// raised into the authentication path; the log's own fallback channel
    /// has already been tried.
    fn record_event(&self, event: SecurityEvent) {
        if let Err(e) = self.audit.append(&event) {
            error!(kind = event.kind.as_str(), error = %e, "Audit event could not be recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchard_core::audit::EventFilter;
    use orchard_core::config::PolicyConfig;
    use orchard_vault::{MasterKey, PasswordHasherConfig};
    use tempfile::TempDir;

    const GOOD_PASSWORD: &str = "Mint-Orchard!9Harvest";

    fn test_config() -> AuthConfig {
        AuthConfig {
            max_failed_attempts: 5,
            lockout_secs: 900,
            session_idle_secs: 1800,
            session_max_lifetime_secs: 86_400,
            sweep_interval_secs: 300,
        }
    }

    fn build(dir: &TempDir) -> (SessionAuthenticator, Arc<AuditLog>) {
        let store = CredentialStore::open(dir.path().join("access.db"), 1_000).unwrap();
        let vault = Arc::new(
            CredentialVault::with_master_key(PolicyConfig::default(), MasterKey::generate())
                .with_hasher_config(PasswordHasherConfig {
                    memory_kib: 8 * 1024,
                    iterations: 1,
                    parallelism: 1,
                }),
        );
        let audit = Arc::new(
            AuditLog::open(
                dir.path().join("audit.db"),
                dir.path().join("fallback.jsonl"),
                1_000,
            )
            .unwrap(),
        );
        let authenticator =
            SessionAuthenticator::new(store, vault, audit.clone(), test_config()).unwrap();
        (authenticator, audit)
    }

    #[test]
    fn test_create_credential_enforces_policy() {
        let dir = TempDir::new().unwrap();
        let (auth, _) = build(&dir);

        let err = auth
            .create_credential("alex", "short", Role::Parent, &[], false)
            .unwrap_err();
        assert!(matches!(err, AuthError::PolicyViolation { .. }));

        // The username itself is rejected inside the password
        let err = auth
            .create_credential("alexander", "Alexander!2031-Zq", Role::Parent, &[], false)
            .unwrap_err();
        assert!(matches!(err, AuthError::PolicyViolation { .. }));

        auth.create_credential("alex", GOOD_PASSWORD, Role::Parent, &[], false)
            .unwrap();
    }

    #[test]
    fn test_login_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let (auth, _) = build(&dir);
        auth.create_credential("alex", GOOD_PASSWORD, Role::Parent, &[], false)
            .unwrap();

        let result = auth.login("alex", GOOD_PASSWORD).unwrap();
        assert!(result.success);
        let session = result.session.unwrap();
        assert!(session.expires_at >= session.created_at);

        let result = auth.login("alex", "Wrong-Password!1x").unwrap();
        assert!(!result.success);
        assert_eq!(result.remaining_attempts, Some(4));

        // Unknown usernames produce the same shape of failure
        let result = auth.login("ghost", "Wrong-Password!1x").unwrap();
        assert!(!result.success);
        assert_eq!(result.remaining_attempts, Some(4));
    }

    #[test]
    fn test_lockout_after_max_failures() {
        let dir = TempDir::new().unwrap();
        let (auth, audit) = build(&dir);
        auth.create_credential("alex", GOOD_PASSWORD, Role::Parent, &[], false)
            .unwrap();

        let before = now_millis();
        let mut last = None;
        for _ in 0..5 {
            last = Some(auth.login("alex", "Wrong-Password!1x").unwrap());
        }
        let fifth = last.unwrap();
        let locked_until = fifth.locked_until.expect("fifth failure locks");
        let expected = before + 900 * 1_000;
        assert!(locked_until >= expected && locked_until < expected + 5_000);

        // A sixth attempt returns the same unchanged expiry, even with the
        // correct password
        let sixth = auth.login("alex", GOOD_PASSWORD).unwrap();
        assert!(!sixth.success);
        assert_eq!(sixth.locked_until, Some(locked_until));

        let lockouts = audit
            .query(&EventFilter {
                kind: Some(EventKind::Lockout),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(lockouts.len(), 1);
    }

    #[test]
    fn test_counter_resets_only_on_success() {
        let dir = TempDir::new().unwrap();
        let (auth, _) = build(&dir);
        auth.create_credential("alex", GOOD_PASSWORD, Role::Parent, &[], false)
            .unwrap();

        for _ in 0..3 {
            auth.login("alex", "Wrong-Password!1x").unwrap();
        }
        let result = auth.login("alex", GOOD_PASSWORD).unwrap();
        assert!(result.success);

        // Counter is back to zero: a fresh failure reports max-1 remaining
        let result = auth.login("alex", "Wrong-Password!1x").unwrap();
        assert_eq!(result.remaining_attempts, Some(4));

        let stored = auth.store.find_by_username("alex").unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 1);
    }

    #[test]
    fn test_validate_touches_and_revoke_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (auth, _) = build(&dir);
        auth.create_credential("alex", GOOD_PASSWORD, Role::Parent, &[], false)
            .unwrap();

        let session = auth.login("alex", GOOD_PASSWORD).unwrap().session.unwrap();
        let validated = auth.validate(&session.token_id).unwrap();
        assert!(validated.last_activity >= session.last_activity);
        assert!(validated.expires_at <= validated.created_at + 86_400 * 1_000);

        auth.revoke(&session.token_id);
        assert!(auth.validate(&session.token_id).is_none());
        // Revoking again is not an error
        auth.revoke(&session.token_id);
    }

    #[test]
    fn test_expire_sessions_reclaims_and_audits() {
        let dir = TempDir::new().unwrap();
        let (auth, audit) = build(&dir);
        auth.create_credential("alex", GOOD_PASSWORD, Role::Parent, &[], false)
            .unwrap();
        let session = auth.login("alex", GOOD_PASSWORD).unwrap().session.unwrap();

        // Far past any expiry
        let removed = auth.expire_sessions(session.expires_at + 1);
        assert_eq!(removed, 1);
        assert_eq!(auth.session_count(), 0);

        let expired = audit
            .query(&EventFilter {
                kind: Some(EventKind::SessionExpired),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(expired.len(), 1);
    }

    #[test]
    fn test_lockout_survives_restart() {
        let dir = TempDir::new().unwrap();
        {
            let (auth, _) = build(&dir);
            auth.create_credential("alex", GOOD_PASSWORD, Role::Parent, &[], false)
                .unwrap();
            for _ in 0..5 {
                auth.login("alex", "Wrong-Password!1x").unwrap();
            }
        }
        // A fresh authenticator over the same store still sees the lockout
        let (auth, _) = build(&dir);
        let result = auth.login("alex", GOOD_PASSWORD).unwrap();
        assert!(!result.success);
        assert!(result.locked_until.is_some());
    }

    #[test]
    fn test_every_failure_is_audited_before_return() {
        let dir = TempDir::new().unwrap();
        let (auth, audit) = build(&dir);
        auth.create_credential("alex", GOOD_PASSWORD, Role::Parent, &[], false)
            .unwrap();

        auth.login("alex", "Wrong-Password!1x").unwrap();
        auth.login("alex", "Wrong-Password!2x").unwrap();

        let failures = audit
            .query(&EventFilter {
                kind: Some(EventKind::LoginFailure),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(failures.len(), 2);
        assert_eq!(
            failures[0].details.get("remaining_attempts").and_then(|v| v.as_u64()),
            Some(3)
        );
    }
}
