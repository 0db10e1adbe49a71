//! In-memory session, failed-attempt, and lockout registries.
//!
//! Each registry guards its own map with its own lock — never one global
//! lock — so a slow partition scan or store write cannot stall an
//! unrelated login path.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::SessionToken;

/// Lock-guarded table of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionToken>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: SessionToken) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.token_id.clone(), session);
    }

    /// Validate a token at `now`, advancing its activity window on success.
    ///
    /// An expired token is removed and returned in the `Err` side so the
    /// caller can record its reclamation. `last_activity` moves to `now`
    /// and the expiry extends by `idle_millis`, but never past
    /// `created_at + max_lifetime_millis`.
    pub fn validate_and_touch(
        &self,
        token_id: &str,
        now: u64,
        idle_millis: u64,
        max_lifetime_millis: u64,
    ) -> Result<Option<SessionToken>, SessionToken> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions
            .get(token_id)
            .map(|s| s.is_expired(now))
            .unwrap_or(false)
        {
            if let Some(expired) = sessions.remove(token_id) {
                return Err(expired);
            }
        }
        let Some(session) = sessions.get_mut(token_id) else {
            return Ok(None);
        };
        session.last_activity = session.last_activity.max(now);
        let absolute_cap = session.created_at + max_lifetime_millis;
        session.expires_at = (now + idle_millis).min(absolute_cap).max(session.created_at);
        Ok(Some(session.clone()))
    }

    /// Remove a session, returning it if it was present.
    pub fn remove(&self, token_id: &str) -> Option<SessionToken> {
        self.sessions.lock().unwrap().remove(token_id)
    }

    /// Remove every session past expiry at `now`.
    pub fn remove_expired(&self, now: u64) -> Vec<SessionToken> {
        let mut sessions = self.sessions.lock().unwrap();
        let expired_ids: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        expired_ids
            .into_iter()
            .filter_map(|id| sessions.remove(&id))
            .collect()
    }

    /// Snapshot of all live sessions (flush on teardown).
    pub fn snapshot(&self) -> Vec<SessionToken> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lock-guarded table of consecutive failed attempts per identifier.
#[derive(Debug, Default)]
pub struct FailedAttempts {
    counts: Mutex<HashMap<String, u32>>,
}

impl FailedAttempts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more failure; returns the new count.
    pub fn record(&self, identifier: &str) -> u32 {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(identifier.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get(&self, identifier: &str) -> u32 {
        *self.counts.lock().unwrap().get(identifier).unwrap_or(&0)
    }

    /// Reset the counter; only a successful authentication does this.
    pub fn clear(&self, identifier: &str) {
        self.counts.lock().unwrap().remove(identifier);
    }

    /// Seed a counter from persisted state at startup.
    pub fn restore(&self, identifier: &str, count: u32) {
        if count > 0 {
            self.counts
                .lock()
                .unwrap()
                .insert(identifier.to_string(), count);
        }
    }
}

/// Lock-guarded table of active lockouts per identifier.
#[derive(Debug, Default)]
pub struct LockoutTable {
    until: Mutex<HashMap<String, u64>>,
}

impl LockoutTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active lockout expiry for an identifier, if one is in force at
    /// `now`. Read-only: repeated calls return the same unchanged value.
    pub fn active_lockout(&self, identifier: &str, now: u64) -> Option<u64> {
        self.until
            .lock()
            .unwrap()
            .get(identifier)
            .copied()
            .filter(|&until| now < until)
    }

    /// Impose a lockout until the given timestamp.
    pub fn lock_until(&self, identifier: &str, until: u64) {
        self.until
            .lock()
            .unwrap()
            .insert(identifier.to_string(), until);
    }

    /// Clear a lockout (successful authentication after expiry).
    pub fn clear(&self, identifier: &str) {
        self.until.lock().unwrap().remove(identifier);
    }
}
