//! Background session expiry sweep.
//!
//! A cancellable periodic task on a dedicated thread, explicitly started
//! and stopped. The sweep reclaims sessions past expiry so idle sessions
//! are removed without requiring `validate` traffic.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn};

use orchard_core::now_millis;

use crate::authenticator::SessionAuthenticator;

/// Handle to the running sweep task.
pub struct SessionSweeper {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl SessionSweeper {
    /// Start the sweep on its own thread.
    pub fn start(
        authenticator: Arc<SessionAuthenticator>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("session-sweep".to_string())
            .spawn(move || {
                info!(interval_secs = interval.as_secs(), "Session sweep started");
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            let removed = authenticator.expire_sessions(now_millis());
                            if removed > 0 {
                                info!(removed, "Sweep reclaimed expired sessions");
                            }
                        }
                    }
                }
                info!("Session sweep stopped");
            })?;
        Ok(Self {
            handle: Some(handle),
            shutdown_tx,
        })
    }

    /// Stop the sweep and wait for the thread to exit.
    pub fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Session sweep thread panicked");
            }
        }
    }
}

impl Drop for SessionSweeper {
    fn drop(&mut self) {
        // Cooperative shutdown if stop() was never called; the thread exits
        // on the next tick after the channel disconnects.
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CredentialStore;
    use crate::types::Role;
    use orchard_core::config::{AuthConfig, PolicyConfig};
    use orchard_core::AuditLog;
    use orchard_vault::{CredentialVault, MasterKey, PasswordHasherConfig};
    use tempfile::TempDir;

    fn build(dir: &TempDir, idle_secs: u64) -> Arc<SessionAuthenticator> {
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
        let config = AuthConfig {
            session_idle_secs: idle_secs,
            session_max_lifetime_secs: idle_secs,
            ..Default::default()
        };
        Arc::new(SessionAuthenticator::new(store, vault, audit, config).unwrap())
    }

    #[test]
    fn test_sweep_reclaims_idle_sessions_without_traffic() {
        let dir = TempDir::new().unwrap();
        // Sessions expire immediately (zero-length windows)
        let auth = build(&dir, 0);
        auth.create_credential("alex", "Mint-Orchard!9Harvest", Role::Parent, &[], false)
            .unwrap();
        auth.login("alex", "Mint-Orchard!9Harvest").unwrap();
        assert_eq!(auth.session_count(), 1);

        let sweeper = SessionSweeper::start(auth.clone(), Duration::from_millis(20)).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while auth.session_count() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        sweeper.stop();
        assert_eq!(auth.session_count(), 0);
    }

    #[test]
    fn test_stop_joins_cleanly() {
        let dir = TempDir::new().unwrap();
        let auth = build(&dir, 3600);
        let sweeper = SessionSweeper::start(auth, Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        sweeper.stop();
    }
}
