//! Append-Only Audit Store
//!
//! This module provides a durable, queryable record of security-relevant
//! events with:
//! - SQLite backend with WAL mode for durability
//! - Strict append-only semantics (pruning by retention is the only other mutation)
//! - Bounded-timeout transactions; busy stores surface as retryable errors
//! - A secondary JSONL channel used when the primary write fails, so the
//!   authentication hot path never loses an event to a store fault
//!
//! # Guarantees
//!
//! - Events are never updated in place
//! - Queries return newest-first
//! - A failed primary write falls back rather than raising into the caller

use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{CoreError, Result};
use crate::event::{EventKind, EventSeverity, SecurityEvent};

/// Query filter for audit events. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Match a specific user
    pub user_id: Option<String>,
    /// Match a specific event kind
    pub kind: Option<EventKind>,
    /// Inclusive lower timestamp bound (epoch milliseconds)
    pub since: Option<u64>,
    /// Inclusive upper timestamp bound (epoch milliseconds)
    pub until: Option<u64>,
    /// Maximum rows returned
    pub limit: Option<usize>,
}

/// Observability counters for the audit store.
#[derive(Debug, Default, Clone)]
pub struct AuditMetrics {
    /// Total events appended through the primary channel
    pub events_appended_total: u64,
    /// Total events diverted to the fallback channel
    pub fallback_writes_total: u64,
    /// Total events removed by retention pruning
    pub events_pruned_total: u64,
}

/// Append-only audit log with SQLite primary storage and a JSONL fallback.
pub struct AuditLog {
    conn: Mutex<Connection>,
    fallback_path: PathBuf,
    metrics: Mutex<AuditMetrics>,
}

impl AuditLog {
    /// Open or create the audit store at the given database path.
    ///
    /// `fallback_path` names the JSONL file used when the primary write
    /// fails. Parent directories are created as needed.
    pub fn open(
        db_path: impl AsRef<Path>,
        fallback_path: impl Into<PathBuf>,
        busy_timeout_ms: u64,
    ) -> Result<Self> {
        let db_path = db_path.as_ref();
        let fallback_path = fallback_path.into();

        info!(path = %db_path.display(), "Opening audit store");

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

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
            fallback_path,
            metrics: Mutex::new(AuditMetrics::default()),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS security_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                user_id TEXT,
                timestamp INTEGER NOT NULL,
                severity TEXT NOT NULL,
                details TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON security_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_user ON security_events(user_id);
            CREATE INDEX IF NOT EXISTS idx_events_kind ON security_events(kind);
            "#,
        )?;
        Ok(())
    }

    /// Append an event.
    ///
    /// A primary-channel failure diverts the event to the JSONL fallback
    /// file instead of raising. An error is returned only when both
    /// channels fail.
    pub fn append(&self, event: &SecurityEvent) -> Result<()> {
        match self.append_primary(event) {
            Ok(()) => {
                self.metrics.lock().unwrap().events_appended_total += 1;
                debug!(event_id = %event.event_id, kind = event.kind.as_str(), "Audit event appended");
                Ok(())
            }
            Err(e) => {
                warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "Primary audit write failed, using fallback channel"
                );
                self.append_fallback(event).map_err(|fb| {
                    error!(
                        event_id = %event.event_id,
                        error = %fb,
                        "Fallback audit write failed, event lost"
                    );
                    CoreError::StorageUnavailable(format!(
                        "audit write failed on both channels: {e}; {fb}"
                    ))
                })?;
                self.metrics.lock().unwrap().fallback_writes_total += 1;
                Ok(())
            }
        }
    }

    fn append_primary(&self, event: &SecurityEvent) -> Result<()> {
        let details = serde_json::to_string(&event.details)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO security_events (event_id, kind, user_id, timestamp, severity, details)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.event_id,
                event.kind.as_str(),
                event.user_id,
                event.timestamp as i64,
                event.severity.as_str(),
                details,
            ],
        )?;
        Ok(())
    }

    fn append_fallback(&self, event: &SecurityEvent) -> Result<()> {
        if let Some(parent) = self.fallback_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.fallback_path)?;
        let line = serde_json::to_string(event)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Query events matching the filter, newest-first.
    pub fn query(&self, filter: &EventFilter) -> Result<Vec<SecurityEvent>> {
        let mut sql = String::from(
            "SELECT event_id, kind, user_id, timestamp, severity, details \
             FROM security_events WHERE 1=1",
        );
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(user_id) = &filter.user_id {
            sql.push_str(" AND user_id = ?");
            values.push(Box::new(user_id.clone()));
        }
        if let Some(kind) = filter.kind {
            sql.push_str(" AND kind = ?");
            values.push(Box::new(kind.as_str().to_string()));
        }
        if let Some(since) = filter.since {
            sql.push_str(" AND timestamp >= ?");
            values.push(Box::new(since as i64));
        }
        if let Some(until) = filter.until {
            sql.push_str(" AND timestamp <= ?");
            values.push(Box::new(until as i64));
        }
        sql.push_str(" ORDER BY seq DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Box::new(limit as i64));
        }

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter().map(|v| v.as_ref())), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (event_id, kind, user_id, timestamp, severity, details) = row?;
            let kind = match EventKind::parse(&kind) {
                Some(k) => k,
                None => {
                    warn!(event_id = %event_id, kind = %kind, "Skipping event with unknown kind");
                    continue;
                }
            };
            let severity = EventSeverity::parse(&severity).unwrap_or(EventSeverity::Info);
            let details = serde_json::from_str(&details).unwrap_or_default();
            events.push(SecurityEvent {
                event_id,
                kind,
                user_id,
                timestamp: timestamp as u64,
                severity,
                details,
            });
        }
        Ok(events)
    }

    /// Remove events older than the retention cutoff. Returns the number removed.
    pub fn prune(&self, cutoff_millis: u64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM security_events WHERE timestamp < ?1",
            params![cutoff_millis as i64],
        )?;
        drop(conn);
        if removed > 0 {
            info!(removed, "Pruned audit events past retention");
            self.metrics.lock().unwrap().events_pruned_total += removed as u64;
        }
        Ok(removed)
    }

    /// Snapshot of the audit metrics counters.
    pub fn metrics(&self) -> AuditMetrics {
        self.metrics.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBuilder;
    use tempfile::TempDir;

    fn open_log(dir: &TempDir) -> AuditLog {
        AuditLog::open(
            dir.path().join("audit.db"),
            dir.path().join("fallback.jsonl"),
            1_000,
        )
        .unwrap()
    }

    fn login_failure(user: &str, ts: u64) -> SecurityEvent {
        let mut event = EventBuilder::new(EventKind::LoginFailure)
            .severity(EventSeverity::Warning)
            .user(user)
            .build();
        event.timestamp = ts;
        event
    }

    #[test]
    fn test_append_and_query_newest_first() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);

        log.append(&login_failure("parent-1", 1_000)).unwrap();
        log.append(&login_failure("parent-1", 2_000)).unwrap();
        log.append(&login_failure("parent-2", 3_000)).unwrap();

        let events = log.query(&EventFilter::default()).unwrap();
        assert_eq!(events.len(), 3);
        assert!(events[0].timestamp >= events[1].timestamp);
        assert_eq!(events[0].user_id, Some("parent-2".to_string()));
    }

    #[test]
    fn test_query_filters() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);

        log.append(&login_failure("parent-1", 1_000)).unwrap();
        log.append(&login_failure("parent-2", 2_000)).unwrap();
        let mut success = EventBuilder::new(EventKind::LoginSuccess).user("parent-1").build();
        success.timestamp = 3_000;
        log.append(&success).unwrap();

        let by_user = log
            .query(&EventFilter {
                user_id: Some("parent-1".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_user.len(), 2);

        let by_kind = log
            .query(&EventFilter {
                kind: Some(EventKind::LoginSuccess),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_kind.len(), 1);

        let windowed = log
            .query(&EventFilter {
                since: Some(1_500),
                until: Some(2_500),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].timestamp, 2_000);

        let limited = log
            .query(&EventFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].timestamp, 3_000);
    }

    #[test]
    fn test_prune_removes_old_events_only() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);

        log.append(&login_failure("parent-1", 1_000)).unwrap();
        log.append(&login_failure("parent-1", 5_000)).unwrap();

        let removed = log.prune(2_000).unwrap();
        assert_eq!(removed, 1);

        let events = log.query(&EventFilter::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, 5_000);
        assert_eq!(log.metrics().events_pruned_total, 1);
    }

    #[test]
    fn test_metrics_count_appends() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);

        log.append(&login_failure("parent-1", 1_000)).unwrap();
        log.append(&login_failure("parent-1", 2_000)).unwrap();

        let metrics = log.metrics();
        assert_eq!(metrics.events_appended_total, 2);
        assert_eq!(metrics.fallback_writes_total, 0);
    }
}
