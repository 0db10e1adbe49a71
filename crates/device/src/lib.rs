//! The exposed boundary of the Orchard trust and access layer.
//!
//! Other subsystems (the GUI, the model server, the conversation logger)
//! consume this core exclusively through [`DeviceGateway`]:
//!
//! - [`DeviceGateway::locate_and_verify_partitions`]
//! - [`DeviceGateway::authenticate`]
//! - [`DeviceGateway::validate_session`]
//! - [`DeviceGateway::is_device_genuine`]
//!
//! No raw file handles, database connections, or cryptographic keys cross
//! this boundary.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use orchard_auth::{
    AuthError, AuthResult, Credential, CredentialStore, Role, SessionAuthenticator,
    SessionSweeper, SessionToken,
};
use orchard_core::config::DeviceConfig;
use orchard_core::event::{EventBuilder, EventKind, EventSeverity, SecurityEvent};
use orchard_core::{now_millis, AuditLog, CoreError, EventFilter};
use orchard_partition::{
    platform_enumerator, verify_integrity, HealthReport, PartitionError, PartitionLocator,
    PartitionRecord, PartitionRole, Verifier,
};
use orchard_trust::{DeviceToken, TokenAuthority};
use orchard_vault::{CredentialVault, VaultError};

/// Errors crossing the gateway boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error(transparent)]
    Core(#[from] CoreError),
    /// Non-fatal: the device token does not validate; the device is untrusted
    #[error("Device token invalid: {0}")]
    TokenInvalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolved partition mount points.
///
/// Valid only until the next [`DeviceGateway::locate_and_verify_partitions`]
/// call or device removal; holders must re-resolve rather than cache.
#[derive(Debug, Clone, Serialize)]
pub struct PartitionPaths {
    pub cdrom_path: PathBuf,
    pub usb_path: PathBuf,
}

/// The device trust and access layer behind one facade.
pub struct DeviceGateway {
    config: DeviceConfig,
    locator: PartitionLocator,
    verifier: Verifier,
    authority: TokenAuthority,
    audit: Arc<AuditLog>,
    authenticator: Arc<SessionAuthenticator>,
    sweeper: Option<SessionSweeper>,
}

impl DeviceGateway {
    /// Bring the access layer up: locate and verify both partitions, open
    /// the stores on the data partition, and start the session sweep.
    pub fn open(config: DeviceConfig) -> Result<Self, GatewayError> {
        let enumerator = platform_enumerator(
            config.partition.fallback_roots.clone(),
            config.partition.prefer_fallback_scan,
        );
        let locator = PartitionLocator::new(config.partition.clone(), enumerator);
        let verifier = Verifier::new(config.partition.clone());

        let (cdrom, usb) = locate_and_verify(&locator, &verifier, &config, None)?;

        let security_dir = usb.mount_point.join(&config.storage.security_dir);
        let db_path = security_dir.join(&config.storage.database_file);
        let audit = Arc::new(AuditLog::open(
            &db_path,
            security_dir.join(&config.storage.audit_fallback_file),
            config.storage.busy_timeout_ms,
        )?);
        let retention_ms = config.storage.retention_days * 86_400_000;
        if let Err(e) = audit.prune(now_millis().saturating_sub(retention_ms)) {
            warn!(error = %e, "Audit retention pruning failed");
        }

        record_verification_events(&audit, &cdrom, &usb);

        let vault = Arc::new(CredentialVault::open(
            config.policy.clone(),
            &security_dir.join(&config.storage.master_key_file),
        )?);
        let store = CredentialStore::open(&db_path, config.storage.busy_timeout_ms)?;
        let authenticator = Arc::new(SessionAuthenticator::new(
            store,
            vault,
            audit.clone(),
            config.auth.clone(),
        )?);
        let sweeper = SessionSweeper::start(
            authenticator.clone(),
            Duration::from_secs(config.auth.sweep_interval_secs),
        )?;

        info!(
            cdrom = %cdrom.mount_point.display(),
            usb = %usb.mount_point.display(),
            "Device gateway ready"
        );
        Ok(Self {
            config,
            locator,
            verifier,
            authority: TokenAuthority::new(),
            audit,
            authenticator,
            sweeper: Some(sweeper),
        })
    }

    /// Re-locate and re-verify both partitions, returning fresh mount
    /// points. Any previously resolved paths are invalidated.
    pub fn locate_and_verify_partitions(&self) -> Result<PartitionPaths, GatewayError> {
        self.locator.refresh();
        let (cdrom, usb) =
            locate_and_verify(&self.locator, &self.verifier, &self.config, Some(&self.audit))?;
        Ok(PartitionPaths {
            cdrom_path: cdrom.mount_point,
            usb_path: usb.mount_point,
        })
    }

    /// Authenticate an operator. Lockout state and audit recording are
    /// handled inside; the result is safe to surface to the end consumer.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<AuthResult, GatewayError> {
        Ok(self.authenticator.login(username, password)?)
    }

    /// Validate a session token, extending its idle window. `None` means
    /// absent or expired.
    pub fn validate_session(&self, token_id: &str) -> Option<SessionToken> {
        self.authenticator.validate(token_id)
    }

    /// Revoke a session. Idempotent.
    pub fn revoke_session(&self, token_id: &str) {
        self.authenticator.revoke(token_id)
    }

    /// Register a new operator credential (onboarding flow).
    pub fn create_operator(
        &self,
        username: &str,
        password: &str,
        role: Role,
        personal: &[&str],
    ) -> Result<Credential, GatewayError> {
        Ok(self
            .authenticator
            .create_credential(username, password, role, personal, false)?)
    }

    /// Validate a device token against the manufacturing secret.
    ///
    /// `false` means the device is not a genuine manufactured unit; callers
    /// must treat that as an absolute stop.
    pub fn is_device_genuine(&self, token: &DeviceToken, secret: &[u8]) -> bool {
        let genuine = self.authority.validate(token, secret);
        let event = if genuine {
            EventBuilder::new(EventKind::DeviceTokenAccepted)
                .detail("device_id", token.device_id.clone())
                .detail("batch_id", token.batch_id.clone())
                .build()
        } else {
            EventBuilder::new(EventKind::DeviceTokenRejected)
                .severity(EventSeverity::Critical)
                .detail("device_id", token.device_id.clone())
                .build()
        };
        if let Err(e) = self.audit.append(&event) {
            error!(error = %e, "Device token event could not be recorded");
        }
        genuine
    }

    /// Load the device token from the system partition.
    pub fn load_device_token(&self) -> Result<DeviceToken, GatewayError> {
        let cdrom = self
            .locator
            .resolved_path(PartitionRole::Cdrom)
            .ok_or(PartitionError::NotFound {
                role: PartitionRole::Cdrom,
            })?;
        let path = cdrom.join(&self.config.storage.device_token_file);
        DeviceToken::read_from(&path)?
            .map_err(|e| GatewayError::TokenInvalid(e.to_string()))
    }

    /// Health classification for both partitions as of the last scan.
    pub fn partition_health(&self) -> HealthReport {
        let (cdrom, usb) = self.locator.current_records();
        self.verifier.partition_health(cdrom.as_ref(), usb.as_ref())
    }

    /// Query the audit record, newest-first.
    pub fn audit_events(&self, filter: &EventFilter) -> Result<Vec<SecurityEvent>, GatewayError> {
        Ok(self.audit.query(filter)?)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.authenticator.session_count()
    }

    /// Flush-then-stop teardown: persist live sessions, then stop the
    /// background sweep.
    pub fn shutdown(mut self) -> Result<(), GatewayError> {
        if let Err(e) = self.authenticator.flush() {
            warn!(error = %e, "Session flush failed during shutdown");
        }
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        info!("Device gateway stopped");
        Ok(())
    }
}

/// Scan, classify, verify, and integrity-check both partitions.
///
/// The data partition gets its directory skeleton created on first use; the
/// system partition is never written. Verification failures map onto the
/// error taxonomy: missing required content is an integrity failure, a
/// wrong writability state is an invariant violation.
fn locate_and_verify(
    locator: &PartitionLocator,
    verifier: &Verifier,
    config: &DeviceConfig,
    audit: Option<&Arc<AuditLog>>,
) -> Result<(PartitionRecord, PartitionRecord), GatewayError> {
    let outcome = locator.scan()?;
    let mut cdrom = outcome.cdrom.ok_or(PartitionError::NotFound {
        role: PartitionRole::Cdrom,
    })?;
    let usb = outcome.usb.ok_or(PartitionError::NotFound {
        role: PartitionRole::Usb,
    })?;

    // Data partition: build the skeleton on a blank partition, then verify.
    let mut usb_report = verifier.verify(&usb)?;
    if !usb_report.passed() && usb_report.invariant_violations.is_empty() {
        verifier.initialize_data_partition(&usb.mount_point)?;
        usb_report = verifier.verify(&usb)?;
    }
    locator.mark_verification(PartitionRole::Usb, usb_report.passed());
    if !usb_report.passed() {
        if let Some(audit) = audit {
            record_failure_event(audit, PartitionRole::Usb, &usb_report.missing);
        }
        if !usb_report.invariant_violations.is_empty() {
            return Err(PartitionError::InvariantViolation {
                role: PartitionRole::Usb,
                reason: usb_report.invariant_violations.join("; "),
            }
            .into());
        }
        return Err(PartitionError::IntegrityMismatch(usb_report.missing).into());
    }

    // System partition: verify required content, then check it against the
    // manufacturing manifest.
    let cdrom_report = verifier.verify(&cdrom)?;
    if !cdrom_report.passed() {
        locator.mark_verification(PartitionRole::Cdrom, false);
        if let Some(audit) = audit {
            record_failure_event(audit, PartitionRole::Cdrom, &cdrom_report.missing);
        }
        if !cdrom_report.invariant_violations.is_empty() {
            return Err(PartitionError::InvariantViolation {
                role: PartitionRole::Cdrom,
                reason: cdrom_report.invariant_violations.join("; "),
            }
            .into());
        }
        return Err(PartitionError::IntegrityMismatch(cdrom_report.missing).into());
    }

    let manifest_path = cdrom.mount_point.join(&config.partition.manifest_name);
    match verify_integrity(&cdrom.mount_point, &manifest_path, &config.partition) {
        Ok(report) => {
            cdrom.integrity_digest = Some(report.manifest_digest);
            locator.mark_verification(PartitionRole::Cdrom, true);
            if let Some(audit) = audit {
                record_verification_events(audit, &cdrom, &usb);
            }
        }
        Err(e) => {
            locator.mark_verification(PartitionRole::Cdrom, false);
            if let Some(audit) = audit {
                let event = EventBuilder::new(EventKind::IntegrityMismatch)
                    .severity(EventSeverity::Critical)
                    .detail("role", PartitionRole::Cdrom.as_str())
                    .detail("error", e.to_string())
                    .build();
                if let Err(append_err) = audit.append(&event) {
                    error!(error = %append_err, "Integrity event could not be recorded");
                }
            }
            return Err(e.into());
        }
    }

    Ok((cdrom, usb))
}

fn record_verification_events(audit: &AuditLog, cdrom: &PartitionRecord, usb: &PartitionRecord) {
    for record in [cdrom, usb] {
        let event = EventBuilder::new(EventKind::PartitionVerified)
            .detail("role", record.role.as_str())
            .detail("mount_point", record.mount_point.display().to_string())
            .build();
        if let Err(e) = audit.append(&event) {
            error!(error = %e, "Verification event could not be recorded");
        }
    }
}

fn record_failure_event(audit: &AuditLog, role: PartitionRole, missing: &[String]) {
    let event = EventBuilder::new(EventKind::PartitionVerificationFailed)
        .severity(EventSeverity::Error)
        .detail("role", role.as_str())
        .detail("missing", missing.join(", "))
        .build();
    if let Err(e) = audit.append(&event) {
        error!(error = %e, "Verification-failure event could not be recorded");
    }
}
