//! Content verification and health reporting for located partitions.

use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use orchard_core::config::PartitionConfig;
use orchard_core::now_millis;

use crate::error::PartitionResult;
use crate::probe;
use crate::record::{PartitionRecord, PartitionRole};

/// Free space below this on the data partition is reported as a warning.
const LOW_SPACE_BYTES: u64 = 100 * 1024 * 1024;

/// Structured verification outcome for one partition.
///
/// Ordinary absences are enumerated here rather than raised; only I/O
/// faults unrelated to the business check surface as errors.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub role: PartitionRole,
    /// Every required item that was not found, relative to the partition root
    pub missing: Vec<String>,
    /// Launcher artifact satisfying the read-only-role requirement, if any
    pub launcher_found: Option<String>,
    /// Writability invariant violations for the role
    pub invariant_violations: Vec<String>,
    /// Non-fatal observations (e.g. low free space)
    pub warnings: Vec<String>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.invariant_violations.is_empty()
    }
}

/// Per-role health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Error,
    Missing,
}

/// Health summary across both roles.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub cdrom_status: HealthStatus,
    pub cdrom_issues: Vec<String>,
    pub usb_status: HealthStatus,
    pub usb_issues: Vec<String>,
}

/// Verifies located partitions against the configured content requirements.
pub struct Verifier {
    config: PartitionConfig,
}

impl Verifier {
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    /// Verify the required content set and writability invariant for a
    /// located partition.
    ///
    /// For the read-only role every configured path must exist and at least
    /// one platform launcher artifact must be present; the write-probe must
    /// fail. For the writable role the directory skeleton must exist and
    /// the write-probe must pass.
    pub fn verify(&self, record: &PartitionRecord) -> PartitionResult<VerificationReport> {
        let root = &record.mount_point;
        let mut report = VerificationReport {
            role: record.role,
            missing: Vec::new(),
            launcher_found: None,
            invariant_violations: Vec::new(),
            warnings: Vec::new(),
        };

        match record.role {
            PartitionRole::Cdrom => {
                for required in &self.config.required_system_paths {
                    if !root.join(required).exists() {
                        report.missing.push(required.clone());
                    }
                }
                report.launcher_found = self
                    .config
                    .launcher_artifacts
                    .iter()
                    .find(|artifact| root.join(artifact).exists())
                    .cloned();
                if report.launcher_found.is_none() {
                    report.missing.push(format!(
                        "launcher artifact (any of: {})",
                        self.config.launcher_artifacts.join(", ")
                    ));
                }
                if probe::write_probe(root) {
                    if self.config.require_system_read_only {
                        report
                            .invariant_violations
                            .push("system partition accepted a write".to_string());
                    } else {
                        warn!(
                            mount = %root.display(),
                            "System partition is writable; read-only invariant not enforced"
                        );
                    }
                }
            }
            PartitionRole::Usb => {
                for dir in &self.config.required_data_dirs {
                    let path = root.join(dir);
                    if !path.is_dir() {
                        report.missing.push(dir.clone());
                    }
                }
                if !probe::write_probe(root) {
                    report
                        .invariant_violations
                        .push("data partition rejected a write".to_string());
                }
                if let Some(available) = record.available_bytes {
                    if available < LOW_SPACE_BYTES {
                        report
                            .warnings
                            .push(format!("low free space: {available} bytes available"));
                    }
                }
            }
            PartitionRole::Unknown => {
                report
                    .invariant_violations
                    .push("cannot verify a partition with unknown role".to_string());
            }
        }

        if report.passed() {
            info!(role = %record.role, mount = %root.display(), "Partition verification passed");
        } else {
            warn!(
                role = %record.role,
                mount = %root.display(),
                missing = report.missing.len(),
                violations = report.invariant_violations.len(),
                "Partition verification failed"
            );
        }
        Ok(report)
    }

    /// Create the required directory skeleton and marker file on a blank
    /// data partition.
    pub fn initialize_data_partition(&self, root: &Path) -> PartitionResult<()> {
        for dir in &self.config.required_data_dirs {
            std::fs::create_dir_all(root.join(dir))?;
        }
        std::fs::create_dir_all(root.join(".security"))?;

        let marker = root.join(&self.config.data_marker);
        if !marker.exists() {
            let body = serde_json::json!({
                "type": "ORCHARD_DATA_PARTITION",
                "version": "1.0",
                "initialized_at": now_millis(),
            });
            std::fs::write(&marker, serde_json::to_string_pretty(&body)?)?;
        }
        info!(root = %root.display(), "Data partition initialized");
        Ok(())
    }

    /// Health classification for the most recent scan outcome.
    pub fn partition_health(
        &self,
        cdrom: Option<&PartitionRecord>,
        usb: Option<&PartitionRecord>,
    ) -> HealthReport {
        let (cdrom_status, cdrom_issues) = match cdrom {
            None => (
                HealthStatus::Missing,
                vec!["partition not found".to_string()],
            ),
            Some(record) => {
                let mut issues = Vec::new();
                let mut status = HealthStatus::Healthy;
                if !record.read_only {
                    status = HealthStatus::Error;
                    issues.push("not read-only".to_string());
                }
                (status, issues)
            }
        };

        let (usb_status, usb_issues) = match usb {
            None => (
                HealthStatus::Missing,
                vec!["partition not found".to_string()],
            ),
            Some(record) => {
                let mut issues = Vec::new();
                let mut status = HealthStatus::Healthy;
                if record.read_only {
                    status = HealthStatus::Error;
                    issues.push("read-only (should be writable)".to_string());
                }
                if let Some(available) = record.available_bytes {
                    if available < LOW_SPACE_BYTES {
                        if status == HealthStatus::Healthy {
                            status = HealthStatus::Warning;
                        }
                        issues.push(format!("low free space: {available} bytes"));
                    }
                }
                (status, issues)
            }
        };

        HealthReport {
            cdrom_status,
            cdrom_issues,
            usb_status,
            usb_issues,
        }
    }
}
