//! Marker-driven partition location with an explicit scan state machine.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use orchard_core::config::PartitionConfig;

use crate::enumerate::{VolumeEnumerator, VolumeInfo};
use crate::error::PartitionResult;
use crate::probe;
use crate::record::{PartitionRecord, PartitionRole};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Scan state per partition role.
///
/// `Unscanned → Scanning → {Found, NotFound}`; a found partition moves to
/// `Verified` or `VerificationFailed` once content verification runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Unscanned,
    Scanning,
    Found,
    NotFound,
    Verified,
    VerificationFailed,
}

/// Result of one scan pass over all mounted volumes.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub cdrom: Option<PartitionRecord>,
    pub usb: Option<PartitionRecord>,
}

impl ScanOutcome {
    pub fn record(&self, role: PartitionRole) -> Option<&PartitionRecord> {
        match role {
            PartitionRole::Cdrom => self.cdrom.as_ref(),
            PartitionRole::Usb => self.usb.as_ref(),
            PartitionRole::Unknown => None,
        }
    }

    pub fn both_found(&self) -> bool {
        self.cdrom.is_some() && self.usb.is_some()
    }
}

#[derive(Debug)]
struct RoleSlot {
    state: ScanState,
    record: Option<PartitionRecord>,
}

impl RoleSlot {
    fn new() -> Self {
        Self {
            state: ScanState::Unscanned,
            record: None,
        }
    }

    fn reset(&mut self) {
        self.state = ScanState::Unscanned;
        self.record = None;
    }
}

#[derive(Debug)]
struct LocatorState {
    cdrom: RoleSlot,
    usb: RoleSlot,
    /// Bumped on every refresh; resolved paths from an older generation are stale
    generation: u64,
}

/// Locates the system and data partitions among mounted volumes.
///
/// Paths resolved from a locator are invalidated by any [`refresh`]
/// (the generation counter changes); holders must re-resolve rather than
/// cache paths, since the underlying device may have been removed.
///
/// [`refresh`]: PartitionLocator::refresh
pub struct PartitionLocator {
    config: PartitionConfig,
    enumerator: Box<dyn VolumeEnumerator>,
    state: Mutex<LocatorState>,
}

impl PartitionLocator {
    pub fn new(config: PartitionConfig, enumerator: Box<dyn VolumeEnumerator>) -> Self {
        Self {
            config,
            enumerator,
            state: Mutex::new(LocatorState {
                cdrom: RoleSlot::new(),
                usb: RoleSlot::new(),
                generation: 0,
            }),
        }
    }

    /// Enumerate mounted volumes and classify the two partition roles.
    ///
    /// Candidacy requires the role marker file; candidates whose reported
    /// size falls outside the configured range for the role are discarded.
    /// Candidates without size statistics (fallback enumeration) skip the
    /// range check.
    pub fn scan(&self) -> PartitionResult<ScanOutcome> {
        {
            let mut state = self.state.lock().unwrap();
            state.cdrom.state = ScanState::Scanning;
            state.usb.state = ScanState::Scanning;
        }

        info!(enumerator = self.enumerator.name(), "Scanning for device partitions");
        let volumes = self.enumerator.enumerate()?;

        let mut cdrom: Option<PartitionRecord> = None;
        let mut usb: Option<PartitionRecord> = None;

        for volume in &volumes {
            if cdrom.is_none() {
                if let Some(record) = self.classify(volume, PartitionRole::Cdrom) {
                    info!(mount = %record.mount_point.display(), "Found system partition");
                    cdrom = Some(record);
                }
            }
            if usb.is_none() {
                if let Some(record) = self.classify(volume, PartitionRole::Usb) {
                    info!(mount = %record.mount_point.display(), "Found data partition");
                    usb = Some(record);
                }
            }
            if cdrom.is_some() && usb.is_some() {
                break;
            }
        }

        if cdrom.is_none() {
            warn!("System partition not found");
        }
        if usb.is_none() {
            warn!("Data partition not found");
        }

        let mut state = self.state.lock().unwrap();
        state.cdrom.state = if cdrom.is_some() {
            ScanState::Found
        } else {
            ScanState::NotFound
        };
        state.usb.state = if usb.is_some() {
            ScanState::Found
        } else {
            ScanState::NotFound
        };
        state.cdrom.record = cdrom.clone();
        state.usb.record = usb.clone();

        Ok(ScanOutcome { cdrom, usb })
    }

    fn classify(&self, volume: &VolumeInfo, role: PartitionRole) -> Option<PartitionRecord> {
        let marker_name = match role {
            PartitionRole::Cdrom => &self.config.system_marker,
            PartitionRole::Usb => &self.config.data_marker,
            PartitionRole::Unknown => return None,
        };
        let marker_path = volume.mount_point.join(marker_name);

        // Permission errors on system-reserved volumes are treated as absence
        match std::fs::metadata(&marker_path) {
            Ok(meta) if meta.is_file() => {}
            _ => return None,
        }

        let (min_gb, max_gb) = match role {
            PartitionRole::Cdrom => self.config.system_size_gb,
            PartitionRole::Usb => self.config.data_size_gb,
            PartitionRole::Unknown => unreachable!(),
        };

        if let Some(total) = volume.total_bytes {
            let total_gb = total as f64 / BYTES_PER_GB;
            if total_gb < min_gb || total_gb > max_gb {
                debug!(
                    mount = %volume.mount_point.display(),
                    role = %role,
                    total_gb,
                    "Discarding candidate outside size range"
                );
                return None;
            }
        }

        let read_only = probe::classify_read_only(&volume.mount_point, volume.read_only);
        let used_bytes = match (volume.total_bytes, volume.available_bytes) {
            (Some(total), Some(available)) => Some(total.saturating_sub(available)),
            _ => None,
        };

        Some(PartitionRecord {
            device: volume.device.clone(),
            mount_point: volume.mount_point.clone(),
            filesystem: volume.filesystem.clone(),
            role,
            total_bytes: volume.total_bytes,
            used_bytes,
            available_bytes: volume.available_bytes,
            read_only,
            label: volume.label.clone(),
            marker_path,
            verified: false,
            integrity_digest: None,
        })
    }

    /// Reset both roles to `Unscanned` and invalidate previously resolved paths.
    pub fn refresh(&self) {
        let mut state = self.state.lock().unwrap();
        state.cdrom.reset();
        state.usb.reset();
        state.generation += 1;
        info!(generation = state.generation, "Locator refreshed, prior paths invalidated");
    }

    /// The current scan generation. Paths resolved under an older
    /// generation must be re-resolved.
    pub fn generation(&self) -> u64 {
        self.state.lock().unwrap().generation
    }

    /// Scan state for a role.
    pub fn role_state(&self, role: PartitionRole) -> ScanState {
        let state = self.state.lock().unwrap();
        match role {
            PartitionRole::Cdrom => state.cdrom.state,
            PartitionRole::Usb => state.usb.state,
            PartitionRole::Unknown => ScanState::Unscanned,
        }
    }

    /// Record the verification outcome for a role.
    pub fn mark_verification(&self, role: PartitionRole, passed: bool) {
        let mut state = self.state.lock().unwrap();
        let slot = match role {
            PartitionRole::Cdrom => &mut state.cdrom,
            PartitionRole::Usb => &mut state.usb,
            PartitionRole::Unknown => return,
        };
        if slot.state == ScanState::Found || slot.state == ScanState::Verified {
            slot.state = if passed {
                ScanState::Verified
            } else {
                ScanState::VerificationFailed
            };
            if let Some(record) = &mut slot.record {
                record.verified = passed;
            }
        }
    }

    /// Records from the most recent scan, per role.
    pub fn current_records(&self) -> (Option<PartitionRecord>, Option<PartitionRecord>) {
        let state = self.state.lock().unwrap();
        (state.cdrom.record.clone(), state.usb.record.clone())
    }

    /// Resolved mount point for a role, if that role has been found.
    pub fn resolved_path(&self, role: PartitionRole) -> Option<PathBuf> {
        let state = self.state.lock().unwrap();
        let slot = match role {
            PartitionRole::Cdrom => &state.cdrom,
            PartitionRole::Usb => &state.usb,
            PartitionRole::Unknown => return None,
        };
        slot.record.as_ref().map(|r| r.mount_point.clone())
    }

    /// Re-scan until both partitions are present or the timeout elapses.
    pub fn wait_for_partitions(&self, timeout: Duration, poll_interval: Duration) -> PartitionResult<bool> {
        let started = Instant::now();
        loop {
            let outcome = self.scan()?;
            if outcome.both_found() {
                info!("Both partitions detected");
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                warn!(waited_secs = started.elapsed().as_secs(), "Timeout waiting for partitions");
                return Ok(false);
            }
            std::thread::sleep(poll_interval);
        }
    }
}
