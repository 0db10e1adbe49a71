//! Partition records produced by a scan.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Role a partition plays in the dual-partition layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionRole {
    /// Read-only system partition
    Cdrom,
    /// Writable data partition
    Usb,
    /// Volume carrying no recognized marker
    Unknown,
}

impl PartitionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionRole::Cdrom => "cdrom",
            PartitionRole::Usb => "usb",
            PartitionRole::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified partition as observed by one scan.
///
/// Records are recomputed on every scan and never persisted across scans;
/// the underlying device may be removed at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionRecord {
    /// Device identifier (volume name or device node)
    pub device: String,
    /// Mount point of the volume
    pub mount_point: PathBuf,
    /// Filesystem name as reported by the enumerator
    pub filesystem: String,
    /// Classified role
    pub role: PartitionRole,
    /// Total size in bytes, when statistics are available
    pub total_bytes: Option<u64>,
    /// Used bytes, when statistics are available
    pub used_bytes: Option<u64>,
    /// Available bytes, when statistics are available
    pub available_bytes: Option<u64>,
    /// Empirical writability classification (write-probe result)
    pub read_only: bool,
    /// Volume label, when known
    pub label: Option<String>,
    /// Path of the marker file that promoted this volume
    pub marker_path: PathBuf,
    /// Set once content verification has passed
    pub verified: bool,
    /// Digest of the manifest used for integrity verification
    pub integrity_digest: Option<String>,
}

impl PartitionRecord {
    /// Total size in GB, if statistics are available.
    pub fn total_gb(&self) -> Option<f64> {
        self.total_bytes.map(|b| b as f64 / (1024.0 * 1024.0 * 1024.0))
    }

    /// Available space in GB, if statistics are available.
    pub fn available_gb(&self) -> Option<f64> {
        self.available_bytes
            .map(|b| b as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(PartitionRole::Cdrom.to_string(), "cdrom");
        assert_eq!(PartitionRole::Usb.to_string(), "usb");
    }

    #[test]
    fn test_gb_conversion() {
        let record = PartitionRecord {
            device: "disk1".to_string(),
            mount_point: PathBuf::from("/mnt/x"),
            filesystem: "iso9660".to_string(),
            role: PartitionRole::Cdrom,
            total_bytes: Some(4 * 1024 * 1024 * 1024),
            used_bytes: None,
            available_bytes: None,
            read_only: true,
            label: None,
            marker_path: PathBuf::from("/mnt/x/orchard_system.id"),
            verified: false,
            integrity_digest: None,
        };
        assert_eq!(record.total_gb(), Some(4.0));
        assert_eq!(record.available_gb(), None);
    }
}
