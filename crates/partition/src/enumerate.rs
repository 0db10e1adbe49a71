//! Volume enumeration behind a single capability interface.
//!
//! The host's native enumeration facility and the fallback mount-root scan
//! are two implementations of one `VolumeEnumerator` trait, selected by a
//! factory at startup. OS quirks stay behind this seam.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{PartitionError, PartitionResult};

/// A mounted volume as reported by an enumerator.
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    /// Device identifier (volume name or device node)
    pub device: String,
    /// Mount point
    pub mount_point: PathBuf,
    /// Filesystem name, empty when unknown
    pub filesystem: String,
    /// Total size in bytes; `None` when statistics are unavailable
    pub total_bytes: Option<u64>,
    /// Available bytes; `None` when statistics are unavailable
    pub available_bytes: Option<u64>,
    /// OS-reported read-only mount flag; `None` when unavailable
    pub read_only: Option<bool>,
    /// Volume label, when known
    pub label: Option<String>,
}

/// Capability interface over the host's volume listing.
pub trait VolumeEnumerator: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Enumerate currently mounted volumes.
    fn enumerate(&self) -> PartitionResult<Vec<VolumeInfo>>;
}

/// Native enumerator backed by the OS disk list.
#[derive(Debug, Default)]
pub struct NativeEnumerator;

impl VolumeEnumerator for NativeEnumerator {
    fn name(&self) -> &'static str {
        "native"
    }

    fn enumerate(&self) -> PartitionResult<Vec<VolumeInfo>> {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        let mut volumes = Vec::new();
        for disk in disks.list() {
            let name = disk.name().to_string_lossy().to_string();
            volumes.push(VolumeInfo {
                device: name.clone(),
                mount_point: disk.mount_point().to_path_buf(),
                filesystem: disk.file_system().to_string_lossy().to_string(),
                total_bytes: Some(disk.total_space()),
                available_bytes: Some(disk.available_space()),
                read_only: Some(disk.is_read_only()),
                label: if name.is_empty() { None } else { Some(name) },
            });
        }
        debug!(count = volumes.len(), "Native enumeration complete");
        Ok(volumes)
    }
}

/// Fallback enumerator probing a fixed list of well-known mount roots.
///
/// Yields each configured root that exists plus its immediate children.
/// No filesystem statistics or mount flags are available on this path.
#[derive(Debug)]
pub struct FallbackEnumerator {
    roots: Vec<PathBuf>,
}

impl FallbackEnumerator {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }
}

impl VolumeEnumerator for FallbackEnumerator {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn enumerate(&self) -> PartitionResult<Vec<VolumeInfo>> {
        let mut volumes = Vec::new();
        for root in &self.roots {
            if !root.is_dir() {
                continue;
            }
            volumes.push(candidate_from_path(root.clone()));
            let entries = match std::fs::read_dir(root) {
                Ok(entries) => entries,
                Err(e) => {
                    // System-reserved or unmounted entries; skip, don't fail the scan
                    debug!(root = %root.display(), error = %e, "Skipping unreadable mount root");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    volumes.push(candidate_from_path(path));
                }
            }
        }
        debug!(count = volumes.len(), "Fallback enumeration complete");
        Ok(volumes)
    }
}

fn candidate_from_path(path: PathBuf) -> VolumeInfo {
    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty());
    VolumeInfo {
        device: path.to_string_lossy().to_string(),
        mount_point: path,
        filesystem: String::new(),
        total_bytes: None,
        available_bytes: None,
        read_only: None,
        label,
    }
}

/// Select the enumerator for this host.
///
/// The native listing is preferred; if it fails or reports nothing — or the
/// configuration asks for the fallback outright — the mount-root scan is
/// used instead.
pub fn platform_enumerator(
    fallback_roots: Vec<PathBuf>,
    prefer_fallback: bool,
) -> Box<dyn VolumeEnumerator> {
    if prefer_fallback {
        info!("Configured for fallback mount-root scan");
        return Box::new(FallbackEnumerator::new(fallback_roots));
    }
    let native = NativeEnumerator;
    match native.enumerate() {
        Ok(volumes) if !volumes.is_empty() => {
            info!(volumes = volumes.len(), "Using native volume enumeration");
            Box::new(native)
        }
        Ok(_) => {
            warn!("Native enumeration reported no volumes, falling back to mount-root scan");
            Box::new(FallbackEnumerator::new(fallback_roots))
        }
        Err(e) => {
            warn!(error = %e, "Native enumeration unavailable, falling back to mount-root scan");
            Box::new(FallbackEnumerator::new(fallback_roots))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fallback_yields_roots_and_children() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("volume-a")).unwrap();
        std::fs::create_dir(dir.path().join("volume-b")).unwrap();
        std::fs::write(dir.path().join("not-a-dir"), b"x").unwrap();

        let enumerator = FallbackEnumerator::new(vec![dir.path().to_path_buf()]);
        let volumes = enumerator.enumerate().unwrap();

        // The root itself plus the two child directories; the plain file is skipped
        assert_eq!(volumes.len(), 3);
        assert!(volumes.iter().all(|v| v.total_bytes.is_none()));
        assert!(volumes.iter().all(|v| v.read_only.is_none()));
        assert!(volumes
            .iter()
            .any(|v| v.label.as_deref() == Some("volume-a")));
    }

    #[test]
    fn test_fallback_skips_missing_roots() {
        let enumerator =
            FallbackEnumerator::new(vec![PathBuf::from("/definitely/not/a/mount/root")]);
        let volumes = enumerator.enumerate().unwrap();
        assert!(volumes.is_empty());
    }
}
