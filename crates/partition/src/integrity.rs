//! Manifest-driven content integrity verification.
//!
//! The manufacturing pipeline writes a manifest mapping every file on the
//! system partition to its content digest, plus aggregate counts and sizes.
//! Verification samples files against that manifest: small manifests are
//! checked in full, large ones through a deterministic evenly-strided
//! subset. Any mismatch is treated as tampering or corruption and fails
//! hard; it is never silently ignored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{error, info};

use orchard_core::config::PartitionConfig;

use crate::error::{PartitionError, PartitionResult};

/// Digest and size for one manifest-listed file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestEntry {
    /// File size in bytes
    pub size: u64,
    /// Hex-encoded BLAKE3 digest of the file content
    pub digest: String,
}

/// Manifest of the system partition content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version
    pub version: String,
    /// Relative path → entry, ordered for deterministic sampling
    pub files: BTreeMap<String, ManifestEntry>,
    /// Aggregate file count, cross-checked against `files`
    pub total_files: usize,
    /// Aggregate content size in bytes
    pub total_bytes: u64,
}

impl Manifest {
    /// Load and structurally validate a manifest file.
    pub fn load(path: &Path) -> PartitionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PartitionError::Manifest(format!("manifest not found at {}", path.display()))
            } else {
                PartitionError::Io(e)
            }
        })?;
        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| PartitionError::Manifest(format!("malformed manifest: {e}")))?;

        if manifest.total_files != manifest.files.len() {
            return Err(PartitionError::Manifest(format!(
                "aggregate count mismatch: total_files={} but {} entries listed",
                manifest.total_files,
                manifest.files.len()
            )));
        }
        Ok(manifest)
    }

    /// Build a manifest over every file under `root`.
    ///
    /// Used by the manufacturing pipeline and by tests; runtime code only
    /// ever consumes manifests.
    pub fn generate(root: &Path) -> PartitionResult<Self> {
        let mut files = BTreeMap::new();
        let mut total_bytes = 0u64;
        collect_files(root, root, &mut files, &mut total_bytes)?;
        let total_files = files.len();
        Ok(Manifest {
            version: "1.0".to_string(),
            files,
            total_files,
            total_bytes,
        })
    }

    /// Write the manifest as pretty JSON.
    pub fn write_to(&self, path: &Path) -> PartitionResult<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    files: &mut BTreeMap<String, ManifestEntry>,
    total_bytes: &mut u64,
) -> PartitionResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, files, total_bytes)?;
        } else if path.is_file() {
            let relative = path
                .strip_prefix(root)
                .expect("walked path is under root")
                .to_string_lossy()
                .replace('\\', "/");
            let size = entry.metadata()?.len();
            let digest = hash_file(&path)?;
            *total_bytes += size;
            files.insert(relative, ManifestEntry { size, digest });
        }
    }
    Ok(())
}

/// Hex-encoded BLAKE3 digest of a file, read in chunks.
pub fn hash_file(path: &Path) -> PartitionResult<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Outcome of a passed integrity verification.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    /// Number of files whose digests were checked
    pub checked_files: usize,
    /// Number of files listed in the manifest
    pub total_files: usize,
    /// Digest of the manifest document itself
    pub manifest_digest: String,
}

/// Verify partition content against its manifest.
///
/// Returns `Err(IntegrityMismatch)` listing every divergence found in the
/// sample; mismatches are never downgraded to warnings.
pub fn verify_integrity(
    root: &Path,
    manifest_path: &Path,
    config: &PartitionConfig,
) -> PartitionResult<IntegrityReport> {
    let manifest = Manifest::load(manifest_path)?;
    let sample = select_sample(
        &manifest,
        config.integrity_full_check_max_files,
        config.integrity_sample_files,
    );

    let mut mismatches = Vec::new();
    for (relative, expected) in &sample {
        let path = root.join(relative);
        let metadata = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(_) => {
                mismatches.push(format!("{relative}: file missing"));
                continue;
            }
        };
        if metadata.len() != expected.size {
            mismatches.push(format!(
                "{relative}: size {} differs from manifest {}",
                metadata.len(),
                expected.size
            ));
            continue;
        }
        let digest = hash_file(&path)?;
        if digest != expected.digest {
            mismatches.push(format!("{relative}: content digest mismatch"));
        }
    }

    if !mismatches.is_empty() {
        error!(
            root = %root.display(),
            mismatches = mismatches.len(),
            "Integrity verification failed"
        );
        return Err(PartitionError::IntegrityMismatch(mismatches));
    }

    let manifest_digest = hash_file(manifest_path)?;
    info!(
        root = %root.display(),
        checked = sample.len(),
        total = manifest.files.len(),
        "Integrity verification passed"
    );
    Ok(IntegrityReport {
        checked_files: sample.len(),
        total_files: manifest.files.len(),
        manifest_digest,
    })
}

/// Select the files to check: everything for small manifests, a
/// deterministic evenly-strided subset for large ones.
///
/// Determinism matters here: a tampered file must not be able to slip
/// through on a lucky re-roll of a random sample.
fn select_sample(
    manifest: &Manifest,
    full_check_max: usize,
    sample_size: usize,
) -> Vec<(String, ManifestEntry)> {
    let entries: Vec<(String, ManifestEntry)> = manifest
        .files
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if entries.len() <= full_check_max || sample_size == 0 {
        return entries;
    }

    let stride = (entries.len() / sample_size).max(1);
    entries
        .into_iter()
        .step_by(stride)
        .take(sample_size)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_partition(dir: &TempDir, file_count: usize) -> std::path::PathBuf {
        let root = dir.path().join("sys");
        std::fs::create_dir_all(root.join("models")).unwrap();
        for i in 0..file_count {
            std::fs::write(root.join("models").join(format!("chunk-{i:03}")), vec![i as u8; 64])
                .unwrap();
        }
        let manifest = Manifest::generate(&root).unwrap();
        manifest.write_to(&dir.path().join("manifest.json")).unwrap();
        root
    }

    #[test]
    fn test_generate_counts_aggregates() {
        let dir = TempDir::new().unwrap();
        build_partition(&dir, 3);
        let manifest = Manifest::load(&dir.path().join("manifest.json")).unwrap();
        assert_eq!(manifest.total_files, 3);
        assert_eq!(manifest.total_bytes, 3 * 64);
    }

    #[test]
    fn test_verification_passes_when_content_matches() {
        let dir = TempDir::new().unwrap();
        let root = build_partition(&dir, 5);
        let config = PartitionConfig::default();

        let report = verify_integrity(&root, &dir.path().join("manifest.json"), &config).unwrap();
        assert_eq!(report.checked_files, 5);
        assert_eq!(report.total_files, 5);
        assert!(!report.manifest_digest.is_empty());
    }

    #[test]
    fn test_verification_fails_on_tampered_file() {
        let dir = TempDir::new().unwrap();
        let root = build_partition(&dir, 5);
        std::fs::write(root.join("models/chunk-002"), vec![0xFF; 64]).unwrap();

        let config = PartitionConfig::default();
        let result = verify_integrity(&root, &dir.path().join("manifest.json"), &config);
        match result {
            Err(PartitionError::IntegrityMismatch(mismatches)) => {
                assert_eq!(mismatches.len(), 1);
                assert!(mismatches[0].contains("chunk-002"));
            }
            other => panic!("expected integrity mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_verification_fails_on_missing_file() {
        let dir = TempDir::new().unwrap();
        let root = build_partition(&dir, 5);
        std::fs::remove_file(root.join("models/chunk-000")).unwrap();

        let config = PartitionConfig::default();
        let result = verify_integrity(&root, &dir.path().join("manifest.json"), &config);
        assert!(matches!(result, Err(PartitionError::IntegrityMismatch(_))));
    }

    #[test]
    fn test_verification_fails_on_size_change() {
        let dir = TempDir::new().unwrap();
        let root = build_partition(&dir, 2);
        std::fs::write(root.join("models/chunk-001"), vec![1u8; 65]).unwrap();

        let config = PartitionConfig::default();
        let result = verify_integrity(&root, &dir.path().join("manifest.json"), &config);
        assert!(matches!(result, Err(PartitionError::IntegrityMismatch(_))));
    }

    #[test]
    fn test_large_manifest_uses_deterministic_sample() {
        let dir = TempDir::new().unwrap();
        let root = build_partition(&dir, 100);
        let config = PartitionConfig {
            integrity_full_check_max_files: 10,
            integrity_sample_files: 8,
            ..Default::default()
        };

        let first = verify_integrity(&root, &dir.path().join("manifest.json"), &config).unwrap();
        let second = verify_integrity(&root, &dir.path().join("manifest.json"), &config).unwrap();
        assert_eq!(first.checked_files, 8);
        assert_eq!(second.checked_files, 8);
        assert_eq!(first.total_files, 100);
    }

    #[test]
    fn test_aggregate_count_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        build_partition(&dir, 2);
        let manifest_path = dir.path().join("manifest.json");
        let mut manifest = Manifest::load(&manifest_path).unwrap();
        manifest.total_files = 99;
        manifest.write_to(&manifest_path).unwrap();

        assert!(matches!(
            Manifest::load(&manifest_path),
            Err(PartitionError::Manifest(_))
        ));
    }

    #[test]
    fn test_missing_manifest_is_a_manifest_error() {
        let dir = TempDir::new().unwrap();
        let config = PartitionConfig::default();
        let result = verify_integrity(dir.path(), &dir.path().join("manifest.json"), &config);
        assert!(matches!(result, Err(PartitionError::Manifest(_))));
    }
}
