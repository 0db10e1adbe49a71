//! Configuration management for the Orchard access layer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for the device trust and access layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeviceConfig {
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Partition discovery and verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Marker filename identifying the read-only system partition
    pub system_marker: String,
    /// Marker filename identifying the writable data partition
    pub data_marker: String,
    /// Accepted system partition size range in GB
    pub system_size_gb: (f64, f64),
    /// Accepted data partition size range in GB
    pub data_size_gb: (f64, f64),
    /// Mount roots probed when native enumeration is unavailable
    pub fallback_roots: Vec<PathBuf>,
    /// Skip native enumeration and scan the fallback roots directly.
    /// Development hosts run the partitions out of plain directories.
    pub prefer_fallback_scan: bool,
    /// Paths that must exist on the system partition, relative to its root
    pub required_system_paths: Vec<String>,
    /// At least one of these must exist on the system partition
    pub launcher_artifacts: Vec<String>,
    /// Directories that must exist on the data partition
    pub required_data_dirs: Vec<String>,
    /// Manifest filename at the system partition root
    pub manifest_name: String,
    /// Enforce the read-only invariant on the system partition.
    /// Disabled on development hosts running from plain directories.
    pub require_system_read_only: bool,
    /// Manifests at or below this file count are verified in full
    pub integrity_full_check_max_files: usize,
    /// Number of files sampled from larger manifests
    pub integrity_sample_files: usize,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            system_marker: "orchard_system.id".to_string(),
            data_marker: "orchard_data.id".to_string(),
            system_size_gb: (2.0, 8.0),
            data_size_gb: (0.5, 64.0),
            fallback_roots: vec![
                PathBuf::from("/media"),
                PathBuf::from("/run/media"),
                PathBuf::from("/Volumes"),
                PathBuf::from("/mnt"),
            ],
            prefer_fallback_scan: false,
            required_system_paths: vec![
                "models".to_string(),
                "config".to_string(),
                "manifest.json".to_string(),
            ],
            launcher_artifacts: vec![
                "start.exe".to_string(),
                "start.command".to_string(),
                "start.sh".to_string(),
            ],
            required_data_dirs: vec![
                "profiles".to_string(),
                "logs".to_string(),
                "conversations".to_string(),
                "cache".to_string(),
            ],
            manifest_name: "manifest.json".to_string(),
            require_system_read_only: true,
            integrity_full_check_max_files: 64,
            integrity_sample_files: 32,
        }
    }
}

/// Authentication and session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Consecutive failures before an account is locked
    pub max_failed_attempts: u32,
    /// Lockout duration in seconds
    pub lockout_secs: u64,
    /// Rolling idle window for sessions in seconds
    pub session_idle_secs: u64,
    /// Absolute session lifetime from creation in seconds
    pub session_max_lifetime_secs: u64,
    /// Interval between background expiry sweeps in seconds
    pub sweep_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_secs: 900,
            session_idle_secs: 1800,
            session_max_lifetime_secs: 86_400,
            sweep_interval_secs: 300,
        }
    }
}

/// Password policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub min_uppercase: usize,
    pub min_lowercase: usize,
    pub min_digits: usize,
    pub min_special: usize,
    /// Characters counted as the special class
    pub special_chars: String,
    /// Reject passwords from the common-password list
    pub reject_common: bool,
    /// Reject passwords containing supplied personal information
    pub reject_personal_info: bool,
    /// Minimum composite strength score (0-100)
    pub min_strength_score: u8,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_length: 12,
            max_length: 128,
            min_uppercase: 1,
            min_lowercase: 1,
            min_digits: 1,
            min_special: 1,
            special_chars: "!@#$%^&*()_+-=[]{}|;:,.<>?".to_string(),
            reject_common: true,
            reject_personal_info: true,
            min_strength_score: 70,
        }
    }
}

/// Persistent store locations, relative to the data partition root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding keys, the database, and audit fallback files
    pub security_dir: String,
    /// SQLite database filename
    pub database_file: String,
    /// Secondary audit channel filename (JSON lines)
    pub audit_fallback_file: String,
    /// Master key filename
    pub master_key_file: String,
    /// Device token filename at the system partition root
    pub device_token_file: String,
    /// Audit retention window in days
    pub retention_days: u64,
    /// Bound on store transaction waits in milliseconds
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            security_dir: ".security".to_string(),
            database_file: "access.db".to_string(),
            audit_fallback_file: "audit_fallback.jsonl".to_string(),
            master_key_file: "master.key".to_string(),
            device_token_file: "device.token".to_string(),
            retention_days: 90,
            busy_timeout_ms: 2_000,
        }
    }
}

impl DeviceConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// The security directory under a resolved data partition root.
    pub fn security_dir(&self, data_root: &Path) -> PathBuf {
        data_root.join(&self.storage.security_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = DeviceConfig::default();
        assert_eq!(config.auth.max_failed_attempts, 5);
        assert!(config.partition.system_size_gb.0 < config.partition.system_size_gb.1);
        assert_ne!(config.partition.system_marker, config.partition.data_marker);
        assert!(config.policy.min_length <= config.policy.max_length);
    }

    #[test]
    fn test_from_toml_partial_override() {
        let toml_src = r#"
            [auth]
            max_failed_attempts = 3
            lockout_secs = 60
            session_idle_secs = 600
            session_max_lifetime_secs = 3600
            sweep_interval_secs = 30
        "#;
        let config: DeviceConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.auth.max_failed_attempts, 3);
        // Unspecified sections fall back to defaults
        assert_eq!(config.partition.data_marker, "orchard_data.id");
    }

    #[test]
    fn test_security_dir_is_under_data_root() {
        let config = DeviceConfig::default();
        let dir = config.security_dir(Path::new("/mnt/data"));
        assert_eq!(dir, PathBuf::from("/mnt/data/.security"));
    }
}
