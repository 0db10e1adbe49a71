//! Non-destructive writability probe.

use rand::Rng;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::warn;

/// Empirically test whether a volume is writable.
///
/// Creates and immediately deletes a uniquely named dotfile at the volume
/// root. Any failure — permission, read-only filesystem, device error —
/// classifies the volume as read-only.
pub fn write_probe(mount_point: &Path) -> bool {
    let nonce: u32 = rand::thread_rng().gen();
    let name = format!(".orchard_probe_{}_{:08x}", std::process::id(), nonce);
    let path = mount_point.join(name);

    match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => {
            drop(file);
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Probe file could not be removed");
            }
            true
        }
        Err(_) => false,
    }
}

/// Classify writability from the probe, cross-checked against the
/// OS-reported mount flag when available.
///
/// The empirical probe is authoritative. A disagreement with the OS flag is
/// logged as a warning but does not by itself fail verification.
pub fn classify_read_only(mount_point: &Path, os_flag: Option<bool>) -> bool {
    let writable = write_probe(mount_point);
    if let Some(flag_read_only) = os_flag {
        if flag_read_only == writable {
            warn!(
                mount_point = %mount_point.display(),
                os_read_only = flag_read_only,
                probe_writable = writable,
                "OS mount flag disagrees with write-probe result"
            );
        }
    }
    !writable
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_probe_succeeds_on_writable_dir() {
        let dir = TempDir::new().unwrap();
        assert!(write_probe(dir.path()));
        // Probe file must be gone afterwards
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_probe_fails_on_missing_dir() {
        assert!(!write_probe(Path::new("/definitely/not/a/volume")));
    }

    #[test]
    fn test_classify_prefers_probe() {
        let dir = TempDir::new().unwrap();
        // OS claims read-only, probe says writable: probe wins, warning logged
        assert!(!classify_read_only(dir.path(), Some(true)));
        assert!(!classify_read_only(dir.path(), None));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_fails_on_readonly_dir() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let mut perms = std::fs::metadata(dir.path()).unwrap().permissions();
        perms.set_mode(0o555);
        std::fs::set_permissions(dir.path(), perms).unwrap();

        if write_probe(dir.path()) {
            // Privileged users bypass permission bits; nothing to observe here
            return;
        }
        assert!(classify_read_only(dir.path(), Some(true)));

        let mut perms = std::fs::metadata(dir.path()).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(dir.path(), perms).unwrap();
    }
}
