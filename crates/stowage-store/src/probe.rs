//! Mtime fidelity probe.
//!
//! Manifests embed exact modification times, so a store on a
//! filesystem that rounds or truncates them would corrupt every digest
//! it verifies. Probing once at startup turns that into a clear error
//! instead of baffling mismatches later.

use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use filetime::{set_file_mtime, FileTime};
use tracing::debug;

use crate::error::{Result, StoreError};

const PROBE_FILE: &str = ".time-probe";
/// An odd second in the past; rounding filesystems will not return it.
const PROBE_MTIME: i64 = 1_566_667_177;

/// Verify the filesystem under `root` stores mtimes exactly.
///
/// Unwritable stores skip the probe; they are still readable and their
/// contents were checked when written.
pub(crate) fn check_time_accuracy(root: &Path) -> Result<()> {
    let probe = root.join(PROBE_FILE);
    if let Err(e) = fs::write(&probe, b"probe") {
        if e.kind() == io::ErrorKind::PermissionDenied || e.raw_os_error() == Some(libc::EROFS) {
            debug!(root = %root.display(), "store not writable, skipping mtime probe");
            return Ok(());
        }
        return Err(e.into());
    }
    let result = probe_mtime(&probe, root);
    let _ = fs::remove_file(&probe);
    result
}

fn probe_mtime(probe: &Path, root: &Path) -> Result<()> {
    set_file_mtime(probe, FileTime::from_unix_time(PROBE_MTIME, 0))?;
    let got = fs::metadata(probe)?.mtime();
    if got != PROBE_MTIME {
        return Err(StoreError::TimeAccuracy {
            path: root.to_path_buf(),
            wanted: PROBE_MTIME,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_probe_passes_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        check_time_accuracy(dir.path()).unwrap();
        assert!(!dir.path().join(PROBE_FILE).exists());
    }
}
