//! Write protection for stored trees.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use walkdir::WalkDir;

const WRITE_BITS: u32 = (libc::S_IWUSR | libc::S_IWGRP | libc::S_IWOTH) as u32;
const USER_WRITE: u32 = libc::S_IWUSR as u32;

/// Clear every write bit under `root`, the root itself included.
pub fn protect_tree(root: &Path) -> io::Result<()> {
    chmod_tree(root, |mode| mode & !WRITE_BITS)
}

/// Restore user write under `root` so its entries can be unlinked.
pub fn unprotect_tree(root: &Path) -> io::Result<()> {
    chmod_tree(root, |mode| mode | USER_WRITE)
}

fn chmod_tree(root: &Path, adjust: impl Fn(u32) -> u32) -> io::Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::other)?;
        // chmod follows symlinks and would touch the target instead
        if entry.file_type().is_symlink() {
            continue;
        }
        let mode = entry.metadata().map_err(io::Error::other)?.permissions().mode();
        let adjusted = adjust(mode);
        if adjusted != mode {
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(adjusted))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_protect_and_unprotect() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let file = sub.join("file.txt");
        fs::write(&file, "x").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();
        fs::set_permissions(&sub, fs::Permissions::from_mode(0o755)).unwrap();

        protect_tree(dir.path()).unwrap();
        assert_eq!(mode_of(&file) & 0o222, 0);
        assert_eq!(mode_of(&sub) & 0o222, 0);

        unprotect_tree(dir.path()).unwrap();
        assert_ne!(mode_of(&file) & 0o200, 0);
        assert_ne!(mode_of(&sub) & 0o200, 0);
    }

    #[test]
    fn test_symlink_target_untouched() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let target = outside.path().join("target.txt");
        fs::write(&target, "x").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o644)).unwrap();
        symlink(&target, dir.path().join("link")).unwrap();

        protect_tree(dir.path()).unwrap();
        assert_eq!(mode_of(&target), 0o644);
    }
}
