//! Flag sidecars for filesystems that cannot represent the real thing.
//!
//! A tree may carry two optional hidden files next to `.manifest`:
//! `.xbit` lists tree-absolute paths that must hash as executable even
//! when the filesystem has no executable bit, and `.symlink` lists
//! regular files whose content is actually a symlink target. Both are
//! newline-separated and only honored at the tree root.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Marks paths to hash as executable files.
pub const XBIT_FILE: &str = ".xbit";
/// Marks regular files to hash as symlinks over their content.
pub const SYMLINK_FILE: &str = ".symlink";

/// Read one flag file into a set of tree-absolute paths.
///
/// A missing file yields an empty set. Lines that do not start with
/// `/` are ignored.
pub fn read_flag_file(dir: &Path, name: &str) -> io::Result<HashSet<String>> {
    let text = match fs::read_to_string(dir.join(name)) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e),
    };
    Ok(text
        .lines()
        .filter(|line| line.starts_with('/'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_flag_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let set = read_flag_file(dir.path(), XBIT_FILE).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_reads_absolute_paths_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(XBIT_FILE), "/bin/tool\nnot-absolute\n\n/other\n").unwrap();
        let set = read_flag_file(dir.path(), XBIT_FILE).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("/bin/tool"));
        assert!(set.contains("/other"));
    }
}
