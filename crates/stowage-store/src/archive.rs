//! Archive inputs for store insertion.
//!
//! The store itself never decodes archive bytes. Callers hand it an
//! [`ArchiveExtractor`] and the store decides where each archive lands
//! inside the staged implementation.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::Result;
use crate::AddProgress;

/// One archive to unpack into a staged implementation.
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    /// Archive file on disk.
    pub path: PathBuf,
    /// MIME type, e.g. `application/x-tar`.
    pub mime_type: String,
    /// Offset of the archive data within the file.
    pub start_offset: u64,
    /// Subdirectory of the implementation to unpack into; empty for the root.
    pub subdir: String,
}

impl ArchiveSource {
    pub fn new(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        ArchiveSource {
            path: path.into(),
            mime_type: mime_type.into(),
            start_offset: 0,
            subdir: String::new(),
        }
    }
}

/// Unpacks one archive format or several.
pub trait ArchiveExtractor: Send + Sync {
    /// Unpack `source` into `dest`, which already exists.
    fn extract(&self, source: &ArchiveSource, dest: &Path) -> io::Result<()>;
}

/// Reject unusable archive descriptions before any staging work.
pub(crate) fn check_archives(archives: &[ArchiveSource]) -> Result<()> {
    for archive in archives {
        if archive.path.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "archive has an empty path",
            )
            .into());
        }
    }
    Ok(())
}

/// Unpack each archive into its place under `root`, in order.
pub(crate) fn unpack_archives(
    root: &Path,
    archives: &[ArchiveSource],
    extractor: &dyn ArchiveExtractor,
    progress: &mut AddProgress,
) -> Result<()> {
    for archive in archives {
        progress.extracting(archive);
        let dest = archive_dest(root, archive)?;
        extractor.extract(archive, &dest)?;
    }
    Ok(())
}

fn archive_dest(root: &Path, archive: &ArchiveSource) -> Result<PathBuf> {
    if archive.subdir.is_empty() {
        return Ok(root.to_path_buf());
    }
    let sub = Path::new(&archive.subdir);
    if sub.is_absolute()
        || sub
            .components()
            .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("archive subdir {:?} escapes the implementation", archive.subdir),
        )
        .into());
    }
    let dest = root.join(sub);
    fs::create_dir_all(&dest)?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_archive_path_rejected() {
        let archive = ArchiveSource::new("", "application/x-tar");
        assert!(check_archives(&[archive]).is_err());

        let archive = ArchiveSource::new("/tmp/a.tar", "application/x-tar");
        assert!(check_archives(&[archive]).is_ok());
        assert!(check_archives(&[]).is_ok());
    }

    #[test]
    fn test_empty_subdir_is_the_root() {
        let root = TempDir::new().unwrap();
        let archive = ArchiveSource::new("/tmp/a.tar", "application/x-tar");
        let dest = archive_dest(root.path(), &archive).unwrap();
        assert_eq!(dest, root.path());
    }

    #[test]
    fn test_subdir_is_created() {
        let root = TempDir::new().unwrap();
        let mut archive = ArchiveSource::new("/tmp/a.tar", "application/x-tar");
        archive.subdir = "lib/native".to_string();
        let dest = archive_dest(root.path(), &archive).unwrap();
        assert_eq!(dest, root.path().join("lib/native"));
        assert!(dest.is_dir());
    }

    #[test]
    fn test_escaping_subdirs_rejected() {
        let root = TempDir::new().unwrap();
        for subdir in ["../outside", "a/../../b", "/abs"] {
            let mut archive = ArchiveSource::new("/tmp/a.tar", "application/x-tar");
            archive.subdir = subdir.to_string();
            assert!(archive_dest(root.path(), &archive).is_err(), "{subdir}");
        }
    }
}
