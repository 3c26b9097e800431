//! On-disk store backed by a single directory.
//!
//! Each implementation lives in an immutable subdirectory named after
//! its digest, e.g. `sha256=8290a8…`. Insertion happens in a staging
//! directory and is published with one `rename`, so concurrent writers
//! need no locks: the first rename wins and everyone else learns the
//! implementation is already present.

use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;
use tracing::{info, instrument, warn};

use stowage_manifest::{Manifest, ManifestDigest};

use crate::archive::{unpack_archives, ArchiveExtractor, ArchiveSource};
use crate::error::{unauthorized, Result, StoreError};
use crate::probe::check_time_accuracy;
use crate::protection::{protect_tree, unprotect_tree};
use crate::{AddProgress, AuditIssue, Store};

#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open the store at `root`, creating the directory when absent.
    pub fn new(root: impl AsRef<Path>) -> Result<DirectoryStore> {
        let root = root.as_ref();
        if let Err(e) = fs::create_dir_all(root) {
            if e.kind() == io::ErrorKind::PermissionDenied {
                return Err(unauthorized(e));
            }
            return Err(e.into());
        }
        let root = root.canonicalize()?;
        check_time_accuracy(&root)?;
        Ok(DirectoryStore { root })
    }

    /// Verify an arbitrary directory against `digest`, returning the
    /// freshly generated manifest.
    pub fn verify_directory(dir: &Path, digest: &ManifestDigest) -> Result<Manifest> {
        let format = digest.best_format()?;
        let expected = digest.best_id()?;
        let manifest = Manifest::generate(format, dir)?;
        let actual = manifest.digest();
        if actual != expected {
            return Err(StoreError::DigestMismatch {
                expected,
                actual,
                manifest: manifest.to_string(),
            });
        }
        Ok(manifest)
    }

    /// Directory of the implementation under any of the digest's ids.
    fn find_any(&self, digest: &ManifestDigest) -> Option<PathBuf> {
        for id in digest.available() {
            let dir = self.root.join(&id);
            if dir.is_dir() {
                return Some(dir);
            }
        }
        None
    }

    /// Directory entries of the store root, sorted by name.
    fn entry_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn stage_dir(&self) -> Result<TempDir> {
        match tempfile::Builder::new().prefix("stage-").tempdir_in(&self.root) {
            Ok(stage) => Ok(stage),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Err(unauthorized(e)),
            Err(e) => Err(e.into()),
        }
    }

    /// Hash the staged tree, compare against the requested digest and
    /// publish it. The staging directory is reclaimed on any failure.
    fn verify_and_commit(
        &self,
        stage: TempDir,
        digest: &ManifestDigest,
        expected: &str,
        progress: &mut AddProgress,
    ) -> Result<PathBuf> {
        let format = digest.best_format()?;
        let manifest = match progress.on_hash.as_mut() {
            Some(on_hash) => Manifest::generate_with_progress(format, stage.path(), on_hash)?,
            None => Manifest::generate(format, stage.path())?,
        };
        let actual = manifest.digest();
        if actual != expected {
            return Err(StoreError::DigestMismatch {
                expected: expected.to_string(),
                actual,
                manifest: manifest.to_string(),
            });
        }
        manifest.save(stage.path())?;
        self.commit(stage, expected)
    }

    fn commit(&self, stage: TempDir, digest_id: &str) -> Result<PathBuf> {
        let target = self.root.join(digest_id);
        // cheap recheck; the rename below is what actually decides
        if target.exists() {
            return Err(StoreError::AlreadyInStore {
                digest: digest_id.to_string(),
            });
        }
        if let Err(e) = fs::rename(stage.path(), &target) {
            return Err(if rename_target_exists(&e) {
                StoreError::AlreadyInStore {
                    digest: digest_id.to_string(),
                }
            } else if e.kind() == io::ErrorKind::PermissionDenied {
                unauthorized(e)
            } else {
                e.into()
            });
        }
        let _ = stage.keep();
        if let Err(e) = protect_tree(&target) {
            warn!(
                path = %target.display(),
                error = %e,
                "failed to write-protect stored implementation"
            );
        }
        info!(digest = digest_id, path = %target.display(), "implementation stored");
        Ok(target)
    }
}

/// Renaming onto an existing non-empty directory fails with `EEXIST` or
/// `ENOTEMPTY` depending on the filesystem.
fn rename_target_exists(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::AlreadyExists
        || matches!(e.raw_os_error(), Some(libc::EEXIST) | Some(libc::ENOTEMPTY))
}

/// Copy `source` into the empty directory `dest`, preserving symlinks,
/// permission bits and modification times.
fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    copy_children(source, dest)?;
    let mtime = FileTime::from_last_modification_time(&fs::metadata(source)?);
    set_file_mtime(dest, mtime)?;
    Ok(())
}

fn copy_children(source: &Path, dest: &Path) -> Result<()> {
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dest.join(entry.file_name());
        if file_type.is_dir() {
            fs::create_dir(&target)?;
            copy_children(&entry.path(), &target)?;
            // stamp after the children, creating them bumps the mtime
            let mtime = FileTime::from_last_modification_time(&entry.metadata()?);
            set_file_mtime(&target, mtime)?;
        } else if file_type.is_symlink() {
            symlink(fs::read_link(entry.path())?, &target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
            let mtime = FileTime::from_last_modification_time(&entry.metadata()?);
            set_file_mtime(&target, mtime)?;
        } else {
            return Err(stowage_manifest::Error::UnsupportedEntryType {
                path: entry.path(),
            }
            .into());
        }
    }
    Ok(())
}

impl Store for DirectoryStore {
    fn path(&self) -> &Path {
        &self.root
    }

    fn lookup(&self, digest: &ManifestDigest) -> Result<PathBuf> {
        let best = digest.best_id()?;
        self.find_any(digest)
            .ok_or(StoreError::NotFound { digest: best })
    }

    #[instrument(skip(self, progress), level = "debug")]
    fn add_dir(
        &self,
        source: &Path,
        digest: &ManifestDigest,
        progress: &mut AddProgress,
    ) -> Result<PathBuf> {
        let expected = digest.best_id()?;
        if self.find_any(digest).is_some() {
            return Err(StoreError::AlreadyInStore { digest: expected });
        }
        let stage = self.stage_dir()?;
        copy_tree(source, stage.path())?;
        self.verify_and_commit(stage, digest, &expected, progress)
    }

    #[instrument(skip(self, extractor, progress), level = "debug")]
    fn add_archives(
        &self,
        archives: &[ArchiveSource],
        digest: &ManifestDigest,
        extractor: &dyn ArchiveExtractor,
        progress: &mut AddProgress,
    ) -> Result<PathBuf> {
        let expected = digest.best_id()?;
        crate::archive::check_archives(archives)?;
        if self.find_any(digest).is_some() {
            return Err(StoreError::AlreadyInStore { digest: expected });
        }
        let stage = self.stage_dir()?;
        unpack_archives(stage.path(), archives, extractor, progress)?;
        self.verify_and_commit(stage, digest, &expected, progress)
    }

    #[instrument(skip(self), level = "debug")]
    fn remove(&self, digest: &ManifestDigest) -> Result<()> {
        let best = digest.best_id()?;
        let Some(dir) = self.find_any(digest) else {
            return Err(StoreError::NotFound { digest: best });
        };
        let trash = match tempfile::Builder::new()
            .prefix("removing-")
            .tempdir_in(&self.root)
        {
            Ok(trash) => trash,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => return Err(unauthorized(e)),
            Err(e) => return Err(e.into()),
        };
        // move out of sight first, then delete at leisure
        let moved = trash.path().join("impl");
        if let Err(e) = fs::rename(&dir, &moved) {
            return Err(match e.kind() {
                io::ErrorKind::NotFound => StoreError::NotFound { digest: best },
                io::ErrorKind::PermissionDenied => unauthorized(e),
                _ => e.into(),
            });
        }
        unprotect_tree(&moved)?;
        trash.close()?;
        info!(digest = best, "implementation removed");
        Ok(())
    }

    fn list(&self) -> Result<Vec<ManifestDigest>> {
        let mut digests = Vec::new();
        for name in self.entry_names()? {
            if !name.contains('=') {
                continue;
            }
            let digest = ManifestDigest::parse(&name);
            if !digest.is_empty() {
                digests.push(digest);
            }
        }
        Ok(digests)
    }

    fn list_temp(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .entry_names()?
            .into_iter()
            .filter(|name| !name.contains('='))
            .map(|name| self.root.join(name))
            .collect())
    }

    fn verify(&self, digest: &ManifestDigest) -> Result<()> {
        let best = digest.best_id()?;
        let dir = self
            .find_any(digest)
            .ok_or(StoreError::NotFound { digest: best })?;
        Self::verify_directory(&dir, digest)?;
        Ok(())
    }

    fn audit(&self) -> Result<Vec<AuditIssue>> {
        let mut issues = Vec::new();
        for digest in self.list()? {
            if let Err(error) = self.verify(&digest) {
                issues.push(AuditIssue {
                    digest: digest.best_id()?,
                    error,
                });
            }
        }
        Ok(issues)
    }
}
