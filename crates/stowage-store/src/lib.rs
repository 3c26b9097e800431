//! # stowage-store
//!
//! Content-addressed storage for implementation directories.
//!
//! An implementation is an immutable directory tree named by the digest
//! of its manifest. [`DirectoryStore`] manages one store directory,
//! [`StoreSet`] layers several with ordered write fallback, and
//! [`ServiceStore`] funnels writes through the privileged system
//! service so machine-wide stores stay root-owned.

use std::path::{Path, PathBuf};

use stowage_manifest::{Manifest, ManifestDigest, ManifestFormat};

mod archive;
mod directory;
mod error;
mod probe;
mod protection;
mod service;
mod set;

pub use archive::{ArchiveExtractor, ArchiveSource};
pub use directory::DirectoryStore;
pub use error::{Result, StoreError};
pub use protection::{protect_tree, unprotect_tree};
pub use service::{error_from_wire, error_to_wire, ServiceStore};
pub use set::StoreSet;

/// A place implementations can be fetched from and inserted into.
pub trait Store: Send + Sync {
    /// Store location, used for display and for deduplication.
    fn path(&self) -> &Path;

    /// Whether the implementation is present.
    fn contains(&self, digest: &ManifestDigest) -> bool {
        self.lookup(digest).is_ok()
    }

    /// Path of a stored implementation.
    fn lookup(&self, digest: &ManifestDigest) -> Result<PathBuf>;

    /// Copy `source`, verify it against `digest` and store it.
    fn add_dir(
        &self,
        source: &Path,
        digest: &ManifestDigest,
        progress: &mut AddProgress,
    ) -> Result<PathBuf>;

    /// Unpack archives, verify the result against `digest` and store it.
    fn add_archives(
        &self,
        archives: &[ArchiveSource],
        digest: &ManifestDigest,
        extractor: &dyn ArchiveExtractor,
        progress: &mut AddProgress,
    ) -> Result<PathBuf>;

    /// Delete a stored implementation.
    fn remove(&self, digest: &ManifestDigest) -> Result<()>;

    /// Digests of every stored implementation.
    fn list(&self) -> Result<Vec<ManifestDigest>>;

    /// Leftover staging directories.
    fn list_temp(&self) -> Result<Vec<PathBuf>>;

    /// Re-hash one stored implementation and compare digests.
    fn verify(&self, digest: &ManifestDigest) -> Result<()>;

    /// Verify every stored implementation, collecting the failures.
    fn audit(&self) -> Result<Vec<AuditIssue>>;
}

/// Progress callbacks for long-running store operations.
#[derive(Default)]
pub struct AddProgress<'a> {
    /// Called before each archive is unpacked.
    pub on_extract: Option<&'a mut dyn FnMut(&ArchiveSource)>,
    /// Called after each file is hashed, with its size in bytes.
    pub on_hash: Option<&'a mut dyn FnMut(&Path, u64)>,
}

impl AddProgress<'_> {
    pub(crate) fn extracting(&mut self, archive: &ArchiveSource) {
        if let Some(on_extract) = self.on_extract.as_mut() {
            on_extract(archive);
        }
    }
}

/// One failed implementation found by [`Store::audit`].
#[derive(Debug)]
pub struct AuditIssue {
    pub digest: String,
    pub error: StoreError,
}

/// Compute every recommended digest of `dir`.
pub fn digest_directory(dir: &Path) -> Result<ManifestDigest> {
    let mut digest = ManifestDigest::default();
    for format in ManifestFormat::RECOMMENDED {
        let manifest = Manifest::generate(format, dir)?;
        digest.parse_into(&manifest.digest());
    }
    Ok(digest)
}
