//! Several stores behaving as one.
//!
//! Reads return the first hit in member order. Writes try each member
//! in order and fall through stores that refuse authorization; any
//! other failure aborts immediately, because retrying elsewhere would
//! bury a real problem such as a digest mismatch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use stowage_manifest::ManifestDigest;

use crate::archive::{ArchiveExtractor, ArchiveSource};
use crate::error::{Result, StoreError};
use crate::{AddProgress, AuditIssue, Store};

pub struct StoreSet {
    stores: Vec<Arc<dyn Store>>,
}

impl StoreSet {
    pub fn new(stores: Vec<Arc<dyn Store>>) -> StoreSet {
        let mut set = StoreSet { stores: Vec::new() };
        for store in stores {
            set.push(store);
        }
        set
    }

    /// Append a member unless the same store is already present.
    pub fn push(&mut self, store: Arc<dyn Store>) {
        let duplicate = self
            .stores
            .iter()
            .any(|s| Arc::ptr_eq(s, &store) || s.path() == store.path());
        if !duplicate {
            self.stores.push(store);
        }
    }

    pub fn stores(&self) -> &[Arc<dyn Store>] {
        &self.stores
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn contains(&self, digest: &ManifestDigest) -> bool {
        self.stores.iter().any(|store| store.contains(digest))
    }

    pub fn lookup(&self, digest: &ManifestDigest) -> Result<PathBuf> {
        let best = digest.best_id()?;
        for store in &self.stores {
            match store.lookup(digest) {
                Ok(path) => return Ok(path),
                Err(StoreError::NotFound { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::NotFound { digest: best })
    }

    pub fn add_dir(
        &self,
        source: &Path,
        digest: &ManifestDigest,
        progress: &mut AddProgress,
    ) -> Result<PathBuf> {
        self.try_each(|store| store.add_dir(source, digest, progress))
    }

    pub fn add_archives(
        &self,
        archives: &[ArchiveSource],
        digest: &ManifestDigest,
        extractor: &dyn ArchiveExtractor,
        progress: &mut AddProgress,
    ) -> Result<PathBuf> {
        self.try_each(|store| store.add_archives(archives, digest, extractor, progress))
    }

    /// Remove from every member that has the implementation.
    pub fn remove(&self, digest: &ManifestDigest) -> Result<()> {
        let best = digest.best_id()?;
        let mut removed = false;
        let mut unauthorized: Option<StoreError> = None;
        for store in &self.stores {
            if !store.contains(digest) {
                continue;
            }
            match store.remove(digest) {
                Ok(()) => removed = true,
                Err(e @ StoreError::Unauthorized { .. }) => {
                    debug!(store = %store.path().display(), "store refused removal");
                    if unauthorized.is_none() {
                        unauthorized = Some(e);
                    }
                }
                // raced away between contains and remove
                Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        if removed {
            Ok(())
        } else if let Some(e) = unauthorized {
            Err(e)
        } else {
            Err(StoreError::NotFound { digest: best })
        }
    }

    /// Digests across all members, deduplicated by their best id.
    pub fn list(&self) -> Result<Vec<ManifestDigest>> {
        let mut merged = BTreeMap::new();
        for store in &self.stores {
            for digest in store.list()? {
                if let Ok(id) = digest.best_id() {
                    merged.entry(id).or_insert(digest);
                }
            }
        }
        Ok(merged.into_values().collect())
    }

    pub fn list_temp(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for store in &self.stores {
            paths.extend(store.list_temp()?);
        }
        Ok(paths)
    }

    /// Verify in the first member that has the implementation.
    pub fn verify(&self, digest: &ManifestDigest) -> Result<()> {
        for store in &self.stores {
            if store.contains(digest) {
                return store.verify(digest);
            }
        }
        Err(StoreError::NotFound {
            digest: digest.best_id()?,
        })
    }

    pub fn audit(&self) -> Result<Vec<AuditIssue>> {
        let mut issues = Vec::new();
        for store in &self.stores {
            issues.extend(store.audit()?);
        }
        Ok(issues)
    }

    /// Run `op` against each member in order. Unauthorized members are
    /// skipped; the first such refusal is what callers see when no
    /// member accepts.
    fn try_each<T>(&self, mut op: impl FnMut(&dyn Store) -> Result<T>) -> Result<T> {
        let mut unauthorized: Option<StoreError> = None;
        for store in &self.stores {
            match op(store.as_ref()) {
                Ok(value) => return Ok(value),
                Err(e @ StoreError::Unauthorized { .. }) => {
                    debug!(store = %store.path().display(), "store refused write, trying next");
                    if unauthorized.is_none() {
                        unauthorized = Some(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(unauthorized.unwrap_or(StoreError::Unauthorized { inner: None }))
    }
}
