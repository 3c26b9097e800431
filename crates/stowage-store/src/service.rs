//! Store access mediated by the privileged system service.
//!
//! Reads go straight to the backing directory, which any user can
//! open. Writes are submitted over the service socket; the service
//! re-verifies the tree itself and is the only party that ever touches
//! the store directory. A missing service maps to
//! [`StoreError::Unauthorized`] so a [`crate::StoreSet`] can fall back
//! to a user-owned store.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use stowage_ipc::client::ServiceClient;
use stowage_ipc::{ErrorKind as WireErrorKind, IpcError, Request, Response};
use stowage_manifest::{Error as ManifestError, ManifestDigest};

use crate::archive::{unpack_archives, ArchiveExtractor, ArchiveSource};
use crate::directory::DirectoryStore;
use crate::error::{Result, StoreError};
use crate::{AddProgress, AuditIssue, Store};

pub struct ServiceStore {
    backing: DirectoryStore,
    socket: PathBuf,
}

impl ServiceStore {
    pub fn new(root: impl AsRef<Path>, socket: impl Into<PathBuf>) -> Result<ServiceStore> {
        Ok(ServiceStore {
            backing: DirectoryStore::new(root)?,
            socket: socket.into(),
        })
    }

    fn request(&self, request: &Request) -> Result<Response> {
        let mut client = match ServiceClient::connect(&self.socket) {
            Ok(client) => client,
            Err(e) => {
                debug!(socket = %self.socket.display(), error = %e, "service unreachable");
                return Err(StoreError::Unauthorized {
                    inner: Some(Box::new(StoreError::Ipc(e))),
                });
            }
        };
        Ok(client.request(request)?)
    }
}

impl Store for ServiceStore {
    fn path(&self) -> &Path {
        self.backing.path()
    }

    fn lookup(&self, digest: &ManifestDigest) -> Result<PathBuf> {
        self.backing.lookup(digest)
    }

    fn add_dir(
        &self,
        source: &Path,
        digest: &ManifestDigest,
        _progress: &mut AddProgress,
    ) -> Result<PathBuf> {
        let digest_id = digest.best_id()?;
        // the service resolves the path from its own working directory
        let source = source.canonicalize()?;
        debug!(digest = %digest_id, "submitting add to service");
        match self.request(&Request::AddDirectory { source, digest_id })? {
            Response::Added { path } => Ok(path),
            Response::Error { kind, message } => Err(error_from_wire(kind, message)),
            _ => Err(StoreError::Ipc(IpcError::UnexpectedResponse)),
        }
    }

    fn add_archives(
        &self,
        archives: &[ArchiveSource],
        digest: &ManifestDigest,
        extractor: &dyn ArchiveExtractor,
        progress: &mut AddProgress,
    ) -> Result<PathBuf> {
        // unpack locally, then hand the finished tree to the service
        crate::archive::check_archives(archives)?;
        let stage = tempfile::tempdir()?;
        unpack_archives(stage.path(), archives, extractor, progress)?;
        self.add_dir(stage.path(), digest, progress)
    }

    fn remove(&self, digest: &ManifestDigest) -> Result<()> {
        let digest_id = digest.best_id()?;
        debug!(digest = %digest_id, "submitting removal to service");
        match self.request(&Request::Remove { digest_id })? {
            Response::Removed => Ok(()),
            Response::Error { kind, message } => Err(error_from_wire(kind, message)),
            _ => Err(StoreError::Ipc(IpcError::UnexpectedResponse)),
        }
    }

    fn list(&self) -> Result<Vec<ManifestDigest>> {
        self.backing.list()
    }

    fn list_temp(&self) -> Result<Vec<PathBuf>> {
        self.backing.list_temp()
    }

    fn verify(&self, digest: &ManifestDigest) -> Result<()> {
        self.backing.verify(digest)
    }

    fn audit(&self) -> Result<Vec<AuditIssue>> {
        self.backing.audit()
    }
}

/// Flatten a store failure into its wire form.
pub fn error_to_wire(error: &StoreError) -> (WireErrorKind, String) {
    let message = error.to_string();
    let kind = match error {
        StoreError::Manifest(ManifestError::NoKnownDigest) => WireErrorKind::NoKnownDigest,
        StoreError::Manifest(ManifestError::UnknownFormat { prefix }) => {
            WireErrorKind::UnknownFormat {
                prefix: prefix.clone(),
            }
        }
        StoreError::Manifest(ManifestError::Malformed { line, reason }) => {
            WireErrorKind::Malformed {
                line: *line,
                reason: reason.clone(),
            }
        }
        StoreError::Manifest(ManifestError::InvalidNode { reason }) => WireErrorKind::InvalidNode {
            reason: reason.clone(),
        },
        StoreError::Manifest(ManifestError::UnsupportedEntryType { path }) => {
            WireErrorKind::UnsupportedEntryType { path: path.clone() }
        }
        StoreError::AlreadyInStore { digest } => WireErrorKind::AlreadyInStore {
            digest: digest.clone(),
        },
        StoreError::NotFound { digest } => WireErrorKind::NotFound {
            digest: digest.clone(),
        },
        StoreError::DigestMismatch {
            expected,
            actual,
            manifest,
        } => WireErrorKind::DigestMismatch {
            expected: expected.clone(),
            actual: actual.clone(),
            manifest: manifest.clone(),
        },
        StoreError::TimeAccuracy { path, wanted, got } => WireErrorKind::TimeAccuracy {
            path: path.clone(),
            wanted: *wanted,
            got: *got,
        },
        StoreError::Unauthorized { .. } => WireErrorKind::Unauthorized,
        StoreError::Io(_) | StoreError::Manifest(ManifestError::Io(_)) | StoreError::Ipc(_) => {
            WireErrorKind::Other
        }
    };
    (kind, message)
}

/// Rebuild a typed store failure from its wire form.
pub fn error_from_wire(kind: WireErrorKind, message: String) -> StoreError {
    match kind {
        WireErrorKind::NoKnownDigest => ManifestError::NoKnownDigest.into(),
        WireErrorKind::UnknownFormat { prefix } => ManifestError::UnknownFormat { prefix }.into(),
        WireErrorKind::Malformed { line, reason } => ManifestError::Malformed { line, reason }.into(),
        WireErrorKind::InvalidNode { reason } => ManifestError::InvalidNode { reason }.into(),
        WireErrorKind::UnsupportedEntryType { path } => {
            ManifestError::UnsupportedEntryType { path }.into()
        }
        WireErrorKind::AlreadyInStore { digest } => StoreError::AlreadyInStore { digest },
        WireErrorKind::NotFound { digest } => StoreError::NotFound { digest },
        WireErrorKind::DigestMismatch {
            expected,
            actual,
            manifest,
        } => StoreError::DigestMismatch {
            expected,
            actual,
            manifest,
        },
        WireErrorKind::TimeAccuracy { path, wanted, got } => {
            StoreError::TimeAccuracy { path, wanted, got }
        }
        WireErrorKind::Unauthorized => StoreError::Unauthorized { inner: None },
        WireErrorKind::Other => StoreError::Io(io::Error::other(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_survive_the_wire() {
        let original = StoreError::DigestMismatch {
            expected: "sha256=abc".to_string(),
            actual: "sha256=def".to_string(),
            manifest: "D /sub\n".to_string(),
        };
        let (kind, message) = error_to_wire(&original);
        assert!(message.contains("sha256=abc"));
        let rebuilt = error_from_wire(kind, message);
        match rebuilt {
            StoreError::DigestMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, "sha256=abc");
                assert_eq!(actual, "sha256=def");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_io_details_collapse_to_other() {
        let original = StoreError::Io(io::Error::other("backend exploded"));
        let (kind, message) = error_to_wire(&original);
        assert_eq!(kind, WireErrorKind::Other);
        let rebuilt = error_from_wire(kind, message);
        assert!(rebuilt.to_string().contains("backend exploded"));
    }
}
