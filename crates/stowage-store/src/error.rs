use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Manifest(#[from] stowage_manifest::Error),

    #[error("implementation {digest} is already in the store")]
    AlreadyInStore { digest: String },

    #[error("implementation {digest} not found")]
    NotFound { digest: String },

    #[error("digest mismatch: expected {expected}, hashed {actual}")]
    DigestMismatch {
        expected: String,
        actual: String,
        /// Text of the manifest that produced `actual`.
        manifest: String,
    },

    #[error("filesystem at {} does not preserve mtimes (wrote {wanted}, read back {got})", .path.display())]
    TimeAccuracy { path: PathBuf, wanted: i64, got: i64 },

    #[error("not authorized to modify this store")]
    Unauthorized {
        #[source]
        inner: Option<Box<StoreError>>,
    },

    #[error("service communication failed: {0}")]
    Ipc(#[from] stowage_ipc::IpcError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub(crate) fn unauthorized(e: io::Error) -> StoreError {
    StoreError::Unauthorized {
        inner: Some(Box::new(e.into())),
    }
}
