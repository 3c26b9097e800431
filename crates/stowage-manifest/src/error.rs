use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while generating, parsing, or hashing manifests.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no known digest method available")]
    NoKnownDigest,

    #[error("unknown manifest format prefix: {prefix:?}")]
    UnknownFormat { prefix: String },

    #[error("malformed manifest at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("invalid manifest node: {reason}")]
    InvalidNode { reason: String },

    #[error("cannot represent entry of unsupported type: {}", .path.display())]
    UnsupportedEntryType { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;
