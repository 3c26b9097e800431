//! Manifest formats and their hash algorithms.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Line syntax and traversal order of a manifest format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Files and directories in one sorted sequence; `D` lines carry an
    /// mtime. Frozen, kept for verifying old implementations.
    Old,
    /// Files before subdirectories; `D` lines carry only the path.
    New,
}

/// A manifest serialization format, named by its digest prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestFormat {
    /// SHA-1 over the old dialect.
    Sha1,
    /// SHA-1 over the new dialect.
    Sha1New,
    /// SHA-256 over the new dialect.
    Sha256,
}

impl ManifestFormat {
    /// Formats to generate digests for when adding new implementations,
    /// strongest first.
    pub const RECOMMENDED: [ManifestFormat; 2] = [ManifestFormat::Sha256, ManifestFormat::Sha1New];

    /// Every supported format, strongest first.
    pub const ALL: [ManifestFormat; 3] = [
        ManifestFormat::Sha256,
        ManifestFormat::Sha1New,
        ManifestFormat::Sha1,
    ];

    /// The digest ID prefix, e.g. `sha256` in `sha256=3f29...`.
    pub fn prefix(self) -> &'static str {
        match self {
            ManifestFormat::Sha1 => "sha1",
            ManifestFormat::Sha1New => "sha1new",
            ManifestFormat::Sha256 => "sha256",
        }
    }

    /// Look a format up by its digest prefix.
    pub fn from_prefix(prefix: &str) -> Result<Self> {
        match prefix {
            "sha1" => Ok(ManifestFormat::Sha1),
            "sha1new" => Ok(ManifestFormat::Sha1New),
            "sha256" => Ok(ManifestFormat::Sha256),
            _ => Err(Error::UnknownFormat {
                prefix: prefix.to_string(),
            }),
        }
    }

    pub fn dialect(self) -> Dialect {
        match self {
            ManifestFormat::Sha1 => Dialect::Old,
            ManifestFormat::Sha1New | ManifestFormat::Sha256 => Dialect::New,
        }
    }

    /// Lowercase hex digest of `data` with this format's algorithm.
    pub fn hash_bytes(self, data: &[u8]) -> String {
        match self {
            ManifestFormat::Sha1 | ManifestFormat::Sha1New => hex::encode(Sha1::digest(data)),
            ManifestFormat::Sha256 => hex::encode(Sha256::digest(data)),
        }
    }

    /// Streaming digest of a reader, for hashing file contents.
    pub fn hash_reader(self, reader: impl Read) -> io::Result<String> {
        match self {
            ManifestFormat::Sha1 | ManifestFormat::Sha1New => hash_stream::<Sha1>(reader),
            ManifestFormat::Sha256 => hash_stream::<Sha256>(reader),
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for ManifestFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_prefix(s)
    }
}

fn hash_stream<D: Digest>(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
