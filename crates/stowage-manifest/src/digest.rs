//! Implementation digests spanning multiple hash algorithms.

use std::fmt;

use crate::error::{Error, Result};
use crate::format::ManifestFormat;

/// The digests of one implementation, at most one per algorithm.
///
/// A digest ID has the form `<prefix>=<hex>` and doubles as the store
/// directory name of the implementation it identifies. ID strings may
/// carry several comma-separated digests; unrecognized prefixes are
/// skipped so newer algorithms do not break older parsers.
///
/// An empty digest is valid to construct and pass around. Operations
/// that need at least one algorithm fail with [`Error::NoKnownDigest`]
/// when they get an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ManifestDigest {
    /// SHA-1 over the old manifest dialect.
    pub sha1: Option<String>,
    /// SHA-1 over the new manifest dialect.
    pub sha1_new: Option<String>,
    /// SHA-256 over the new manifest dialect.
    pub sha256: Option<String>,
}

impl ManifestDigest {
    /// Extract every recognized `prefix=hex` pair from an ID string.
    pub fn parse(id: &str) -> Self {
        let mut digest = Self::default();
        digest.parse_into(id);
        digest
    }

    /// Merge recognized digests from `id` into `self`.
    ///
    /// Already populated fields keep their value; the first occurrence of
    /// a prefix wins.
    pub fn parse_into(&mut self, id: &str) {
        for part in id.split(',') {
            let Some((prefix, hex)) = part.split_once('=') else {
                continue;
            };
            if hex.is_empty() {
                continue;
            }
            let slot = match prefix {
                "sha1" => &mut self.sha1,
                "sha1new" => &mut self.sha1_new,
                "sha256" => &mut self.sha256,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(hex.to_string());
            }
        }
    }

    /// True when no algorithm field is populated.
    pub fn is_empty(&self) -> bool {
        self.sha1.is_none() && self.sha1_new.is_none() && self.sha256.is_none()
    }

    /// Hex value for one specific format, when present.
    pub fn get(&self, format: ManifestFormat) -> Option<&str> {
        match format {
            ManifestFormat::Sha1 => self.sha1.as_deref(),
            ManifestFormat::Sha1New => self.sha1_new.as_deref(),
            ManifestFormat::Sha256 => self.sha256.as_deref(),
        }
    }

    pub fn set(&mut self, format: ManifestFormat, hex: String) {
        match format {
            ManifestFormat::Sha1 => self.sha1 = Some(hex),
            ManifestFormat::Sha1New => self.sha1_new = Some(hex),
            ManifestFormat::Sha256 => self.sha256 = Some(hex),
        }
    }

    /// The strongest populated digest: SHA-256, then SHA-1 over the new
    /// dialect, then legacy SHA-1.
    pub fn best(&self) -> Option<(ManifestFormat, &str)> {
        ManifestFormat::ALL
            .into_iter()
            .find_map(|format| self.get(format).map(|hex| (format, hex)))
    }

    /// Format of the best digest.
    pub fn best_format(&self) -> Result<ManifestFormat> {
        self.best().map(|(format, _)| format).ok_or(Error::NoKnownDigest)
    }

    /// ID form of the best digest, e.g. `sha256=3f29...`.
    pub fn best_id(&self) -> Result<String> {
        match self.best() {
            Some((format, hex)) => Ok(format!("{}={}", format.prefix(), hex)),
            None => Err(Error::NoKnownDigest),
        }
    }

    /// All populated digest IDs, strongest first.
    pub fn available(&self) -> Vec<String> {
        ManifestFormat::ALL
            .into_iter()
            .filter_map(|format| {
                self.get(format)
                    .map(|hex| format!("{}={}", format.prefix(), hex))
            })
            .collect()
    }

    /// True when any algorithm populated in both digests agrees.
    pub fn matches(&self, other: &ManifestDigest) -> bool {
        ManifestFormat::ALL
            .into_iter()
            .any(|format| match (self.get(format), other.get(format)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            })
    }
}

impl fmt::Display for ManifestDigest {
    /// Comma-separated list of the available digest IDs, strongest first.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.available().join(","))
    }
}
