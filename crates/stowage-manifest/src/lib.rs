//! # stowage-manifest
//!
//! Canonical manifests for implementation directories.
//!
//! A manifest lists every entry of a directory tree in a reproducible
//! order, one line per entry. The tree's digest is a cryptographic hash
//! over the serialized manifest text, so two trees with the same
//! manifest are the same implementation no matter where or when they
//! were unpacked.

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::debug;

mod digest;
mod error;
mod flags;
mod format;
mod generate;
mod node;

pub use digest::ManifestDigest;
pub use error::{Error, Result};
pub use flags::{read_flag_file, SYMLINK_FILE, XBIT_FILE};
pub use format::{Dialect, ManifestFormat};
pub use node::ManifestNode;

use generate::Generator;

/// Name of the hidden manifest file inside a stored implementation.
pub const MANIFEST_FILE: &str = ".manifest";

/// A parsed or freshly generated manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    format: ManifestFormat,
    nodes: Vec<ManifestNode>,
}

impl PartialEq for Manifest {
    /// Manifests are equal when they serialize to the same entries.
    /// Directory mtimes are not part of the new dialect's lines, so a
    /// generated manifest equals its own parsed serialization.
    fn eq(&self, other: &Self) -> bool {
        let (da, db) = (self.format.dialect(), other.format.dialect());
        self.nodes.len() == other.nodes.len()
            && self
                .nodes
                .iter()
                .zip(&other.nodes)
                .all(|(a, b)| a.line(da) == b.line(db))
    }
}

impl Eq for Manifest {}

impl Manifest {
    /// Generate a manifest by walking `root`.
    pub fn generate(format: ManifestFormat, root: &Path) -> Result<Manifest> {
        Self::build(format, root, None)
    }

    /// Generate a manifest, reporting each hashed file to `on_file`.
    pub fn generate_with_progress(
        format: ManifestFormat,
        root: &Path,
        on_file: &mut dyn FnMut(&Path, u64),
    ) -> Result<Manifest> {
        Self::build(format, root, Some(on_file))
    }

    // root and the callback flow into Generator together, so they must
    // share a lifetime
    fn build<'a>(
        format: ManifestFormat,
        root: &'a Path,
        on_file: Option<&'a mut dyn FnMut(&Path, u64)>,
    ) -> Result<Manifest> {
        let nodes = Generator::new(format, root, on_file)?.run()?;
        debug!(
            root = %root.display(),
            format = %format,
            entries = nodes.len(),
            "generated manifest"
        );
        Ok(Manifest { format, nodes })
    }

    /// Parse serialized manifest text.
    pub fn parse(format: ManifestFormat, text: &str) -> Result<Manifest> {
        let dialect = format.dialect();
        let mut nodes = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let node = node::parse_node(line, dialect).map_err(|reason| Error::Malformed {
                line: idx + 1,
                reason,
            })?;
            nodes.push(node);
        }
        Ok(Manifest { format, nodes })
    }

    /// Load the saved manifest of an implementation directory.
    pub fn load(format: ManifestFormat, dir: &Path) -> Result<Manifest> {
        let text = fs::read_to_string(dir.join(MANIFEST_FILE))?;
        Self::parse(format, &text)
    }

    /// Save into `dir` as [`MANIFEST_FILE`].
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::write(dir.join(MANIFEST_FILE), self.to_string())?;
        Ok(())
    }

    /// The digest id of this manifest, e.g. `sha256=8290a8…`.
    pub fn digest(&self) -> String {
        let hash = self.format.hash_bytes(self.to_string().as_bytes());
        format!("{}={}", self.format.prefix(), hash)
    }

    pub fn format(&self) -> ManifestFormat {
        self.format
    }

    pub fn nodes(&self) -> &[ManifestNode] {
        &self.nodes
    }

    /// Total size in bytes of all files and symlink targets.
    pub fn total_size(&self) -> u64 {
        self.nodes.iter().map(ManifestNode::size).sum()
    }
}

impl fmt::Display for Manifest {
    /// Every line, including the last, ends with a newline. The digest
    /// is computed over exactly these bytes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dialect = self.format.dialect();
        for node in &self.nodes {
            writeln!(f, "{}", node.line(dialect))?;
        }
        Ok(())
    }
}
