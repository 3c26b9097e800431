//! The manifest line model.

use crate::error::{Error, Result};
use crate::format::Dialect;

/// One entry of an implementation manifest.
///
/// Serialized line forms:
///
/// ```text
/// F <hash> <mtime> <size> <name>    regular file
/// X <hash> <mtime> <size> <name>    executable file
/// S <hash> <size> <name>            symlink, hash over the target string
/// D <path>                          directory (new dialect)
/// D <mtime> <path>                  directory (old dialect)
/// ```
///
/// Names may contain spaces; they are always the final field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestNode {
    File {
        hash: String,
        mtime: i64,
        size: u64,
        name: String,
    },
    ExecutableFile {
        hash: String,
        mtime: i64,
        size: u64,
        name: String,
    },
    Symlink {
        hash: String,
        size: u64,
        name: String,
    },
    Directory {
        /// Tree-absolute POSIX path, e.g. `/lib/sub`.
        full_path: String,
        /// Serialized in the old dialect only.
        mtime: i64,
    },
}

impl ManifestNode {
    pub fn file(hash: String, mtime: i64, size: u64, name: String) -> Result<Self> {
        check_name(&name)?;
        Ok(ManifestNode::File {
            hash,
            mtime,
            size,
            name,
        })
    }

    pub fn executable_file(hash: String, mtime: i64, size: u64, name: String) -> Result<Self> {
        check_name(&name)?;
        Ok(ManifestNode::ExecutableFile {
            hash,
            mtime,
            size,
            name,
        })
    }

    pub fn symlink(hash: String, size: u64, name: String) -> Result<Self> {
        check_name(&name)?;
        Ok(ManifestNode::Symlink { hash, size, name })
    }

    pub fn directory(full_path: String, mtime: i64) -> Result<Self> {
        if !full_path.starts_with('/') {
            return Err(Error::InvalidNode {
                reason: format!("directory path {full_path:?} must start with '/'"),
            });
        }
        if full_path.contains('\n') {
            return Err(Error::InvalidNode {
                reason: "directory path contains a newline".to_string(),
            });
        }
        Ok(ManifestNode::Directory { full_path, mtime })
    }

    /// Entry name within its parent directory.
    pub fn name(&self) -> &str {
        match self {
            ManifestNode::File { name, .. }
            | ManifestNode::ExecutableFile { name, .. }
            | ManifestNode::Symlink { name, .. } => name,
            ManifestNode::Directory { full_path, .. } => {
                full_path.rsplit('/').next().unwrap_or(full_path)
            }
        }
    }

    /// Bytes this entry contributes to the implementation's total size.
    pub fn size(&self) -> u64 {
        match self {
            ManifestNode::File { size, .. }
            | ManifestNode::ExecutableFile { size, .. }
            | ManifestNode::Symlink { size, .. } => *size,
            ManifestNode::Directory { .. } => 0,
        }
    }

    /// Serialize to one manifest line, without the trailing newline.
    pub fn line(&self, dialect: Dialect) -> String {
        match self {
            ManifestNode::File {
                hash,
                mtime,
                size,
                name,
            } => format!("F {hash} {mtime} {size} {name}"),
            ManifestNode::ExecutableFile {
                hash,
                mtime,
                size,
                name,
            } => format!("X {hash} {mtime} {size} {name}"),
            ManifestNode::Symlink { hash, size, name } => format!("S {hash} {size} {name}"),
            ManifestNode::Directory { full_path, mtime } => match dialect {
                Dialect::Old => format!("D {mtime} {full_path}"),
                Dialect::New => format!("D {full_path}"),
            },
        }
    }
}

// Line-based formats cannot carry these characters in names.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidNode {
            reason: "entry name is empty".to_string(),
        });
    }
    if name.contains('/') || name.contains('\n') {
        return Err(Error::InvalidNode {
            reason: format!("entry name {name:?} contains '/' or a newline"),
        });
    }
    Ok(())
}

/// Parse one line; the caller supplies line-number context.
pub(crate) fn parse_node(line: &str, dialect: Dialect) -> std::result::Result<ManifestNode, String> {
    let (kind, rest) = line
        .split_once(' ')
        .ok_or_else(|| format!("truncated entry {line:?}"))?;
    match kind {
        "F" | "X" => {
            let (hash, rest) = rest.split_once(' ').ok_or("missing mtime field")?;
            let (mtime, rest) = rest.split_once(' ').ok_or("missing size field")?;
            let (size, name) = rest.split_once(' ').ok_or("missing name field")?;
            let mtime: i64 = mtime
                .parse()
                .map_err(|_| format!("invalid mtime {mtime:?}"))?;
            let size: u64 = size.parse().map_err(|_| format!("invalid size {size:?}"))?;
            let node = if kind == "F" {
                ManifestNode::file(hash.to_string(), mtime, size, name.to_string())
            } else {
                ManifestNode::executable_file(hash.to_string(), mtime, size, name.to_string())
            };
            node.map_err(|e| e.to_string())
        }
        "S" => {
            let (hash, rest) = rest.split_once(' ').ok_or("missing size field")?;
            let (size, name) = rest.split_once(' ').ok_or("missing name field")?;
            let size: u64 = size.parse().map_err(|_| format!("invalid size {size:?}"))?;
            ManifestNode::symlink(hash.to_string(), size, name.to_string())
                .map_err(|e| e.to_string())
        }
        "D" => {
            let (mtime, path) = match dialect {
                Dialect::Old => {
                    let (mtime, path) = rest
                        .split_once(' ')
                        .ok_or("directory line is missing an mtime")?;
                    let mtime: i64 = mtime
                        .parse()
                        .map_err(|_| format!("invalid mtime {mtime:?}"))?;
                    (mtime, path)
                }
                Dialect::New => (0, rest),
            };
            ManifestNode::directory(path.to_string(), mtime).map_err(|e| e.to_string())
        }
        _ => Err(format!("unknown entry type {kind:?}")),
    }
}
