//! Manifest generation by directory traversal.
//!
//! Traversal order is what makes digests reproducible: entries are
//! sorted by raw name bytes, never by locale. The new dialect lists
//! each directory's files before its subdirectories; the old dialect
//! walks files and subdirectories in one merged sequence.

use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::flags::{self, SYMLINK_FILE, XBIT_FILE};
use crate::format::{Dialect, ManifestFormat};
use crate::node::ManifestNode;
use crate::MANIFEST_FILE;

pub(crate) struct Generator<'a> {
    format: ManifestFormat,
    root: &'a Path,
    executable_paths: HashSet<String>,
    symlink_paths: HashSet<String>,
    on_file: Option<&'a mut dyn FnMut(&Path, u64)>,
}

impl<'a> Generator<'a> {
    pub(crate) fn new(
        format: ManifestFormat,
        root: &'a Path,
        on_file: Option<&'a mut dyn FnMut(&Path, u64)>,
    ) -> Result<Self> {
        Ok(Generator {
            format,
            root,
            executable_paths: flags::read_flag_file(root, XBIT_FILE)?,
            symlink_paths: flags::read_flag_file(root, SYMLINK_FILE)?,
            on_file,
        })
    }

    pub(crate) fn run(mut self) -> Result<Vec<ManifestNode>> {
        let root = self.root;
        let mut nodes = Vec::new();
        self.walk(root, "", true, &mut nodes)?;
        Ok(nodes)
    }

    fn walk(
        &mut self,
        dir: &Path,
        tree_path: &str,
        is_root: bool,
        nodes: &mut Vec<ManifestNode>,
    ) -> Result<()> {
        let entries = read_sorted(dir, is_root)?;
        match self.format.dialect() {
            Dialect::New => {
                for entry in entries.iter().filter(|e| !e.file_type.is_dir()) {
                    let node = self.leaf_node(entry, tree_path)?;
                    nodes.push(node);
                }
                for entry in entries.iter().filter(|e| e.file_type.is_dir()) {
                    self.subdir(entry, tree_path, nodes)?;
                }
            }
            Dialect::Old => {
                for entry in &entries {
                    if entry.file_type.is_dir() {
                        self.subdir(entry, tree_path, nodes)?;
                    } else {
                        let node = self.leaf_node(entry, tree_path)?;
                        nodes.push(node);
                    }
                }
            }
        }
        Ok(())
    }

    fn subdir(&mut self, entry: &Entry, tree_path: &str, nodes: &mut Vec<ManifestNode>) -> Result<()> {
        let sub_path = format!("{tree_path}/{}", entry.name);
        nodes.push(ManifestNode::directory(
            sub_path.clone(),
            entry.metadata.mtime(),
        )?);
        self.walk(&entry.path, &sub_path, false, nodes)
    }

    fn leaf_node(&mut self, entry: &Entry, tree_path: &str) -> Result<ManifestNode> {
        let full_path = format!("{tree_path}/{}", entry.name);
        if entry.file_type.is_symlink() {
            let target = fs::read_link(&entry.path)?;
            let target = target.to_str().ok_or_else(|| Error::InvalidNode {
                reason: format!("symlink target of {full_path:?} is not valid UTF-8"),
            })?;
            let hash = self.format.hash_bytes(target.as_bytes());
            return ManifestNode::symlink(hash, target.len() as u64, entry.name.clone());
        }
        if entry.file_type.is_file() {
            if self.symlink_paths.contains(&full_path) {
                // a regular file standing in for a symlink; its content is the target
                let target = fs::read(&entry.path)?;
                let hash = self.format.hash_bytes(&target);
                return ManifestNode::symlink(hash, target.len() as u64, entry.name.clone());
            }
            let file = fs::File::open(&entry.path)?;
            let hash = self.format.hash_reader(file)?;
            let size = entry.metadata.len();
            if let Some(on_file) = self.on_file.as_mut() {
                on_file(&entry.path, size);
            }
            let executable = entry.metadata.permissions().mode() & 0o111 != 0
                || self.executable_paths.contains(&full_path);
            return if executable {
                ManifestNode::executable_file(hash, entry.metadata.mtime(), size, entry.name.clone())
            } else {
                ManifestNode::file(hash, entry.metadata.mtime(), size, entry.name.clone())
            };
        }
        // fifos, sockets, devices
        Err(Error::UnsupportedEntryType {
            path: entry.path.clone(),
        })
    }
}

struct Entry {
    name: String,
    path: PathBuf,
    file_type: fs::FileType,
    metadata: fs::Metadata,
}

fn read_sorted(dir: &Path, is_root: bool) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|name| Error::InvalidNode {
                reason: format!("entry name {name:?} is not valid UTF-8"),
            })?;
        if is_root && matches!(name.as_str(), MANIFEST_FILE | XBIT_FILE | SYMLINK_FILE) {
            continue;
        }
        let file_type = entry.file_type()?;
        let metadata = entry.metadata()?;
        entries.push(Entry {
            name,
            path: entry.path(),
            file_type,
            metadata,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entries_sorted_by_byte_value() {
        let dir = TempDir::new().unwrap();
        for name in ["b.txt", "a.txt", "Z.txt", "a-b.txt"] {
            fs::write(dir.path().join(name), "x").unwrap();
        }
        let names: Vec<String> = read_sorted(dir.path(), false)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        // uppercase sorts before lowercase, '-' before '.'
        assert_eq!(names, ["Z.txt", "a-b.txt", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_root_skips_sidecar_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), "").unwrap();
        fs::write(dir.path().join(XBIT_FILE), "").unwrap();
        fs::write(dir.path().join(SYMLINK_FILE), "").unwrap();
        fs::write(dir.path().join("kept.txt"), "x").unwrap();

        let names: Vec<String> = read_sorted(dir.path(), true)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["kept.txt"]);

        // below the root the same names are ordinary entries
        assert_eq!(read_sorted(dir.path(), false).unwrap().len(), 4);
    }
}
