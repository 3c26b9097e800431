//! Subcommand implementations.
//!
//! Each returns the process exit code: 0 for success, 1 when
//! verification found problems. Usage and I/O failures bubble up as
//! errors and exit with code 2.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

use stowage_manifest::{Manifest, ManifestDigest, ManifestFormat};
use stowage_store::{digest_directory, AddProgress, DirectoryStore, Store, StoreError, StoreSet};

pub fn add(set: &StoreSet, digest: &str, directory: &Path) -> Result<i32> {
    let digest = parse_digest(digest)?;
    match set.add_dir(directory, &digest, &mut AddProgress::default()) {
        Ok(path) => {
            println!("{}", path.display());
            Ok(0)
        }
        // the content is cached either way
        Err(StoreError::AlreadyInStore { digest }) => {
            eprintln!("{digest} is already in the store");
            Ok(0)
        }
        Err(e) => Err(e).with_context(|| format!("adding {}", directory.display())),
    }
}

pub fn find(set: &StoreSet, digest: &str) -> Result<i32> {
    let digest = parse_digest(digest)?;
    let path = set.lookup(&digest)?;
    println!("{}", path.display());
    Ok(0)
}

pub fn list(set: &StoreSet, temp: bool) -> Result<i32> {
    if temp {
        for path in set.list_temp()? {
            println!("{}", path.display());
        }
    } else {
        for digest in set.list()? {
            println!("{digest}");
        }
    }
    Ok(0)
}

pub fn remove(set: &StoreSet, digests: &[String]) -> Result<i32> {
    for id in digests {
        let digest = parse_digest(id)?;
        set.remove(&digest)
            .with_context(|| format!("removing {id}"))?;
    }
    Ok(0)
}

pub fn verify(set: &StoreSet, targets: &[String]) -> Result<i32> {
    let mut failures = 0;
    for target in targets {
        match verify_one(set, target)? {
            Ok(()) => println!("{target}: OK"),
            Err(e) => {
                failures += 1;
                eprintln!("{target}: {e}");
            }
        }
    }
    Ok(if failures == 0 { 0 } else { 1 })
}

/// Outer error for unusable arguments, inner for verification results.
fn verify_one(set: &StoreSet, target: &str) -> Result<stowage_store::Result<()>> {
    let path = Path::new(target);
    if target.contains('/') || path.is_dir() {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("{target} is not a digest-named directory"))?;
        let digest = parse_digest(name)?;
        Ok(DirectoryStore::verify_directory(path, &digest).map(|_| ()))
    } else {
        let digest = parse_digest(target)?;
        Ok(set.verify(&digest))
    }
}

pub fn audit(set: &StoreSet, stores: &[PathBuf]) -> Result<i32> {
    let issues = if stores.is_empty() {
        set.audit()?
    } else {
        let mut issues = Vec::new();
        for dir in stores {
            debug!(store = %dir.display(), "auditing");
            let store = DirectoryStore::new(dir)?;
            issues.extend(store.audit()?);
        }
        issues
    };
    for issue in &issues {
        eprintln!("{}: {}", issue.digest, issue.error);
    }
    if issues.is_empty() {
        println!("no problems found");
        Ok(0)
    } else {
        eprintln!("{} implementation(s) failed verification", issues.len());
        Ok(1)
    }
}

pub fn manifest(directory: &Path, format: Option<&str>) -> Result<i32> {
    let format = match format {
        Some(prefix) => ManifestFormat::from_prefix(prefix)?,
        None => format_from_dir_name(directory).unwrap_or(ManifestFormat::Sha256),
    };
    let manifest = Manifest::generate(format, directory)?;
    print!("{manifest}");
    println!("{}", manifest.digest());
    Ok(0)
}

/// Directories named like `sha256=3f29…` imply their own format.
fn format_from_dir_name(directory: &Path) -> Option<ManifestFormat> {
    let name = directory.file_name()?.to_str()?;
    ManifestDigest::parse(name).best_format().ok()
}

pub fn digest(directory: &Path) -> Result<i32> {
    let digest = digest_directory(directory)?;
    for id in digest.available() {
        println!("{id}");
    }
    Ok(0)
}

fn parse_digest(id: &str) -> Result<ManifestDigest> {
    let digest = ManifestDigest::parse(id);
    if digest.is_empty() {
        bail!("unrecognized digest: {id}");
    }
    Ok(digest)
}
