//! End-to-end manifest generation tests over real directory trees.

use std::fs;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::Path;

use filetime::{set_file_mtime, FileTime};
use stowage_manifest::{Error, Manifest, ManifestFormat, MANIFEST_FILE, SYMLINK_FILE, XBIT_FILE};
use tempfile::TempDir;

/// 2000-01-01T00:00:00Z, pinned so manifest text is byte-exact.
const MTIME: i64 = 946_684_800;

fn set_times(path: &Path) {
    set_file_mtime(path, FileTime::from_unix_time(MTIME, 0)).unwrap();
}

fn write_file(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    set_times(&path);
}

/// hello.txt at the root, `hi\n`.
fn hello_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "hello.txt", "hi\n");
    dir
}

/// hello.txt plus sub/inner.txt.
fn nested_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    write_file(dir.path(), "hello.txt", "hi\n");
    write_file(&sub, "inner.txt", "inner\n");
    set_times(&sub);
    dir
}

#[test]
fn test_hello_manifest_text_and_digest() {
    let dir = hello_tree();
    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(
        manifest.to_string(),
        "F 98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be4 946684800 3 hello.txt\n"
    );
    assert_eq!(
        manifest.digest(),
        "sha256=73193e818a86a88bbe57153dc0b03987732c6bcebadb8288a2f685dcdb8ec27e"
    );

    let manifest = Manifest::generate(ManifestFormat::Sha1New, dir.path()).unwrap();
    assert_eq!(
        manifest.digest(),
        "sha1new=895e73aff7c63afeea2f3fa8a96dd451bb5ea509"
    );
}

#[test]
fn test_nested_tree_new_dialect() {
    let dir = nested_tree();
    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(
        manifest.to_string(),
        "F 98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be4 946684800 3 hello.txt\n\
         D /sub\n\
         F 940a68104d3b690442453f4be394b0a14721a174127d84c1c2f834b7ad05d684 946684800 6 inner.txt\n"
    );
    assert_eq!(
        manifest.digest(),
        "sha256=013f441683a6233fa9631f63d482353a50670ceb1914076e5c896533f2f13f02"
    );
    assert_eq!(manifest.total_size(), 9);
}

#[test]
fn test_nested_tree_old_dialect() {
    let dir = nested_tree();
    let manifest = Manifest::generate(ManifestFormat::Sha1, dir.path()).unwrap();
    assert_eq!(
        manifest.to_string(),
        "F 55ca6286e3e4f4fba5d0448333fa99fc5a404a73 946684800 3 hello.txt\n\
         D 946684800 /sub\n\
         F cda38c9a201a1bf6a7b14fed60e59e7504e1283f 946684800 6 inner.txt\n"
    );
    assert_eq!(
        manifest.digest(),
        "sha1=078400e564cbcb708d060c8892bcb3d36c438a1a"
    );
}

#[test]
fn test_dialects_order_directories_differently() {
    // "azz" sorts before "b.txt", so the old dialect descends into the
    // directory first while the new dialect lists all files first
    let dir = TempDir::new().unwrap();
    let azz = dir.path().join("azz");
    fs::create_dir(&azz).unwrap();
    write_file(&azz, "deep.txt", "deep\n");
    write_file(dir.path(), "b.txt", "b\n");
    set_times(&azz);

    let old = Manifest::generate(ManifestFormat::Sha1, dir.path()).unwrap();
    assert_eq!(
        old.to_string(),
        "D 946684800 /azz\n\
         F 698a7985db24f12a6425f6ed97a6ef5df053f3fb 946684800 5 deep.txt\n\
         F 89e6c98d92887913cadf06b2adb97f26cde4849b 946684800 2 b.txt\n"
    );
    assert_eq!(old.digest(), "sha1=0952fc1cbb92f861383ffeb8b86528da21b36c4a");

    let new = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(
        new.to_string(),
        "F 0263829989b6fd954f72baaf2fc64bc2e2f01d692d4de72986ea808f6e99813f 946684800 2 b.txt\n\
         D /azz\n\
         F 64896f89fd11190013b70103e603a1c5826e56b7fb7d2197ab279b0690043599 946684800 5 deep.txt\n"
    );
    assert_eq!(
        new.digest(),
        "sha256=4709fa0f6bf802759d8059673c282105ef3bef9e1f4f619c712c6d92bfdf2793"
    );
}

#[test]
fn test_symlink_hashed_over_target() {
    let dir = TempDir::new().unwrap();
    symlink("target", dir.path().join("link")).unwrap();

    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(
        manifest.to_string(),
        "S 34a04005bcaf206eec990bd9637d9fdb6725e0a0c0d4aebf003f17f4c956eb5c 6 link\n"
    );
    assert_eq!(
        manifest.digest(),
        "sha256=6b26d907b6b5867072ccf418c704ffbbf840af24c1224d16d40661268c381ea1"
    );
}

#[test]
fn test_symlink_flag_file_matches_real_symlink() {
    // a regular file whose content is the target string, plus a
    // .symlink entry, digests identically to a real symlink
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("link"), "target").unwrap();
    fs::write(dir.path().join(SYMLINK_FILE), "/link\n").unwrap();

    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(
        manifest.digest(),
        "sha256=6b26d907b6b5867072ccf418c704ffbbf840af24c1224d16d40661268c381ea1"
    );
}

#[test]
fn test_xbit_flag_promotes_to_executable() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "tool", "#!/bin/sh\n");
    fs::write(dir.path().join(XBIT_FILE), "/tool\n").unwrap();

    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(
        manifest.to_string(),
        "X a8076d3d28d21e02012b20eaf7dbf75409a6277134439025f282e368e3305abf 946684800 10 tool\n"
    );
    assert_eq!(
        manifest.digest(),
        "sha256=3f5f7715d945a6b0c6ff79ecfbe09dd242702b4891cdd51940f98df4420336e2"
    );
}

#[test]
fn test_executable_mode_matches_xbit_flag() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "tool", "#!/bin/sh\n");
    let path = dir.path().join("tool");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    set_times(&path);

    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(
        manifest.digest(),
        "sha256=3f5f7715d945a6b0c6ff79ecfbe09dd242702b4891cdd51940f98df4420336e2"
    );
}

#[test]
fn test_sidecars_excluded_at_root_only() {
    let dir = nested_tree();
    fs::write(dir.path().join(MANIFEST_FILE), "stale\n").unwrap();
    fs::write(dir.path().join(XBIT_FILE), "").unwrap();
    let baseline = Manifest::generate(ManifestFormat::Sha256, nested_tree().path()).unwrap();
    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(manifest.digest(), baseline.digest());

    // the same names below the root are ordinary entries
    write_file(&dir.path().join("sub"), MANIFEST_FILE, "not special\n");
    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert!(manifest.nodes().iter().any(|n| n.name() == MANIFEST_FILE));
    assert_ne!(manifest.digest(), baseline.digest());
}

#[test]
fn test_save_then_regenerate_is_stable() {
    let dir = nested_tree();
    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    manifest.save(dir.path()).unwrap();

    let reloaded = Manifest::load(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(reloaded, manifest);

    let regenerated = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(regenerated.digest(), manifest.digest());
}

#[test]
fn test_names_with_spaces() {
    let dir = TempDir::new().unwrap();
    let sub = dir.path().join("sub dir");
    fs::create_dir(&sub).unwrap();
    write_file(dir.path(), "my file.txt", "hi\n");
    write_file(&sub, "also spaced.txt", "hi\n");
    set_times(&sub);

    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    let reparsed = Manifest::parse(ManifestFormat::Sha256, &manifest.to_string()).unwrap();
    assert_eq!(reparsed, manifest);
    assert!(manifest.nodes().iter().any(|n| n.name() == "my file.txt"));
}

#[test]
fn test_identical_trees_digest_identically() {
    let a = nested_tree();
    let b = nested_tree();
    let da = Manifest::generate(ManifestFormat::Sha256, a.path()).unwrap().digest();
    let db = Manifest::generate(ManifestFormat::Sha256, b.path()).unwrap().digest();
    assert_eq!(da, db);
}

#[test]
fn test_digest_is_tamper_sensitive() {
    let dir = nested_tree();
    let baseline = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap().digest();

    write_file(dir.path(), "hello.txt", "ha\n");
    let changed = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap().digest();
    assert_ne!(changed, baseline);

    write_file(dir.path(), "hello.txt", "hi\n");
    let restored = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap().digest();
    assert_eq!(restored, baseline);

    fs::rename(dir.path().join("hello.txt"), dir.path().join("hello2.txt")).unwrap();
    let renamed = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap().digest();
    assert_ne!(renamed, baseline);
}

#[test]
fn test_dir_mtime_only_affects_old_dialect() {
    let dir = nested_tree();
    let old = Manifest::generate(ManifestFormat::Sha1, dir.path()).unwrap().digest();
    let new = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap().digest();

    set_file_mtime(
        dir.path().join("sub"),
        FileTime::from_unix_time(MTIME + 60, 0),
    )
    .unwrap();

    assert_ne!(
        Manifest::generate(ManifestFormat::Sha1, dir.path()).unwrap().digest(),
        old
    );
    assert_eq!(
        Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap().digest(),
        new
    );
}

#[test]
fn test_fifo_is_rejected() {
    let dir = TempDir::new().unwrap();
    nix::unistd::mkfifo(
        &dir.path().join("pipe"),
        nix::sys::stat::Mode::from_bits_truncate(0o644),
    )
    .unwrap();

    let err = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedEntryType { .. }));
}

#[test]
fn test_generate_with_progress() {
    let dir = nested_tree();
    let mut seen = Vec::new();
    let mut on_file = |path: &Path, size: u64| {
        seen.push((path.file_name().unwrap().to_string_lossy().into_owned(), size));
    };
    Manifest::generate_with_progress(ManifestFormat::Sha256, dir.path(), &mut on_file).unwrap();
    assert_eq!(seen, [("hello.txt".to_string(), 3), ("inner.txt".to_string(), 6)]);
}

#[test]
fn test_empty_directory() {
    let dir = TempDir::new().unwrap();
    let manifest = Manifest::generate(ManifestFormat::Sha256, dir.path()).unwrap();
    assert_eq!(manifest.to_string(), "");
    assert_eq!(
        manifest.digest(),
        "sha256=e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}
