use crate::commands::{cat, check, ls};
use crate::config::CreateOptions;
use crate::packfile::{self, BlobType};
use crate::repository::Repository;
use crate::snapshot::Snapshot;
use crate::storage::fs_backend::FsBackend;
use crate::storage::BlobKind;

use super::helpers::{fs_env, plain_env, write_file};

#[test]
fn push_then_cat_single_file() {
    let mut env = plain_env();
    write_file(&env.source, "hello.txt", b"hello world\n");

    let snapshot_id = env.push();

    // Exactly one snapshot listed.
    let summaries = ls::run(&env.repo).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, snapshot_id);
    assert_eq!(summaries[0].files_count, 1);

    // cat reproduces the bytes.
    let target = format!("{snapshot_id}:{}", env.pathname("hello.txt"));
    let mut out = Vec::new();
    cat::run(&env.repo, &target, &mut out).unwrap();
    assert_eq!(out, b"hello world\n");

    // One packfile whose trailer lists one chunk and one object.
    let packfiles = env.repo.storage().list_blobs(BlobKind::Packfile).unwrap();
    assert_eq!(packfiles.len(), 1);
    let data = env
        .repo
        .storage()
        .get_blob(BlobKind::Packfile, &packfiles[0])
        .unwrap()
        .unwrap();
    let entries = packfile::parse_index(&data).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries
            .iter()
            .filter(|e| e.blob_type == BlobType::Chunk)
            .count(),
        1
    );
    assert_eq!(
        entries
            .iter()
            .filter(|e| e.blob_type == BlobType::Object)
            .count(),
        1
    );

    // check is clean.
    let result = check::run(&env.repo, None).unwrap();
    assert!(result.is_clean());
    assert_eq!(result.snapshots_checked, 1);
}

#[test]
fn snapshot_anchors_verify_on_load() {
    let mut env = plain_env();
    write_file(&env.source, "a.txt", b"some content");
    let snapshot_id = env.push();

    let snapshot = Snapshot::load(&env.repo, snapshot_id).unwrap();
    assert_eq!(snapshot.header.files_count, 1);
    assert_eq!(snapshot.index.object_count(), 1);
    assert!(snapshot.filesystem.info(&env.pathname("a.txt")).is_some());
    assert_eq!(
        snapshot
            .metadata
            .list_values("content-type", "text/plain")
            .len(),
        1
    );
}

#[test]
fn empty_file_roundtrips() {
    let mut env = plain_env();
    write_file(&env.source, "empty", b"");
    let snapshot_id = env.push();

    let target = format!("{snapshot_id}:{}", env.pathname("empty"));
    let mut out = Vec::new();
    cat::run(&env.repo, &target, &mut out).unwrap();
    assert!(out.is_empty());
}

#[test]
fn cat_unknown_pathname_fails() {
    let mut env = plain_env();
    write_file(&env.source, "a.txt", b"x");
    let snapshot_id = env.push();
    let mut out = Vec::new();
    assert!(cat::run(&env.repo, &format!("{snapshot_id}:/nope"), &mut out).is_err());
}

#[test]
fn encrypted_compressed_repository_roundtrips() {
    let mut env = fs_env(CreateOptions {
        hashing: "sha256".into(),
        compression: true,
        passphrase: Some("secret phrase".into()),
    });
    write_file(&env.source, "data.bin", &vec![7u8; 64 * 1024]);
    let snapshot_id = env.push();

    // Reopen from disk with the passphrase.
    let repo_path = env.dir.path().join("repo");
    let reopened = Repository::open(
        Box::new(FsBackend::new(&repo_path)),
        Some("secret phrase"),
        None,
    )
    .unwrap();

    let target = format!("{snapshot_id}:{}", env.pathname("data.bin"));
    let mut out = Vec::new();
    cat::run(&reopened, &target, &mut out).unwrap();
    assert_eq!(out, vec![7u8; 64 * 1024]);

    // Wrong passphrase never opens.
    assert!(Repository::open(
        Box::new(FsBackend::new(&repo_path)),
        Some("wrong"),
        None
    )
    .is_err());
    // Missing passphrase is a configuration error.
    assert!(Repository::open(Box::new(FsBackend::new(&repo_path)), None, None).is_err());
}

#[test]
fn push_records_directories_and_symlinks() {
    let mut env = plain_env();
    std::fs::create_dir_all(env.source.join("sub")).unwrap();
    write_file(&env.source, "sub/f.txt", b"nested");
    #[cfg(unix)]
    std::os::unix::fs::symlink("sub/f.txt", env.source.join("link")).unwrap();

    let snapshot_id = env.push();
    let snapshot = Snapshot::load(&env.repo, snapshot_id).unwrap();

    assert!(snapshot
        .filesystem
        .is_directory(&env.pathname("sub")));
    assert!(snapshot
        .filesystem
        .info(&env.pathname("sub/f.txt"))
        .is_some());
    #[cfg(unix)]
    assert_eq!(
        snapshot.filesystem.symlink_target(&env.pathname("link")),
        Some("sub/f.txt")
    );
    assert!(snapshot.header.file_kind.get("directory").copied().unwrap_or(0) >= 1);
}
