use crate::commands::{cleanup, rm};
use crate::snapshot::Snapshot;
use crate::storage::BlobKind;

use super::helpers::{plain_env, write_file};

#[test]
fn cleanup_reclaims_unreferenced_packfiles() {
    let mut env = plain_env();
    write_file(&env.source, "only.bin", &vec![0x13u8; 1024 * 1024]);
    let snapshot_id = env.push();

    let snapshot = Snapshot::load(&env.repo, snapshot_id).unwrap();
    let chunk = snapshot.index.chunk_checksums()[0];
    assert!(env.repo.index().has_chunk(&chunk));
    assert_eq!(env.repo.storage().list_blobs(BlobKind::Packfile).unwrap().len(), 1);

    // Delete the header blob by hand (simulating rm), then collect.
    env.repo
        .storage()
        .delete_blob(BlobKind::Header, &snapshot_id.to_string())
        .unwrap();
    let stats = cleanup::run(&env.ctx, &mut env.repo).unwrap();

    assert_eq!(stats.snapshots_live, 0);
    assert_eq!(stats.packfiles_deleted, 1);
    assert!(env.repo.storage().list_blobs(BlobKind::Packfile).unwrap().is_empty());
    assert!(!env.repo.index().has_chunk(&chunk));
    // The orphaned index/filesystem/metadata artifacts are swept too.
    assert!(env
        .repo
        .storage()
        .list_blobs(BlobKind::Index)
        .unwrap()
        .is_empty());
}

#[test]
fn cleanup_keeps_shared_chunks_alive() {
    let mut env = plain_env();
    write_file(&env.source, "shared.bin", &vec![0x77u8; 1024 * 1024]);
    let first = env.push();
    // Second snapshot of the same tree: same chunks.
    let second = env.push();
    assert_ne!(first, second);

    // Remove the first snapshot; the second still references everything.
    rm::run(&env.repo, &first.to_string()).unwrap();
    let stats = cleanup::run(&env.ctx, &mut env.repo).unwrap();

    assert_eq!(stats.snapshots_live, 1);
    assert_eq!(stats.packfiles_deleted, 0);

    let snapshot = Snapshot::load(&env.repo, second).unwrap();
    let chunk = snapshot.index.chunk_checksums()[0];
    assert!(env.repo.index().has_chunk(&chunk));
    // Content still reads back.
    let mut out = Vec::new();
    crate::commands::cat::run(
        &env.repo,
        &format!("{second}:{}", env.pathname("shared.bin")),
        &mut out,
    )
    .unwrap();
    assert_eq!(out.len(), 1024 * 1024);
}

#[test]
fn cleanup_of_live_repository_deletes_nothing() {
    let mut env = plain_env();
    write_file(&env.source, "keep.txt", b"still referenced");
    let snapshot_id = env.push();

    let stats = cleanup::run(&env.ctx, &mut env.repo).unwrap();
    assert_eq!(stats.snapshots_live, 1);
    assert_eq!(stats.packfiles_deleted, 0);
    assert_eq!(stats.artifacts_deleted, 0);

    assert!(Snapshot::load(&env.repo, snapshot_id).is_ok());
}

#[test]
fn rm_then_cleanup_end_to_end() {
    let mut env = plain_env();
    write_file(&env.source, "doomed.txt", b"to be reclaimed");
    let snapshot_id = env.push();

    rm::run(&env.repo, &snapshot_id.to_string()[..8]).unwrap();
    assert!(Snapshot::load(&env.repo, snapshot_id).is_err());

    let stats = cleanup::run(&env.ctx, &mut env.repo).unwrap();
    assert_eq!(stats.packfiles_deleted, 1);
    assert!(env.repo.index().is_empty());
}
