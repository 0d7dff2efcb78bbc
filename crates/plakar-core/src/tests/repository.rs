use uuid::Uuid;

use crate::error::PlakarError;
use crate::objects::Object;
use crate::packfile::{BlobType, PackWriter};
use crate::storage::BlobKind;
use crate::testutil::memory_repo_plain;

#[test]
fn artifact_roundtrip_returns_raw_digest() {
    let repo = memory_repo_plain();
    let id = Uuid::new_v4();
    let raw = b"artifact payload".to_vec();

    let (digest, stored) = repo.put_artifact(BlobKind::Index, &id, &raw).unwrap();
    assert_eq!(digest, repo.codec().digest(&raw));
    assert_eq!(stored, raw.len() as u64);

    let (back, back_digest) = repo.get_artifact(BlobKind::Index, &id).unwrap();
    assert_eq!(back, raw);
    assert_eq!(back_digest, digest);
}

#[test]
fn missing_artifact_is_not_found() {
    let repo = memory_repo_plain();
    assert!(matches!(
        repo.get_artifact(BlobKind::Header, &Uuid::new_v4()),
        Err(PlakarError::BlobNotFound { .. })
    ));
}

#[test]
fn chunks_resolve_through_packfiles() {
    let mut repo = memory_repo_plain();

    let data = b"chunk payload".to_vec();
    let checksum = repo.codec().digest(&data);
    let encoded = repo.codec().encode(&data).unwrap();

    let mut packer = PackWriter::new(1024);
    packer.add_blob(BlobType::Chunk, checksum, &encoded);
    let (pack_id, bytes, entries) = packer.seal(repo.codec().hashing()).unwrap();
    repo.commit_packfile(pack_id, &bytes, &entries).unwrap();

    assert!(repo.index().has_chunk(&checksum));
    assert_eq!(repo.index().packfile_for_chunk(&checksum), Some(pack_id));
    assert_eq!(repo.get_chunk(&checksum).unwrap(), data);
}

#[test]
fn legacy_unpacked_chunks_are_still_readable() {
    let repo = memory_repo_plain();

    let data = b"pre-packfile chunk".to_vec();
    let checksum = repo.codec().digest(&data);
    let encoded = repo.codec().encode(&data).unwrap();
    // Not in the repository index: stored under the legacy namespace only.
    repo.storage()
        .put_blob(BlobKind::Chunk, &checksum.to_hex(), &encoded)
        .unwrap();

    assert!(!repo.index().has_chunk(&checksum));
    assert_eq!(repo.get_chunk(&checksum).unwrap(), data);
}

#[test]
fn objects_roundtrip_through_packfiles() {
    let mut repo = memory_repo_plain();

    let chunk_data = b"object chunk".to_vec();
    let chunk_checksum = repo.codec().digest(&chunk_data);
    let object = Object {
        checksum: repo.codec().digest(&chunk_data),
        chunks: vec![chunk_checksum],
        content_type: "text/plain".into(),
    };
    let raw = rmp_serde::to_vec(&object).unwrap();

    let mut packer = PackWriter::new(1024 * 1024);
    packer.add_blob(
        BlobType::Chunk,
        chunk_checksum,
        &repo.codec().encode(&chunk_data).unwrap(),
    );
    packer.add_blob(
        BlobType::Object,
        object.checksum,
        &repo.codec().encode(&raw).unwrap(),
    );
    let (pack_id, bytes, entries) = packer.seal(repo.codec().hashing()).unwrap();
    repo.commit_packfile(pack_id, &bytes, &entries).unwrap();

    let back = repo.get_object(&object.checksum).unwrap();
    assert_eq!(back, object);
}

#[test]
fn snapshot_prefix_resolution() {
    let repo = memory_repo_plain();
    let id = Uuid::new_v4();
    repo.put_artifact(BlobKind::Header, &id, b"header").unwrap();

    assert_eq!(repo.resolve_snapshot(&id.to_string()[..8]).unwrap(), id);
    assert!(matches!(
        repo.resolve_snapshot("ffffffff"),
        Err(PlakarError::SnapshotNotFound(_))
    ));
}
