use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::error::Result;
use crate::objects::Checksum;
use crate::packfile::{self, BlobType};
use crate::repository::{lock, Repository};
use crate::snapshot::index::SnapshotIndex;
use crate::storage::BlobKind;

#[derive(Debug, Default)]
pub struct CleanupStats {
    pub snapshots_live: u64,
    pub packfiles_scanned: u64,
    pub packfiles_deleted: u64,
    pub artifacts_deleted: u64,
    pub space_freed: u64,
}

/// Mark-and-sweep garbage collection.
///
/// Requires the exclusive lock: no push can add references between the mark
/// and the sweep. A crash after packfile deletion but before the index write
/// leaves dangling mappings that the next run recomputes and repairs.
pub fn run(ctx: &AppContext, repo: &mut Repository) -> Result<CleanupStats> {
    let guard = lock::acquire(repo.storage(), ctx, true)?;
    let result = cleanup_locked(repo);
    if let Err(e) = lock::release(repo.storage(), guard) {
        warn!("failed to release lock: {e}");
    }
    result
}

fn cleanup_locked(repo: &mut Repository) -> Result<CleanupStats> {
    let mut stats = CleanupStats::default();

    // Mark: collect live chunk and object checksums from every snapshot
    // index, and the set of live snapshot ids (those with a header).
    let mut live_chunks: HashSet<Checksum> = HashSet::new();
    let mut live_objects: HashSet<Checksum> = HashSet::new();
    let mut live_snapshots: HashSet<String> = HashSet::new();

    for id in repo.snapshot_ids()? {
        let (index_bytes, _) = repo.get_artifact(BlobKind::Index, &id)?;
        let index = SnapshotIndex::from_bytes(&index_bytes)?;
        live_chunks.extend(index.chunk_checksums().iter().copied());
        live_objects.extend(index.object_checksums().iter().copied());
        live_snapshots.insert(id.to_string());
        stats.snapshots_live += 1;
    }
    debug!(
        snapshots = stats.snapshots_live,
        chunks = live_chunks.len(),
        objects = live_objects.len(),
        "marked live set"
    );

    // Sweep packfiles: inspect each trailer; a pack with no live entry is
    // deleted and its mappings forgotten. Orphaned packs not referenced by
    // the index get the same treatment.
    let mut candidates: HashSet<Checksum> = repo.index().packfiles();
    for id in repo.storage().list_blobs(BlobKind::Packfile)? {
        match Checksum::from_hex(&id) {
            Ok(checksum) => {
                candidates.insert(checksum);
            }
            Err(_) => warn!(id = %id, "ignoring packfile with non-digest id"),
        }
    }

    for pack in candidates {
        stats.packfiles_scanned += 1;
        let pack_hex = pack.to_hex();
        let Some(data) = repo.storage().get_blob(BlobKind::Packfile, &pack_hex)? else {
            // Referenced but already gone: a previous run crashed between
            // delete and index write. Repair the mapping.
            warn!(packfile = %pack_hex, "dangling index entry, repairing");
            repo.index_mut().forget_packfile(&pack);
            continue;
        };
        let entries = match packfile::parse_index(&data) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(packfile = %pack_hex, "skipping unreadable packfile: {e}");
                continue;
            }
        };

        let alive = entries.iter().any(|entry| match entry.blob_type {
            BlobType::Chunk => live_chunks.contains(&entry.checksum),
            BlobType::Object => live_objects.contains(&entry.checksum),
        });
        if alive {
            continue;
        }

        info!(packfile = %pack_hex, bytes = data.len(), "deleting unreferenced packfile");
        repo.storage().delete_blob(BlobKind::Packfile, &pack_hex)?;
        repo.index_mut().forget_packfile(&pack);
        stats.packfiles_deleted += 1;
        stats.space_freed += data.len() as u64;
    }

    // Sweep orphaned snapshot artifacts (best-effort): anything without a
    // corresponding header is unreachable.
    for kind in [
        BlobKind::Index,
        BlobKind::Filesystem,
        BlobKind::Metadata,
        BlobKind::Signature,
    ] {
        let ids = match repo.storage().list_blobs(kind) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(kind = kind.as_str(), "artifact sweep listing failed: {e}");
                continue;
            }
        };
        for id in ids {
            if live_snapshots.contains(&id) {
                continue;
            }
            debug!(kind = kind.as_str(), id = %id, "deleting orphaned artifact");
            match repo.storage().delete_blob(kind, &id) {
                Ok(()) => stats.artifacts_deleted += 1,
                Err(e) => warn!(kind = kind.as_str(), id = %id, "orphan delete failed: {e}"),
            }
        }
    }

    // Also drop legacy unpacked chunks and objects that nothing references.
    sweep_legacy(repo, BlobKind::Chunk, &live_chunks, &mut stats);
    sweep_legacy(repo, BlobKind::Object, &live_objects, &mut stats);

    repo.save_index()?;

    info!(
        packfiles_deleted = stats.packfiles_deleted,
        artifacts_deleted = stats.artifacts_deleted,
        space_freed = stats.space_freed,
        "cleanup complete"
    );
    Ok(stats)
}

fn sweep_legacy(
    repo: &Repository,
    kind: BlobKind,
    live: &HashSet<Checksum>,
    stats: &mut CleanupStats,
) {
    let ids = match repo.storage().list_blobs(kind) {
        Ok(ids) => ids,
        Err(e) => {
            warn!(kind = kind.as_str(), "legacy sweep listing failed: {e}");
            return;
        }
    };
    for id in ids {
        let Ok(checksum) = Checksum::from_hex(&id) else {
            continue;
        };
        if live.contains(&checksum) {
            continue;
        }
        match repo.storage().delete_blob(kind, &id) {
            Ok(()) => stats.artifacts_deleted += 1,
            Err(e) => warn!(kind = kind.as_str(), id = %id, "legacy delete failed: {e}"),
        }
    }
}
