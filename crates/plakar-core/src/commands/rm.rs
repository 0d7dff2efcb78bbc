use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::repository::Repository;
use crate::storage::BlobKind;

/// Unreference a snapshot by deleting its artifacts.
///
/// The header goes first: once it is gone the snapshot is invisible to
/// loaders and the garbage collector, so a crash mid-way leaves only
/// orphaned artifacts that the next cleanup sweeps. Chunk and packfile
/// space is reclaimed by cleanup, not here.
pub fn run(repo: &Repository, prefix: &str) -> Result<Uuid> {
    let id = repo.resolve_snapshot(prefix)?;
    let id_str = id.to_string();

    repo.storage().delete_blob(BlobKind::Header, &id_str)?;
    for kind in [
        BlobKind::Signature,
        BlobKind::Metadata,
        BlobKind::Filesystem,
        BlobKind::Index,
    ] {
        if let Err(e) = repo.storage().delete_blob(kind, &id_str) {
            warn!(kind = kind.as_str(), snapshot = %id_str, "artifact delete failed: {e}");
        }
        if let Some(cache) = repo.cache() {
            cache.evict(kind, &id_str);
        }
    }
    if let Some(cache) = repo.cache() {
        cache.evict(BlobKind::Header, &id_str);
    }

    info!(snapshot = %id_str, "snapshot removed");
    Ok(id)
}
