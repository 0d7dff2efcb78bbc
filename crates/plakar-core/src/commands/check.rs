use uuid::Uuid;

use crate::error::{PlakarError, Result};
use crate::repository::Repository;
use crate::snapshot::Snapshot;

#[derive(Debug, Default)]
pub struct CheckResult {
    pub snapshots_checked: u64,
    pub objects_checked: u64,
    pub chunks_checked: u64,
    pub errors: Vec<CheckError>,
}

#[derive(Debug)]
pub struct CheckError {
    pub snapshot_id: Uuid,
    pub context: String,
    pub message: String,
}

impl CheckResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Verify snapshot integrity: every referenced chunk resolves and matches
/// its digest, and every object's chunk concatenation matches the object
/// checksum. `snapshot` restricts the check to one snapshot id prefix.
pub fn run(repo: &Repository, snapshot: Option<&str>) -> Result<CheckResult> {
    let ids = match snapshot {
        Some(prefix) => vec![repo.resolve_snapshot(prefix)?],
        None => repo.snapshot_ids()?,
    };

    let mut result = CheckResult::default();
    for id in ids {
        check_snapshot(repo, id, &mut result);
    }
    Ok(result)
}

fn check_snapshot(repo: &Repository, id: Uuid, result: &mut CheckResult) {
    let snapshot = match Snapshot::load(repo, id) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            result.errors.push(CheckError {
                snapshot_id: id,
                context: "snapshot".into(),
                message: e.to_string(),
            });
            return;
        }
    };
    result.snapshots_checked += 1;

    // Chunk pass: every chunk in the index resolves and verifies.
    for checksum in snapshot.index.chunk_checksums() {
        result.chunks_checked += 1;
        if let Err(e) = repo.get_chunk(checksum) {
            result.errors.push(CheckError {
                snapshot_id: id,
                context: format!("chunk {checksum}"),
                message: e.to_string(),
            });
        }
    }

    // Object pass: chunk concatenation reproduces the object digest.
    for object in snapshot.index.objects() {
        result.objects_checked += 1;
        let mut hasher = repo.codec().hasher();
        let mut readable = true;
        for checksum in &object.chunks {
            match repo.get_chunk(checksum) {
                Ok(data) => hasher.update(&data),
                Err(_) => {
                    // Already reported by the chunk pass.
                    readable = false;
                    break;
                }
            }
        }
        if !readable {
            continue;
        }
        let actual = hasher.finalize();
        if actual != object.checksum {
            let pathnames = snapshot.index.pathnames_for_object(&object.checksum);
            result.errors.push(CheckError {
                snapshot_id: id,
                context: format!(
                    "object {} ({})",
                    object.checksum,
                    pathnames.first().copied().unwrap_or("?")
                ),
                message: PlakarError::ChecksumMismatch {
                    context: "object".into(),
                    expected: object.checksum.to_hex(),
                    actual: actual.to_hex(),
                }
                .to_string(),
            });
        }
    }
}
