use uuid::Uuid;

use crate::error::Result;
use crate::repository::Repository;
use crate::snapshot::Snapshot;

/// One pathname match.
pub struct FindMatch {
    pub snapshot_id: Uuid,
    pub pathname: String,
}

/// Search pathnames across all snapshot filesystems for a substring.
pub fn run(repo: &Repository, pattern: &str) -> Result<Vec<FindMatch>> {
    let mut matches = Vec::new();
    for id in repo.snapshot_ids()? {
        let snapshot = Snapshot::load(repo, id)?;
        for pathname in snapshot.filesystem.pathnames() {
            if pathname.contains(pattern) {
                matches.push(FindMatch {
                    snapshot_id: id,
                    pathname: pathname.to_string(),
                });
            }
        }
    }
    Ok(matches)
}
