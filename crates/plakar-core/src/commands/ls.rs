use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::repository::Repository;
use crate::snapshot::Snapshot;

/// One row of `plakar ls` output.
pub struct SnapshotSummary {
    pub id: Uuid,
    pub creation_time: DateTime<Utc>,
    pub hostname: String,
    pub username: String,
    pub files_count: u64,
    pub tags: Vec<String>,
    pub signed: bool,
}

/// List committed snapshots, most recent last.
pub fn run(repo: &Repository) -> Result<Vec<SnapshotSummary>> {
    let mut summaries = Vec::new();
    for id in repo.snapshot_ids()? {
        let header = Snapshot::load_header(repo, id)?;
        summaries.push(SnapshotSummary {
            id,
            creation_time: header.creation_time,
            hostname: header.hostname.clone(),
            username: header.username.clone(),
            files_count: header.files_count,
            tags: header.tags.clone(),
            signed: header.is_signed(),
        });
    }
    summaries.sort_by_key(|s| s.creation_time);
    Ok(summaries)
}
