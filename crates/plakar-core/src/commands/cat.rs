use std::io::Write;

use crate::error::{PlakarError, Result};
use crate::repository::Repository;
use crate::snapshot::Snapshot;

/// Stream one file out of a snapshot. `target` is `<snapID>:<path>`,
/// where the snapshot id may be any unambiguous prefix.
pub fn run(repo: &Repository, target: &str, out: &mut dyn Write) -> Result<u64> {
    let (prefix, pathname) = target.split_once(':').ok_or_else(|| {
        PlakarError::InvalidFormat(format!("expected <snapshot>:<path>, got '{target}'"))
    })?;

    let id = repo.resolve_snapshot(prefix)?;
    let snapshot = Snapshot::load(repo, id)?;
    let mut reader = snapshot.reader(repo, pathname)?;
    std::io::copy(&mut reader, out).map_err(unwrap_reader_error)
}

/// The reader funnels repository errors through `std::io::Error`; recover
/// the original kind so callers see `ChecksumMismatch` rather than `Io`.
fn unwrap_reader_error(e: std::io::Error) -> PlakarError {
    match e.downcast::<PlakarError>() {
        Ok(inner) => inner,
        Err(e) => PlakarError::Io(e),
    }
}
