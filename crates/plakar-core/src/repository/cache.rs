use std::fs;
use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

use crate::storage::BlobKind;

/// Local cache of encoded snapshot artifacts, keyed by repository UUID.
///
/// Strictly a performance shortcut: never authoritative, all operations are
/// best-effort, and the directory can be deleted at any time. Contents are
/// stored exactly as fetched from the repository (still compressed and
/// encrypted), so the cache leaks nothing the repository doesn't.
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    /// Open (creating if needed) the cache for one repository. Returns
    /// `None` when the directory cannot be created.
    pub fn open(cache_dir: PathBuf, repository_id: &Uuid) -> Option<Self> {
        let root = cache_dir.join(repository_id.to_string());
        match fs::create_dir_all(&root) {
            Ok(()) => Some(Self { root }),
            Err(e) => {
                debug!("cache disabled, cannot create {}: {e}", root.display());
                None
            }
        }
    }

    fn path_for(&self, kind: BlobKind, id: &str) -> PathBuf {
        self.root.join(format!("{}-{id}", kind.as_str()))
    }

    pub fn get(&self, kind: BlobKind, id: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(kind, id)).ok()
    }

    pub fn put(&self, kind: BlobKind, id: &str, data: &[u8]) {
        if let Err(e) = fs::write(self.path_for(kind, id), data) {
            debug!("cache write failed for {} {id}: {e}", kind.as_str());
        }
    }

    pub fn evict(&self, kind: BlobKind, id: &str) {
        let _ = fs::remove_file(self.path_for(kind, id));
    }
}
