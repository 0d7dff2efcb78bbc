pub mod fs_backend;

use crate::config::RepositoryConfig;
use crate::error::{PlakarError, Result};

/// The blob namespaces a backend must support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    Chunk,
    Object,
    Packfile,
    Header,
    Index,
    Filesystem,
    Metadata,
    Signature,
    Lock,
    RepoIndex,
}

impl BlobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKind::Chunk => "chunk",
            BlobKind::Object => "object",
            BlobKind::Packfile => "packfile",
            BlobKind::Header => "header",
            BlobKind::Index => "index",
            BlobKind::Filesystem => "filesystem",
            BlobKind::Metadata => "metadata",
            BlobKind::Signature => "signature",
            BlobKind::Lock => "lock",
            BlobKind::RepoIndex => "repoindex",
        }
    }

    /// Snapshot artifact kinds live under `snapshots/` keyed by UUID.
    pub fn is_snapshot_artifact(&self) -> bool {
        matches!(
            self,
            BlobKind::Header
                | BlobKind::Index
                | BlobKind::Filesystem
                | BlobKind::Metadata
                | BlobKind::Signature
        )
    }
}

/// Fixed id of the repository index blob.
pub const REPO_INDEX_ID: &str = "index";

/// Abstract blob CRUD for repository storage.
///
/// Ids are the lowercase hex of the blob's content digest, except snapshot
/// artifacts and locks (UUID strings) and the repository index (fixed id).
/// `put_blob` is idempotent: ids are content-addressed, so re-putting the
/// same id carries the same bytes.
pub trait BlobStore: Send + Sync {
    /// Initialize the repository layout and persist the CONFIG document.
    fn create(&self, config: &RepositoryConfig) -> Result<()>;

    /// Read and validate the CONFIG document.
    fn open(&self) -> Result<RepositoryConfig>;

    /// Read a blob. Returns `None` if not found.
    fn get_blob(&self, kind: BlobKind, id: &str) -> Result<Option<Vec<u8>>>;

    /// Read a byte range of a blob. The default fetches the whole blob and
    /// slices in memory; backends with ranged reads should override.
    fn get_blob_range(
        &self,
        kind: BlobKind,
        id: &str,
        offset: u64,
        length: u32,
    ) -> Result<Option<Vec<u8>>> {
        let Some(data) = self.get_blob(kind, id)? else {
            return Ok(None);
        };
        let start = offset as usize;
        let end = start + length as usize;
        if end > data.len() {
            return Err(PlakarError::InvalidFormat(format!(
                "range {offset}+{length} out of bounds for {} blob {id}",
                kind.as_str()
            )));
        }
        Ok(Some(data[start..end].to_vec()))
    }

    /// Write a blob. Overwrites if it already exists.
    fn put_blob(&self, kind: BlobKind, id: &str, data: &[u8]) -> Result<()>;

    /// Delete a blob. Deleting a missing blob is not an error.
    fn delete_blob(&self, kind: BlobKind, id: &str) -> Result<()>;

    /// List all blob ids of a kind.
    fn list_blobs(&self, kind: BlobKind) -> Result<Vec<String>>;

    /// Flush and release backend resources.
    fn close(&self) -> Result<()>;

    /// Human-readable location, for error messages.
    fn location(&self) -> String;
}

/// Build a storage backend for a repository location.
///
/// Only local filesystem paths are handled here; network drivers implement
/// `BlobStore` out of tree and plug in at repository construction.
pub fn backend_for_location(location: &str) -> Result<Box<dyn BlobStore>> {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return Err(PlakarError::Config(
            "repository location must not be empty".into(),
        ));
    }
    if let Some(path) = trimmed.strip_prefix("file://") {
        return Ok(Box::new(fs_backend::FsBackend::new(path)));
    }
    if trimmed.contains("://") {
        let scheme = trimmed.split("://").next().unwrap_or(trimmed);
        return Err(PlakarError::UnsupportedBackend(scheme.to_string()));
    }
    Ok(Box::new(fs_backend::FsBackend::new(trimmed)))
}
