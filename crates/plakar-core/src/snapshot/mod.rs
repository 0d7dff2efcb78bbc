pub mod header;
pub mod index;
pub mod metadata;
pub mod reader;
pub mod vfs;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::{PlakarError, Result};
use crate::repository::Repository;
use crate::signify::{PublicKey, SecretKey};
use crate::storage::BlobKind;

use self::header::Header;
use self::index::SnapshotIndex;
use self::metadata::Metadata;
use self::reader::Reader;
use self::vfs::Filesystem;

/// An immutable point-in-time record of one or more source trees:
/// the header plus the three content artifacts it anchors.
#[derive(Debug)]
pub struct Snapshot {
    pub id: Uuid,
    pub header: Header,
    pub index: SnapshotIndex,
    pub filesystem: Filesystem,
    pub metadata: Metadata,
}

impl Snapshot {
    /// Scaffold a fresh snapshot for a push.
    pub fn new(ctx: &AppContext) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            header: Header::new(id, ctx),
            index: SnapshotIndex::new(),
            filesystem: Filesystem::new(),
            metadata: Metadata::new(),
        }
    }

    /// Serialize and publish the snapshot artifacts.
    ///
    /// Order matters: index, filesystem, and metadata first, then the
    /// signature, then the header. The header is the only blob a loader
    /// trusts as an entry point, so a crash mid-commit leaves only orphans.
    pub fn commit(&mut self, repo: &Repository, sign_key: Option<&SecretKey>) -> Result<()> {
        let index_bytes = self.index.serialize()?;
        let (checksum, stored) = repo.put_artifact(BlobKind::Index, &self.id, &index_bytes)?;
        self.header.index_checksum = checksum;
        self.header.index_size = index_bytes.len() as u64;
        self.header.index_stored_size = stored;

        let fs_bytes = self.filesystem.serialize()?;
        let (checksum, stored) = repo.put_artifact(BlobKind::Filesystem, &self.id, &fs_bytes)?;
        self.header.filesystem_checksum = checksum;
        self.header.filesystem_size = fs_bytes.len() as u64;
        self.header.filesystem_stored_size = stored;

        let md_bytes = self.metadata.serialize()?;
        let (checksum, stored) = repo.put_artifact(BlobKind::Metadata, &self.id, &md_bytes)?;
        self.header.metadata_checksum = checksum;
        self.header.metadata_size = md_bytes.len() as u64;
        self.header.metadata_stored_size = stored;

        if let Some(key) = sign_key {
            self.header.public_key = key.public().to_bytes();
        }

        // The signed payload is the digest of the raw serialized header
        // bytes, computed identically on load.
        let header_bytes = self.header.serialize()?;
        if let Some(key) = sign_key {
            let digest = repo.codec().digest(&header_bytes);
            let signature = key.sign(&digest);
            repo.put_artifact(BlobKind::Signature, &self.id, &signature)?;
        }

        repo.put_artifact(BlobKind::Header, &self.id, &header_bytes)?;

        debug!(snapshot = %self.header.short_id(), signed = sign_key.is_some(), "committed snapshot");
        Ok(())
    }

    /// Load a snapshot, verifying its signature and artifact anchors.
    pub fn load(repo: &Repository, id: Uuid) -> Result<Snapshot> {
        trace!(snapshot = %id, "loading snapshot");

        let (header_bytes, header_digest) = match repo.get_artifact(BlobKind::Header, &id) {
            Ok(found) => found,
            Err(PlakarError::BlobNotFound { kind: "header", .. }) => {
                return Err(PlakarError::SnapshotNotFound(id.to_string()))
            }
            Err(e) => return Err(e),
        };
        let header = Header::from_bytes(&header_bytes)?;

        if header.is_signed() {
            let (signature, _) = match repo.get_artifact(BlobKind::Signature, &id) {
                Ok(found) => found,
                Err(PlakarError::BlobNotFound { .. }) => {
                    return Err(PlakarError::SignatureMismatch)
                }
                Err(e) => return Err(e),
            };
            let public_key = PublicKey::from_bytes(&header.public_key)?;
            public_key.verify(&header_digest, &signature)?;
        }

        let (index_bytes, index_digest) = repo.get_artifact(BlobKind::Index, &id)?;
        if index_digest != header.index_checksum {
            return Err(PlakarError::ChecksumMismatch {
                context: format!("snapshot {id} index"),
                expected: header.index_checksum.to_hex(),
                actual: index_digest.to_hex(),
            });
        }
        let index = SnapshotIndex::from_bytes(&index_bytes)?;

        let (fs_bytes, fs_digest) = repo.get_artifact(BlobKind::Filesystem, &id)?;
        if fs_digest != header.filesystem_checksum {
            return Err(PlakarError::ChecksumMismatch {
                context: format!("snapshot {id} filesystem"),
                expected: header.filesystem_checksum.to_hex(),
                actual: fs_digest.to_hex(),
            });
        }
        let filesystem = Filesystem::from_bytes(&fs_bytes)?;

        let (md_bytes, md_digest) = repo.get_artifact(BlobKind::Metadata, &id)?;
        if md_digest != header.metadata_checksum {
            return Err(PlakarError::ChecksumMismatch {
                context: format!("snapshot {id} metadata"),
                expected: header.metadata_checksum.to_hex(),
                actual: md_digest.to_hex(),
            });
        }
        let metadata = Metadata::from_bytes(&md_bytes)?;

        Ok(Snapshot {
            id,
            header,
            index,
            filesystem,
            metadata,
        })
    }

    /// Load only the header artifact (listings, GC liveness).
    pub fn load_header(repo: &Repository, id: Uuid) -> Result<Header> {
        let (header_bytes, _) = match repo.get_artifact(BlobKind::Header, &id) {
            Ok(found) => found,
            Err(PlakarError::BlobNotFound { kind: "header", .. }) => {
                return Err(PlakarError::SnapshotNotFound(id.to_string()))
            }
            Err(e) => return Err(e),
        };
        Header::from_bytes(&header_bytes)
    }

    /// Open a verified single-pass reader over one file's content.
    pub fn reader<'r>(&self, repo: &'r Repository, pathname: &str) -> Result<Reader<'r>> {
        let object = self
            .index
            .object_for_pathname(pathname)
            .ok_or_else(|| PlakarError::BlobNotFound {
                kind: "pathname",
                id: pathname.to_string(),
            })?;
        Ok(Reader::new(repo, &object))
    }
}
