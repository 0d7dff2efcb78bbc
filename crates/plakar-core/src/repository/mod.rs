pub mod cache;
pub mod index;
pub mod lock;

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::compress;
use crate::config::{CreateOptions, RepositoryConfig, COMPRESSION_DEFLATE, CONFIG_VERSION, ENCRYPTION_AES256GCM};
use crate::encryption::{self, Secret};
use crate::error::{PlakarError, Result};
use crate::hashing::{Hasher, Hashing};
use crate::objects::{Checksum, Object};
use crate::packfile::{BlobType, PackEntry};
use crate::storage::{BlobKind, BlobStore, REPO_INDEX_ID};

use self::cache::LocalCache;
use self::index::{PackLocation, RepositoryIndex};

/// Hashing, compression, and encryption bundled for the blob pipeline.
/// Shared (`Arc`) with push workers.
///
/// Write order is compress -> encrypt; read order is decrypt -> decompress.
/// Either step is skipped when the repository configuration leaves the
/// corresponding field empty.
pub struct Codec {
    hashing: Hashing,
    compression: bool,
    secret: Option<Secret>,
}

impl Codec {
    pub fn digest(&self, data: &[u8]) -> Checksum {
        self.hashing.digest(data)
    }

    pub fn hasher(&self) -> Hasher {
        self.hashing.hasher()
    }

    pub fn hashing(&self) -> Hashing {
        self.hashing
    }

    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = if self.compression {
            compress::deflate(data)?
        } else {
            data.to_vec()
        };
        if let Some(secret) = &self.secret {
            buffer = encryption::encrypt(secret, &buffer)?;
        }
        Ok(buffer)
    }

    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buffer = if let Some(secret) = &self.secret {
            encryption::decrypt(secret, data)?
        } else {
            data.to_vec()
        };
        if self.compression {
            buffer = compress::inflate(&buffer)?;
        }
        Ok(buffer)
    }
}

/// A handle to an opened repository.
pub struct Repository {
    storage: Box<dyn BlobStore>,
    pub config: RepositoryConfig,
    codec: Arc<Codec>,
    index: RepositoryIndex,
    index_dirty: bool,
    cache: Option<LocalCache>,
}

impl Repository {
    /// Initialize a new repository on the given storage.
    pub fn create(storage: Box<dyn BlobStore>, options: CreateOptions) -> Result<Repository> {
        Hashing::from_name(&options.hashing)?;

        let (encryption_name, encryption_key, secret) = match &options.passphrase {
            Some(passphrase) => {
                let secret = Secret::generate();
                let wrapped = secret.wrap(passphrase)?;
                (ENCRYPTION_AES256GCM.to_string(), Some(wrapped), Some(secret))
            }
            None => (String::new(), None, None),
        };

        let config = RepositoryConfig {
            version: CONFIG_VERSION.into(),
            repository_id: Uuid::new_v4(),
            hashing: options.hashing.clone(),
            compression: if options.compression {
                COMPRESSION_DEFLATE.into()
            } else {
                String::new()
            },
            encryption: encryption_name,
            encryption_key,
        };

        storage.create(&config)?;

        let codec = Arc::new(Codec {
            hashing: Hashing::from_name(&config.hashing)?,
            compression: !config.compression.is_empty(),
            secret,
        });

        let index = RepositoryIndex::new();
        let repo = Repository {
            storage,
            config,
            codec,
            index,
            index_dirty: false,
            cache: None,
        };
        repo.write_index_blob(&repo.index)?;

        debug!(repository = %repo.config.repository_id, "created repository");
        Ok(repo)
    }

    /// Open an existing repository, unwrapping the secret with `passphrase`
    /// when the configuration enables encryption.
    pub fn open(
        storage: Box<dyn BlobStore>,
        passphrase: Option<&str>,
        cache_dir: Option<std::path::PathBuf>,
    ) -> Result<Repository> {
        let config = storage.open()?;

        let secret = if config.encryption.is_empty() {
            None
        } else {
            let wrapped = config.encryption_key.as_ref().ok_or_else(|| {
                PlakarError::Config("encrypted repository is missing its encryption_key".into())
            })?;
            let passphrase = passphrase.ok_or_else(|| {
                PlakarError::Config("passphrase required for encrypted repository".into())
            })?;
            Some(Secret::unwrap_with(wrapped, passphrase)?)
        };

        let codec = Arc::new(Codec {
            hashing: Hashing::from_name(&config.hashing)?,
            compression: !config.compression.is_empty(),
            secret,
        });

        let index = match storage.get_blob(BlobKind::RepoIndex, REPO_INDEX_ID)? {
            Some(data) => {
                let raw = codec.decode(&data)?;
                RepositoryIndex::from_bytes(&raw)?
            }
            None => RepositoryIndex::new(),
        };

        let cache = cache_dir.and_then(|dir| LocalCache::open(dir, &config.repository_id));

        Ok(Repository {
            storage,
            config,
            codec,
            index,
            index_dirty: false,
            cache,
        })
    }

    pub fn storage(&self) -> &dyn BlobStore {
        self.storage.as_ref()
    }

    pub fn codec(&self) -> &Arc<Codec> {
        &self.codec
    }

    pub fn index(&self) -> &RepositoryIndex {
        &self.index
    }

    /// Mutable access to the repository index. Marks it dirty.
    pub fn index_mut(&mut self) -> &mut RepositoryIndex {
        self.index_dirty = true;
        &mut self.index
    }

    pub fn cache(&self) -> Option<&LocalCache> {
        self.cache.as_ref()
    }

    pub fn location(&self) -> String {
        self.storage.location()
    }

    fn write_index_blob(&self, index: &RepositoryIndex) -> Result<()> {
        let raw = index.to_bytes()?;
        let encoded = self.codec.encode(&raw)?;
        self.storage
            .put_blob(BlobKind::RepoIndex, REPO_INDEX_ID, &encoded)
    }

    /// Persist the repository index if it changed. Committing operations
    /// call this while holding the repository lock.
    pub fn save_index(&mut self) -> Result<()> {
        if !self.index_dirty {
            return Ok(());
        }
        self.write_index_blob(&self.index)?;
        self.index_dirty = false;
        debug!(
            chunks = self.index.chunk_count(),
            objects = self.index.object_count(),
            "persisted repository index"
        );
        Ok(())
    }

    /// Write a sealed packfile and record its entries in the index.
    pub fn commit_packfile(
        &mut self,
        checksum: Checksum,
        bytes: &[u8],
        entries: &[PackEntry],
    ) -> Result<()> {
        self.storage
            .put_blob(BlobKind::Packfile, &checksum.to_hex(), bytes)?;
        for entry in entries {
            let location = PackLocation {
                packfile: checksum,
                offset: entry.offset,
                length: entry.length,
            };
            match entry.blob_type {
                BlobType::Chunk => self.index.record_chunk(entry.checksum, location),
                BlobType::Object => self.index.record_object(entry.checksum, location),
            }
        }
        self.index_dirty = true;
        debug!(packfile = %checksum, blobs = entries.len(), bytes = bytes.len(), "wrote packfile");
        Ok(())
    }

    /// Fetch the encoded blob holding `checksum`, either as a packfile slice
    /// or from the legacy unpacked namespace.
    fn fetch_encoded(
        &self,
        location: Option<PackLocation>,
        legacy_kind: BlobKind,
        checksum: &Checksum,
    ) -> Result<Vec<u8>> {
        if let Some(loc) = location {
            return self
                .storage
                .get_blob_range(
                    BlobKind::Packfile,
                    &loc.packfile.to_hex(),
                    loc.offset,
                    loc.length,
                )?
                .ok_or_else(|| PlakarError::BlobNotFound {
                    kind: "packfile",
                    id: loc.packfile.to_hex(),
                });
        }
        self.storage
            .get_blob(legacy_kind, &checksum.to_hex())?
            .ok_or_else(|| PlakarError::BlobNotFound {
                kind: legacy_kind.as_str(),
                id: checksum.to_hex(),
            })
    }

    /// Read, decode, and verify one chunk.
    pub fn get_chunk(&self, checksum: &Checksum) -> Result<Vec<u8>> {
        let encoded =
            self.fetch_encoded(self.index.chunk_location(checksum), BlobKind::Chunk, checksum)?;
        let data = self.codec.decode(&encoded)?;
        let actual = self.codec.digest(&data);
        if actual != *checksum {
            return Err(PlakarError::ChecksumMismatch {
                context: "chunk".into(),
                expected: checksum.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(data)
    }

    /// Read, decode, and verify one object record.
    pub fn get_object(&self, checksum: &Checksum) -> Result<Object> {
        let encoded = self.fetch_encoded(
            self.index.object_location(checksum),
            BlobKind::Object,
            checksum,
        )?;
        let data = self.codec.decode(&encoded)?;
        let object: Object = rmp_serde::from_slice(&data)?;
        if object.checksum != *checksum {
            return Err(PlakarError::ChecksumMismatch {
                context: "object".into(),
                expected: checksum.to_hex(),
                actual: object.checksum.to_hex(),
            });
        }
        Ok(object)
    }

    /// Serialize-side artifact write: digests the raw bytes (the anchor the
    /// header records), encodes, stores, and mirrors into the local cache.
    /// Returns `(digest_of_raw, stored_size)`.
    pub fn put_artifact(&self, kind: BlobKind, id: &Uuid, raw: &[u8]) -> Result<(Checksum, u64)> {
        let digest = self.codec.digest(raw);
        let encoded = self.codec.encode(raw)?;
        let id_str = id.to_string();
        self.storage.put_blob(kind, &id_str, &encoded)?;
        if let Some(cache) = &self.cache {
            cache.put(kind, &id_str, &encoded);
        }
        Ok((digest, encoded.len() as u64))
    }

    /// Read-side artifact fetch: consults the local cache first, decodes,
    /// and returns the raw bytes along with their digest.
    pub fn get_artifact(&self, kind: BlobKind, id: &Uuid) -> Result<(Vec<u8>, Checksum)> {
        let id_str = id.to_string();

        let mut from_cache = false;
        let encoded = match self.cache.as_ref().and_then(|c| c.get(kind, &id_str)) {
            Some(data) => {
                from_cache = true;
                data
            }
            None => self
                .storage
                .get_blob(kind, &id_str)?
                .ok_or_else(|| PlakarError::BlobNotFound {
                    kind: kind.as_str(),
                    id: id_str.clone(),
                })?,
        };

        let raw = match self.codec.decode(&encoded) {
            Ok(raw) => raw,
            // A stale or corrupt cache entry must never poison a load.
            Err(e) if from_cache => {
                warn!(kind = kind.as_str(), id = %id_str, "cache entry corrupt, refetching: {e}");
                if let Some(cache) = &self.cache {
                    cache.evict(kind, &id_str);
                }
                let encoded = self
                    .storage
                    .get_blob(kind, &id_str)?
                    .ok_or_else(|| PlakarError::BlobNotFound {
                        kind: kind.as_str(),
                        id: id_str.clone(),
                    })?;
                self.codec.decode(&encoded)?
            }
            Err(e) => return Err(e),
        };

        if !from_cache {
            if let Some(cache) = &self.cache {
                cache.put(kind, &id_str, &encoded);
            }
        }

        let digest = self.codec.digest(&raw);
        Ok((raw, digest))
    }

    /// All committed snapshot ids (those with a HEADER blob).
    pub fn snapshot_ids(&self) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        for id in self.storage.list_blobs(BlobKind::Header)? {
            match Uuid::parse_str(&id) {
                Ok(uuid) => ids.push(uuid),
                Err(_) => warn!(id = %id, "ignoring non-UUID header blob"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Resolve a (possibly partial) snapshot id.
    pub fn resolve_snapshot(&self, prefix: &str) -> Result<Uuid> {
        let needle = prefix.to_ascii_lowercase();
        let matches: Vec<Uuid> = self
            .snapshot_ids()?
            .into_iter()
            .filter(|id| id.to_string().starts_with(&needle))
            .collect();
        match matches.len() {
            0 => Err(PlakarError::SnapshotNotFound(prefix.to_string())),
            1 => Ok(matches[0]),
            _ => Err(PlakarError::AmbiguousSnapshot(prefix.to_string())),
        }
    }

    pub fn close(&self) -> Result<()> {
        self.storage.close()
    }
}
