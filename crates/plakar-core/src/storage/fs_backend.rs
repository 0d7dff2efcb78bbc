use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::config::RepositoryConfig;
use crate::error::{PlakarError, Result};
use crate::storage::{BlobKind, BlobStore};

/// Filesystem storage backend.
///
/// Layout under the root:
/// ```text
/// CONFIG                       JSON config
/// packfiles/<aa>/<hex>         packfile blobs, sharded by first byte pair
/// chunks/<aa>/<hex>            legacy unpacked chunks
/// objects/<aa>/<hex>           legacy unpacked objects
/// snapshots/<uu>/<UUID>/...    HEADER, INDEX, FILESYSTEM, METADATA, SIGNATURE
/// locks/<uuid>                 lock blobs
/// index                        repository index blob
/// ```
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reject ids that could escape the repository root.
    fn validate_id(id: &str) -> Result<()> {
        if id.len() < 2 || id.contains('/') || id.contains('\\') || id.contains("..") {
            return Err(PlakarError::InvalidFormat(format!(
                "unsafe blob id '{id}'"
            )));
        }
        Ok(())
    }

    fn artifact_filename(kind: BlobKind) -> &'static str {
        match kind {
            BlobKind::Header => "HEADER",
            BlobKind::Index => "INDEX",
            BlobKind::Filesystem => "FILESYSTEM",
            BlobKind::Metadata => "METADATA",
            BlobKind::Signature => "SIGNATURE",
            _ => unreachable!("not a snapshot artifact kind"),
        }
    }

    fn resolve(&self, kind: BlobKind, id: &str) -> Result<PathBuf> {
        Self::validate_id(id)?;
        let path = match kind {
            BlobKind::Chunk => self.root.join("chunks").join(&id[..2]).join(id),
            BlobKind::Object => self.root.join("objects").join(&id[..2]).join(id),
            BlobKind::Packfile => self.root.join("packfiles").join(&id[..2]).join(id),
            BlobKind::Lock => self.root.join("locks").join(id),
            BlobKind::RepoIndex => self.root.join("index"),
            kind if kind.is_snapshot_artifact() => self
                .root
                .join("snapshots")
                .join(&id[..2])
                .join(id)
                .join(Self::artifact_filename(kind)),
            _ => unreachable!(),
        };
        Ok(path)
    }

    /// Collect file names two levels below `dir` (sharded namespaces).
    fn list_sharded(&self, dir: &str) -> Result<Vec<String>> {
        let base = self.root.join(dir);
        let mut ids = Vec::new();
        let shards = match fs::read_dir(&base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for shard in shards {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(ids)
    }

    /// Collect snapshot UUIDs that carry the given artifact file.
    fn list_artifacts(&self, kind: BlobKind) -> Result<Vec<String>> {
        let filename = Self::artifact_filename(kind);
        let base = self.root.join("snapshots");
        let mut ids = Vec::new();
        let shards = match fs::read_dir(&base) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for shard in shards {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                if entry.path().join(filename).is_file() {
                    ids.push(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }
        Ok(ids)
    }
}

impl BlobStore for FsBackend {
    fn create(&self, config: &RepositoryConfig) -> Result<()> {
        let config_path = self.root.join("CONFIG");
        if config_path.exists() {
            return Err(PlakarError::RepoAlreadyExists(
                self.root.display().to_string(),
            ));
        }
        fs::create_dir_all(&self.root)?;
        for dir in ["chunks", "objects", "packfiles", "snapshots", "locks"] {
            fs::create_dir_all(self.root.join(dir))?;
        }
        fs::write(&config_path, config.to_json()?)?;
        Ok(())
    }

    fn open(&self) -> Result<RepositoryConfig> {
        let data = match fs::read(self.root.join("CONFIG")) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlakarError::RepoNotFound(self.root.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        RepositoryConfig::from_json(&data)
    }

    fn get_blob(&self, kind: BlobKind, id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(kind, id)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_blob_range(
        &self,
        kind: BlobKind,
        id: &str,
        offset: u64,
        length: u32,
    ) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(kind, id)?;
        let mut file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if filled < buf.len() {
            return Err(PlakarError::InvalidFormat(format!(
                "short read at {offset}+{length} in {} blob {id}",
                kind.as_str()
            )));
        }
        Ok(Some(buf))
    }

    fn put_blob(&self, kind: BlobKind, id: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(kind, id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        Ok(())
    }

    fn delete_blob(&self, kind: BlobKind, id: &str) -> Result<()> {
        let path = self.resolve(kind, id)?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        // Drop the per-snapshot directory once its last artifact is gone.
        if kind.is_snapshot_artifact() {
            if let Some(parent) = path.parent() {
                let _ = fs::remove_dir(parent);
            }
        }
        Ok(())
    }

    fn list_blobs(&self, kind: BlobKind) -> Result<Vec<String>> {
        match kind {
            BlobKind::Chunk => self.list_sharded("chunks"),
            BlobKind::Object => self.list_sharded("objects"),
            BlobKind::Packfile => self.list_sharded("packfiles"),
            BlobKind::Lock => {
                let base = self.root.join("locks");
                let mut ids = Vec::new();
                let entries = match fs::read_dir(&base) {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
                    Err(e) => return Err(e.into()),
                };
                for entry in entries {
                    ids.push(entry?.file_name().to_string_lossy().into_owned());
                }
                Ok(ids)
            }
            BlobKind::RepoIndex => {
                if self.root.join("index").is_file() {
                    Ok(vec![super::REPO_INDEX_ID.to_string()])
                } else {
                    Ok(Vec::new())
                }
            }
            kind => self.list_artifacts(kind),
        }
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_VERSION;
    use uuid::Uuid;

    fn test_config() -> RepositoryConfig {
        RepositoryConfig {
            version: CONFIG_VERSION.into(),
            repository_id: Uuid::new_v4(),
            hashing: "sha256".into(),
            compression: String::new(),
            encryption: String::new(),
            encryption_key: None,
        }
    }

    #[test]
    fn create_then_open_roundtrips_config() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().join("repo"));
        let config = test_config();
        backend.create(&config).unwrap();
        let opened = backend.open().unwrap();
        assert_eq!(opened.repository_id, config.repository_id);
    }

    #[test]
    fn create_refuses_existing_repo() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());
        backend.create(&test_config()).unwrap();
        assert!(matches!(
            backend.create(&test_config()),
            Err(PlakarError::RepoAlreadyExists(_))
        ));
    }

    #[test]
    fn open_missing_repo_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().join("nope"));
        assert!(matches!(
            backend.open(),
            Err(PlakarError::RepoNotFound(_))
        ));
    }

    #[test]
    fn packfile_blobs_are_sharded() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());
        backend.create(&test_config()).unwrap();

        let id = "ab".repeat(32);
        backend.put_blob(BlobKind::Packfile, &id, b"data").unwrap();
        assert!(dir.path().join("packfiles/ab").join(&id).is_file());
        assert_eq!(
            backend.get_blob(BlobKind::Packfile, &id).unwrap().unwrap(),
            b"data"
        );
        assert_eq!(backend.list_blobs(BlobKind::Packfile).unwrap(), vec![id]);
    }

    #[test]
    fn snapshot_artifacts_share_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());
        backend.create(&test_config()).unwrap();

        let id = Uuid::new_v4().to_string();
        backend.put_blob(BlobKind::Header, &id, b"h").unwrap();
        backend.put_blob(BlobKind::Index, &id, b"i").unwrap();

        let snap_dir = dir.path().join("snapshots").join(&id[..2]).join(&id);
        assert!(snap_dir.join("HEADER").is_file());
        assert!(snap_dir.join("INDEX").is_file());

        assert_eq!(backend.list_blobs(BlobKind::Header).unwrap(), vec![id.clone()]);
        // No FILESYSTEM written yet.
        assert!(backend.list_blobs(BlobKind::Filesystem).unwrap().is_empty());
    }

    #[test]
    fn get_blob_range_reads_slices() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());
        backend.create(&test_config()).unwrap();

        let id = "cd".repeat(32);
        backend
            .put_blob(BlobKind::Packfile, &id, b"0123456789")
            .unwrap();
        let slice = backend
            .get_blob_range(BlobKind::Packfile, &id, 2, 4)
            .unwrap()
            .unwrap();
        assert_eq!(slice, b"2345");
    }

    #[test]
    fn get_blob_range_rejects_short_reads() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());
        backend.create(&test_config()).unwrap();

        let id = "ef".repeat(32);
        backend.put_blob(BlobKind::Packfile, &id, b"0123").unwrap();
        assert!(backend
            .get_blob_range(BlobKind::Packfile, &id, 2, 10)
            .is_err());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());
        backend.create(&test_config()).unwrap();
        let id = "00".repeat(32);
        backend.put_blob(BlobKind::Chunk, &id, b"x").unwrap();
        backend.delete_blob(BlobKind::Chunk, &id).unwrap();
        backend.delete_blob(BlobKind::Chunk, &id).unwrap();
        assert!(backend.get_blob(BlobKind::Chunk, &id).unwrap().is_none());
    }

    #[test]
    fn unsafe_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());
        assert!(backend.get_blob(BlobKind::Chunk, "../escape").is_err());
        assert!(backend.get_blob(BlobKind::Chunk, "a/b").is_err());
        assert!(backend.get_blob(BlobKind::Chunk, "").is_err());
    }
}
