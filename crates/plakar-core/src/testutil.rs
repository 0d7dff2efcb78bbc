use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crate::config::{CreateOptions, RepositoryConfig};
use crate::context::AppContext;
use crate::error::{PlakarError, Result};
use crate::repository::Repository;
use crate::storage::{BlobKind, BlobStore};

/// In-memory storage backend for testing. Thread-safe via Mutex.
pub struct MemoryBackend {
    config: RwLock<Option<RepositoryConfig>>,
    data: Mutex<HashMap<(&'static str, String), Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            config: RwLock::new(None),
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl BlobStore for MemoryBackend {
    fn create(&self, config: &RepositoryConfig) -> Result<()> {
        let mut slot = self.config.write().unwrap();
        if slot.is_some() {
            return Err(PlakarError::RepoAlreadyExists("memory".into()));
        }
        *slot = Some(config.clone());
        Ok(())
    }

    fn open(&self) -> Result<RepositoryConfig> {
        self.config
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| PlakarError::RepoNotFound("memory".into()))
    }

    fn get_blob(&self, kind: BlobKind, id: &str) -> Result<Option<Vec<u8>>> {
        let map = self.data.lock().unwrap();
        Ok(map.get(&(kind.as_str(), id.to_string())).cloned())
    }

    fn put_blob(&self, kind: BlobKind, id: &str, data: &[u8]) -> Result<()> {
        let mut map = self.data.lock().unwrap();
        map.insert((kind.as_str(), id.to_string()), data.to_vec());
        Ok(())
    }

    fn delete_blob(&self, kind: BlobKind, id: &str) -> Result<()> {
        let mut map = self.data.lock().unwrap();
        map.remove(&(kind.as_str(), id.to_string()));
        Ok(())
    }

    fn list_blobs(&self, kind: BlobKind) -> Result<Vec<String>> {
        let map = self.data.lock().unwrap();
        Ok(map
            .keys()
            .filter(|(k, _)| *k == kind.as_str())
            .map(|(_, id)| id.clone())
            .collect())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn location(&self) -> String {
        "memory".into()
    }
}

pub fn memory_backend() -> MemoryBackend {
    MemoryBackend::new()
}

/// An `AppContext` that never touches the user's cache directory.
pub fn test_context() -> AppContext {
    let mut ctx = AppContext::new("plakar test".into());
    ctx.cache_dir = None;
    ctx.num_cpu = 2;
    ctx
}

/// Create a plaintext, uncompressed repository backed by MemoryBackend.
pub fn memory_repo_plain() -> Repository {
    Repository::create(
        Box::new(MemoryBackend::new()),
        CreateOptions {
            hashing: "sha256".into(),
            compression: false,
            passphrase: None,
        },
    )
    .unwrap()
}
