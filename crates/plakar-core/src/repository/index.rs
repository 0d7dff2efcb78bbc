use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{PlakarError, Result};
use crate::objects::Checksum;

pub const REPO_INDEX_VERSION: u32 = 1;

/// Where a chunk or object lives inside a packfile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackLocation {
    pub packfile: Checksum,
    pub offset: u64,
    pub length: u32,
}

/// Process-wide map from content digests to packfile locations.
///
/// Checksums are interned once; chunk and object mappings reference the
/// interned id. Loaded at open, persisted as one versioned blob by each
/// committing operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryIndex {
    version: u32,
    checksums: HashMap<Checksum, u32>,
    next_id: u32,
    chunks: HashMap<u32, PackLocation>,
    objects: HashMap<u32, PackLocation>,
}

impl RepositoryIndex {
    pub fn new() -> Self {
        Self {
            version: REPO_INDEX_VERSION,
            checksums: HashMap::new(),
            next_id: 0,
            chunks: HashMap::new(),
            objects: HashMap::new(),
        }
    }

    fn intern(&mut self, checksum: Checksum) -> u32 {
        if let Some(id) = self.checksums.get(&checksum) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.checksums.insert(checksum, id);
        id
    }

    /// Record a chunk's pack location. Idempotent: the first location wins.
    pub fn record_chunk(&mut self, checksum: Checksum, location: PackLocation) {
        let id = self.intern(checksum);
        self.chunks.entry(id).or_insert(location);
    }

    /// Record an object's pack location. Idempotent: the first location wins.
    pub fn record_object(&mut self, checksum: Checksum, location: PackLocation) {
        let id = self.intern(checksum);
        self.objects.entry(id).or_insert(location);
    }

    pub fn has_chunk(&self, checksum: &Checksum) -> bool {
        self.checksums
            .get(checksum)
            .is_some_and(|id| self.chunks.contains_key(id))
    }

    pub fn has_object(&self, checksum: &Checksum) -> bool {
        self.checksums
            .get(checksum)
            .is_some_and(|id| self.objects.contains_key(id))
    }

    pub fn chunk_location(&self, checksum: &Checksum) -> Option<PackLocation> {
        self.checksums
            .get(checksum)
            .and_then(|id| self.chunks.get(id))
            .copied()
    }

    pub fn object_location(&self, checksum: &Checksum) -> Option<PackLocation> {
        self.checksums
            .get(checksum)
            .and_then(|id| self.objects.get(id))
            .copied()
    }

    pub fn packfile_for_chunk(&self, checksum: &Checksum) -> Option<Checksum> {
        self.chunk_location(checksum).map(|loc| loc.packfile)
    }

    pub fn packfile_for_object(&self, checksum: &Checksum) -> Option<Checksum> {
        self.object_location(checksum).map(|loc| loc.packfile)
    }

    /// All distinct packfiles referenced by the index.
    pub fn packfiles(&self) -> HashSet<Checksum> {
        self.chunks
            .values()
            .chain(self.objects.values())
            .map(|loc| loc.packfile)
            .collect()
    }

    /// Drop every chunk and object mapping that points at `packfile`, then
    /// release interned checksums with no remaining mapping. Used by the
    /// garbage collector when a packfile is deleted.
    pub fn forget_packfile(&mut self, packfile: &Checksum) {
        self.chunks.retain(|_, loc| loc.packfile != *packfile);
        self.objects.retain(|_, loc| loc.packfile != *packfile);
        let chunks = &self.chunks;
        let objects = &self.objects;
        self.checksums
            .retain(|_, id| chunks.contains_key(id) || objects.contains_key(id));
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.objects.is_empty()
    }

    /// Snapshot of all known chunk checksums, shared read-only with the push
    /// pipeline's dedup stage.
    pub fn chunk_checksums(&self) -> HashSet<Checksum> {
        self.checksums
            .iter()
            .filter(|(_, id)| self.chunks.contains_key(*id))
            .map(|(checksum, _)| *checksum)
            .collect()
    }

    pub fn object_checksums(&self) -> HashSet<Checksum> {
        self.checksums
            .iter()
            .filter(|(_, id)| self.objects.contains_key(*id))
            .map(|(checksum, _)| *checksum)
            .collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let index: RepositoryIndex = rmp_serde::from_slice(data)?;
        if index.version != REPO_INDEX_VERSION {
            return Err(PlakarError::UnsupportedVersion(format!(
                "repository index version {}",
                index.version
            )));
        }
        Ok(index)
    }
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self::new()
    }
}
