use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PlakarError, Result};
use crate::objects::{Checksum, Chunk, Object};

/// Object record in interned form: content type and chunk references are
/// offsets into the index's tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedObject {
    pub chunk_offsets: Vec<u32>,
    pub content_type: u32,
}

/// The per-snapshot index: interned chunk, object, content-type, and
/// pathname tables plus the mappings between them. Lookup maps are rebuilt
/// after deserialization.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SnapshotIndex {
    chunks_list: Vec<Chunk>,
    chunks_checksum_list: Vec<Checksum>,
    objects_list: Vec<IndexedObject>,
    objects_checksum_list: Vec<Checksum>,
    content_types: Vec<String>,
    pathnames: Vec<String>,
    object_to_pathnames: HashMap<u32, Vec<u32>>,
    pathname_to_object: HashMap<u32, u32>,

    #[serde(skip)]
    chunks_map: HashMap<Checksum, u32>,
    #[serde(skip)]
    objects_map: HashMap<Checksum, u32>,
    #[serde(skip)]
    content_types_map: HashMap<String, u32>,
    #[serde(skip)]
    pathnames_map: HashMap<String, u32>,
}

impl SnapshotIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a chunk record, deduplicating by checksum.
    pub fn add_chunk(&mut self, chunk: Chunk) -> u32 {
        if let Some(id) = self.chunks_map.get(&chunk.checksum) {
            return *id;
        }
        let id = self.chunks_list.len() as u32;
        self.chunks_map.insert(chunk.checksum, id);
        self.chunks_checksum_list.push(chunk.checksum);
        self.chunks_list.push(chunk);
        id
    }

    fn intern_content_type(&mut self, content_type: &str) -> u32 {
        if let Some(id) = self.content_types_map.get(content_type) {
            return *id;
        }
        let id = self.content_types.len() as u32;
        self.content_types_map.insert(content_type.to_string(), id);
        self.content_types.push(content_type.to_string());
        id
    }

    fn intern_pathname(&mut self, pathname: &str) -> u32 {
        if let Some(id) = self.pathnames_map.get(pathname) {
            return *id;
        }
        let id = self.pathnames.len() as u32;
        self.pathnames_map.insert(pathname.to_string(), id);
        self.pathnames.push(pathname.to_string());
        id
    }

    /// Intern an object record. Every chunk it references must already be
    /// in the chunk table.
    pub fn add_object(&mut self, object: &Object) -> Result<u32> {
        if let Some(id) = self.objects_map.get(&object.checksum) {
            return Ok(*id);
        }
        let mut chunk_offsets = Vec::with_capacity(object.chunks.len());
        for checksum in &object.chunks {
            let offset = self.chunks_map.get(checksum).ok_or_else(|| {
                PlakarError::Other(format!("object references unknown chunk {checksum}"))
            })?;
            chunk_offsets.push(*offset);
        }
        let content_type = self.intern_content_type(&object.content_type);

        let id = self.objects_list.len() as u32;
        self.objects_map.insert(object.checksum, id);
        self.objects_checksum_list.push(object.checksum);
        self.objects_list.push(IndexedObject {
            chunk_offsets,
            content_type,
        });
        Ok(id)
    }

    /// Associate a pathname with an object already in the table.
    pub fn link_pathname(&mut self, pathname: &str, object_checksum: &Checksum) -> Result<()> {
        let object_id = *self.objects_map.get(object_checksum).ok_or_else(|| {
            PlakarError::Other(format!("pathname links unknown object {object_checksum}"))
        })?;
        let pathname_id = self.intern_pathname(pathname);
        self.pathname_to_object.insert(pathname_id, object_id);
        let pathnames = self.object_to_pathnames.entry(object_id).or_default();
        if !pathnames.contains(&pathname_id) {
            pathnames.push(pathname_id);
        }
        Ok(())
    }

    /// Materialize the object record a pathname resolves to.
    pub fn object_for_pathname(&self, pathname: &str) -> Option<Object> {
        let pathname_id = self.pathnames_map.get(pathname)?;
        let object_id = self.pathname_to_object.get(pathname_id)?;
        self.object_at(*object_id)
    }

    pub fn object_at(&self, object_id: u32) -> Option<Object> {
        let indexed = self.objects_list.get(object_id as usize)?;
        let checksum = *self.objects_checksum_list.get(object_id as usize)?;
        let chunks = indexed
            .chunk_offsets
            .iter()
            .map(|off| self.chunks_checksum_list[*off as usize])
            .collect();
        let content_type = self.content_types[indexed.content_type as usize].clone();
        Some(Object {
            checksum,
            chunks,
            content_type,
        })
    }

    /// Pathnames that reference an object.
    pub fn pathnames_for_object(&self, object_checksum: &Checksum) -> Vec<&str> {
        let Some(object_id) = self.objects_map.get(object_checksum) else {
            return Vec::new();
        };
        self.object_to_pathnames
            .get(object_id)
            .map(|ids| {
                ids.iter()
                    .map(|id| self.pathnames[*id as usize].as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn chunk_at(&self, chunk_id: u32) -> Option<&Chunk> {
        self.chunks_list.get(chunk_id as usize)
    }

    pub fn chunk_checksums(&self) -> &[Checksum] {
        &self.chunks_checksum_list
    }

    pub fn object_checksums(&self) -> &[Checksum] {
        &self.objects_checksum_list
    }

    pub fn pathnames(&self) -> impl Iterator<Item = &str> {
        self.pathnames.iter().map(String::as_str)
    }

    pub fn objects(&self) -> impl Iterator<Item = Object> + '_ {
        (0..self.objects_list.len() as u32).filter_map(|id| self.object_at(id))
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks_list.len()
    }

    pub fn object_count(&self) -> usize {
        self.objects_list.len()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Deserialize and rebuild the lookup maps from the interned tables.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut index: SnapshotIndex = rmp_serde::from_slice(data)?;
        index.chunks_map = index
            .chunks_checksum_list
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, i as u32))
            .collect();
        index.objects_map = index
            .objects_checksum_list
            .iter()
            .enumerate()
            .map(|(i, c)| (*c, i as u32))
            .collect();
        index.content_types_map = index
            .content_types
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect();
        index.pathnames_map = index
            .pathnames
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect();
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksum(byte: u8) -> Checksum {
        Checksum([byte; 32])
    }

    fn sample_index() -> SnapshotIndex {
        let mut index = SnapshotIndex::new();
        index.add_chunk(Chunk {
            checksum: checksum(1),
            start: 0,
            length: 100,
        });
        index.add_chunk(Chunk {
            checksum: checksum(2),
            start: 100,
            length: 50,
        });
        let object = Object {
            checksum: checksum(10),
            chunks: vec![checksum(1), checksum(2)],
            content_type: "text/plain".into(),
        };
        index.add_object(&object).unwrap();
        index.link_pathname("/etc/hosts", &checksum(10)).unwrap();
        index
    }

    #[test]
    fn pathname_resolves_to_object() {
        let index = sample_index();
        let object = index.object_for_pathname("/etc/hosts").unwrap();
        assert_eq!(object.checksum, checksum(10));
        assert_eq!(object.chunks, vec![checksum(1), checksum(2)]);
        assert_eq!(object.content_type, "text/plain");
        assert!(index.object_for_pathname("/missing").is_none());
    }

    #[test]
    fn chunks_are_deduplicated() {
        let mut index = sample_index();
        let id = index.add_chunk(Chunk {
            checksum: checksum(1),
            start: 999,
            length: 1,
        });
        assert_eq!(id, 0);
        assert_eq!(index.chunk_count(), 2);
        // The original record wins.
        assert_eq!(index.chunk_at(0).unwrap().length, 100);
    }

    #[test]
    fn object_requires_known_chunks() {
        let mut index = SnapshotIndex::new();
        let object = Object {
            checksum: checksum(10),
            chunks: vec![checksum(42)],
            content_type: String::new(),
        };
        assert!(index.add_object(&object).is_err());
    }

    #[test]
    fn multiple_pathnames_share_one_object() {
        let mut index = sample_index();
        index.link_pathname("/etc/hosts.bak", &checksum(10)).unwrap();

        assert_eq!(index.object_count(), 1);
        let mut paths = index.pathnames_for_object(&checksum(10));
        paths.sort();
        assert_eq!(paths, vec!["/etc/hosts", "/etc/hosts.bak"]);
    }

    #[test]
    fn roundtrip_rebuilds_lookup_maps() {
        let index = sample_index();
        let bytes = index.serialize().unwrap();
        let back = SnapshotIndex::from_bytes(&bytes).unwrap();

        let object = back.object_for_pathname("/etc/hosts").unwrap();
        assert_eq!(object.checksum, checksum(10));
        assert_eq!(back.chunk_count(), 2);
        assert_eq!(back.chunk_checksums(), index.chunk_checksums());

        // Interning still works after the rebuild.
        let mut back = back;
        let id = back.add_chunk(Chunk {
            checksum: checksum(2),
            start: 0,
            length: 1,
        });
        assert_eq!(id, 1);
    }
}
