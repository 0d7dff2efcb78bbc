//! Packfile assembly and trailer parsing.
//!
//! Wire format, parsed from the end:
//! ```text
//! blob_1 || ... || blob_N ||
//!   index_entry_1 || ... || index_entry_N ||
//!   u32_le index_length || u32_le version || magic "PLKR"
//! ```
//! `index_entry = u8 kind || 32B checksum || u64_le offset || u32_le length`.

use std::collections::HashSet;

use crate::error::{PlakarError, Result};
use crate::hashing::Hashing;
use crate::objects::Checksum;

pub const PACK_MAGIC: &[u8; 4] = b"PLKR";
pub const PACK_VERSION: u32 = 1;
pub const ENTRY_SIZE: usize = 1 + 32 + 8 + 4;
const TRAILER_FOOTER_SIZE: usize = 4 + 4 + 4; // index_length + version + magic

/// Default buffered-size threshold before a pack is sealed.
pub const DEFAULT_PACK_TARGET: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlobType {
    Chunk = 0,
    Object = 1,
}

impl BlobType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(BlobType::Chunk),
            1 => Ok(BlobType::Object),
            other => Err(PlakarError::InvalidFormat(format!(
                "unknown packfile blob kind: {other}"
            ))),
        }
    }
}

/// One entry in a packfile's trailing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackEntry {
    pub blob_type: BlobType,
    pub checksum: Checksum,
    pub offset: u64,
    pub length: u32,
}

/// Accumulates encoded blobs and seals them into a packfile.
///
/// Entries are written in the order received, so a producer that emits one
/// file's chunks contiguously gets chunk locality inside the pack.
pub struct PackWriter {
    target_size: usize,
    buffer: Vec<u8>,
    entries: Vec<PackEntry>,
    pending: HashSet<Checksum>,
}

impl PackWriter {
    pub fn new(target_size: usize) -> Self {
        Self {
            target_size,
            buffer: Vec::new(),
            entries: Vec::new(),
            pending: HashSet::new(),
        }
    }

    /// Append an encoded blob. Returns the blob's offset within the pack.
    pub fn add_blob(&mut self, blob_type: BlobType, checksum: Checksum, data: &[u8]) -> u64 {
        let offset = self.buffer.len() as u64;
        self.buffer.extend_from_slice(data);
        self.entries.push(PackEntry {
            blob_type,
            checksum,
            offset,
            length: data.len() as u32,
        });
        self.pending.insert(checksum);
        offset
    }

    /// Whether a blob with this checksum is already buffered (dedup within
    /// the unsealed pack).
    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.pending.contains(checksum)
    }

    pub fn has_pending(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Whether the buffered size crossed the seal threshold.
    pub fn should_seal(&self) -> bool {
        !self.entries.is_empty() && self.buffer.len() >= self.target_size
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Append the trailer, digest the full byte string, and reset internal
    /// state. Returns `(packfile_checksum, bytes, entries)`; the caller is
    /// responsible for writing the blob and recording the entries.
    pub fn seal(&mut self, hashing: Hashing) -> Result<(Checksum, Vec<u8>, Vec<PackEntry>)> {
        if self.entries.is_empty() {
            return Err(PlakarError::Other("cannot seal an empty packfile".into()));
        }

        let mut bytes = std::mem::take(&mut self.buffer);
        let entries = std::mem::take(&mut self.entries);
        self.pending.clear();

        let index_length = (entries.len() * ENTRY_SIZE) as u32;
        bytes.reserve(index_length as usize + TRAILER_FOOTER_SIZE);
        for entry in &entries {
            bytes.push(entry.blob_type as u8);
            bytes.extend_from_slice(&entry.checksum.0);
            bytes.extend_from_slice(&entry.offset.to_le_bytes());
            bytes.extend_from_slice(&entry.length.to_le_bytes());
        }
        bytes.extend_from_slice(&index_length.to_le_bytes());
        bytes.extend_from_slice(&PACK_VERSION.to_le_bytes());
        bytes.extend_from_slice(PACK_MAGIC);

        let checksum = hashing.digest(&bytes);
        Ok((checksum, bytes, entries))
    }
}

/// Parse a packfile's trailing index from the complete byte string.
pub fn parse_index(data: &[u8]) -> Result<Vec<PackEntry>> {
    if data.len() < TRAILER_FOOTER_SIZE {
        return Err(PlakarError::InvalidFormat("packfile too small".into()));
    }
    let magic_start = data.len() - 4;
    if &data[magic_start..] != PACK_MAGIC {
        return Err(PlakarError::InvalidFormat("bad packfile magic".into()));
    }

    let version_start = magic_start - 4;
    let version = u32::from_le_bytes(data[version_start..magic_start].try_into().unwrap());
    if version != PACK_VERSION {
        return Err(PlakarError::UnsupportedVersion(format!(
            "packfile version {version}"
        )));
    }

    let len_start = version_start - 4;
    let index_length = u32::from_le_bytes(data[len_start..version_start].try_into().unwrap()) as usize;
    if index_length % ENTRY_SIZE != 0 || index_length > len_start {
        return Err(PlakarError::InvalidFormat(
            "bad packfile index length".into(),
        ));
    }

    let index_start = len_start - index_length;
    let blobs_end = index_start as u64;
    let mut entries = Vec::with_capacity(index_length / ENTRY_SIZE);
    let mut pos = index_start;
    while pos < len_start {
        let blob_type = BlobType::from_u8(data[pos])?;
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&data[pos + 1..pos + 33]);
        let offset = u64::from_le_bytes(data[pos + 33..pos + 41].try_into().unwrap());
        let length = u32::from_le_bytes(data[pos + 41..pos + 45].try_into().unwrap());
        if offset + length as u64 > blobs_end {
            return Err(PlakarError::InvalidFormat(
                "packfile entry extends past blob area".into(),
            ));
        }
        entries.push(PackEntry {
            blob_type,
            checksum: Checksum(checksum),
            offset,
            length,
        });
        pos += ENTRY_SIZE;
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksum(byte: u8) -> Checksum {
        Checksum([byte; 32])
    }

    #[test]
    fn seal_and_parse_roundtrip() {
        let mut writer = PackWriter::new(DEFAULT_PACK_TARGET);
        writer.add_blob(BlobType::Chunk, checksum(1), b"first chunk");
        writer.add_blob(BlobType::Chunk, checksum(2), b"second");
        writer.add_blob(BlobType::Object, checksum(3), b"object record");

        let (pack_id, bytes, entries) = writer.seal(Hashing::Sha256).unwrap();
        assert_eq!(pack_id, Hashing::Sha256.digest(&bytes));
        assert_eq!(entries.len(), 3);

        let parsed = parse_index(&bytes).unwrap();
        assert_eq!(parsed, entries);

        // Blob slices resolve through the parsed entries.
        let e = &parsed[1];
        let slice = &bytes[e.offset as usize..(e.offset + e.length as u64) as usize];
        assert_eq!(slice, b"second");
    }

    #[test]
    fn blobs_start_at_offset_zero() {
        let mut writer = PackWriter::new(DEFAULT_PACK_TARGET);
        let off = writer.add_blob(BlobType::Chunk, checksum(1), b"abc");
        assert_eq!(off, 0);
        let off = writer.add_blob(BlobType::Chunk, checksum(2), b"de");
        assert_eq!(off, 3);
    }

    #[test]
    fn should_seal_on_target_size() {
        let mut writer = PackWriter::new(100);
        assert!(!writer.should_seal());
        writer.add_blob(BlobType::Chunk, checksum(1), &[0u8; 120]);
        assert!(writer.should_seal());
    }

    #[test]
    fn seal_resets_state() {
        let mut writer = PackWriter::new(DEFAULT_PACK_TARGET);
        writer.add_blob(BlobType::Chunk, checksum(1), b"x");
        assert!(writer.contains(&checksum(1)));
        writer.seal(Hashing::Sha256).unwrap();
        assert!(!writer.has_pending());
        assert!(!writer.contains(&checksum(1)));
    }

    #[test]
    fn seal_empty_fails() {
        let mut writer = PackWriter::new(DEFAULT_PACK_TARGET);
        assert!(writer.seal(Hashing::Sha256).is_err());
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut writer = PackWriter::new(DEFAULT_PACK_TARGET);
        writer.add_blob(BlobType::Chunk, checksum(1), b"x");
        let (_, mut bytes, _) = writer.seal(Hashing::Sha256).unwrap();
        let n = bytes.len();
        bytes[n - 1] = b'X';
        assert!(matches!(
            parse_index(&bytes),
            Err(PlakarError::InvalidFormat(_))
        ));
    }

    #[test]
    fn parse_rejects_unknown_version() {
        let mut writer = PackWriter::new(DEFAULT_PACK_TARGET);
        writer.add_blob(BlobType::Chunk, checksum(1), b"x");
        let (_, mut bytes, _) = writer.seal(Hashing::Sha256).unwrap();
        let n = bytes.len();
        bytes[n - 8..n - 4].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            parse_index(&bytes),
            Err(PlakarError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn parse_rejects_truncated_input() {
        assert!(parse_index(b"PLKR").is_err());
        assert!(parse_index(b"").is_err());
    }

    #[test]
    fn parse_rejects_oversized_index_length() {
        let mut writer = PackWriter::new(DEFAULT_PACK_TARGET);
        writer.add_blob(BlobType::Chunk, checksum(1), b"x");
        let (_, mut bytes, _) = writer.seal(Hashing::Sha256).unwrap();
        let n = bytes.len();
        bytes[n - 12..n - 8].copy_from_slice(&(ENTRY_SIZE as u32 * 1000).to_le_bytes());
        assert!(parse_index(&bytes).is_err());
    }
}
