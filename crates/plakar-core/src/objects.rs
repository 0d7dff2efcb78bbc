use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-byte content digest. Used for chunks, objects, and packfiles alike.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    /// Hex-encode the full checksum for use as a storage id.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First byte as a two-char hex string, used for shard directories.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Parse a checksum from a 64-character hex string.
    pub fn from_hex(hex_str: &str) -> crate::error::Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| crate::error::PlakarError::InvalidFormat(format!("invalid hex: {e}")))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            crate::error::PlakarError::InvalidFormat("checksum must be 32 bytes".into())
        })?;
        Ok(Checksum(arr))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A content-defined byte range of a source file; the unit of deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub checksum: Checksum,
    pub start: u64,
    pub length: u64,
}

/// The content of one file: an ordered chunk sequence plus a content type.
/// `checksum` is the digest of the concatenated chunk bytes in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Object {
    pub checksum: Checksum,
    pub chunks: Vec<Checksum>,
    pub content_type: String,
}
