use std::io::{Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{PlakarError, Result};

/// Maximum decompressed output size. Snapshot index and filesystem blobs can
/// grow large; the ceiling only guards against decompression bombs.
const MAX_INFLATE_SIZE: u64 = 256 * 1024 * 1024;

/// Compress a byte slice with raw deflate.
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a raw deflate stream, bounded by `MAX_INFLATE_SIZE`.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .by_ref()
        .take(MAX_INFLATE_SIZE + 1)
        .read_to_end(&mut out)
        .map_err(|e| PlakarError::Decompression(format!("deflate: {e}")))?;
    if out.len() as u64 > MAX_INFLATE_SIZE {
        return Err(PlakarError::Decompression(format!(
            "decompressed size exceeds limit of {MAX_INFLATE_SIZE} bytes"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_inflate_roundtrip() {
        let original = b"hello world, this is a test of deflate compression".repeat(16);
        let compressed = deflate(&original).unwrap();
        assert!(compressed.len() < original.len());
        assert_eq!(inflate(&compressed).unwrap(), original);
    }

    #[test]
    fn inflate_rejects_garbage() {
        assert!(inflate(&[0xFF, 0xFE, 0xFD, 0x00, 0x01]).is_err());
    }

    #[test]
    fn empty_input_roundtrip() {
        let compressed = deflate(b"").unwrap();
        assert!(inflate(&compressed).unwrap().is_empty());
    }
}
