use fastcdc::v2020::FastCDC;
use serde::{Deserialize, Serialize};

/// Content-defined chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub min_size: u32,
    pub avg_size: u32,
    pub max_size: u32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_size: 512 * 1024,
            avg_size: 1024 * 1024,
            max_size: 4 * 1024 * 1024,
        }
    }
}

/// Chunk a byte slice using FastCDC content-defined chunking.
/// Returns `(offset, length)` pairs covering the input in order.
/// Identical bytes always produce identical boundaries.
pub fn chunk_data(data: &[u8], config: &ChunkerConfig) -> Vec<(usize, usize)> {
    let chunker = FastCDC::new(data, config.min_size, config.avg_size, config.max_size);
    chunker.map(|chunk| (chunk.offset, chunk.length)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_file_yields_single_chunk() {
        let data = vec![0x41u8; 1024];
        let chunks = chunk_data(&data, &ChunkerConfig::default());
        assert_eq!(chunks, vec![(0, 1024)]);
    }

    #[test]
    fn chunks_cover_input_exactly() {
        let data: Vec<u8> = (0..8 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
        let chunks = chunk_data(&data, &ChunkerConfig::default());
        let mut expected_offset = 0;
        for (offset, length) in &chunks {
            assert_eq!(*offset, expected_offset);
            expected_offset += length;
        }
        assert_eq!(expected_offset, data.len());
    }

    #[test]
    fn boundaries_are_deterministic() {
        let data: Vec<u8> = (0..6 * 1024 * 1024u32).map(|i| (i % 193) as u8).collect();
        let cfg = ChunkerConfig::default();
        assert_eq!(chunk_data(&data, &cfg), chunk_data(&data, &cfg));
    }

    #[test]
    fn max_size_is_respected() {
        let data = vec![0u8; 12 * 1024 * 1024];
        let cfg = ChunkerConfig::default();
        for (_, length) in chunk_data(&data, &cfg) {
            assert!(length <= cfg.max_size as usize);
        }
    }
}
