use std::io::Read;

use crate::error::Result;
use crate::objects::{Checksum, Object};
use crate::repository::Repository;

/// Single-pass reader over one object's chunk sequence.
///
/// Chunks are fetched lazily from their packfiles, decoded, and verified
/// against their checksums before any byte is emitted.
pub struct Reader<'r> {
    repo: &'r Repository,
    chunks: Vec<Checksum>,
    next_chunk: usize,
    buffer: Vec<u8>,
    buffer_pos: usize,
}

impl<'r> Reader<'r> {
    pub fn new(repo: &'r Repository, object: &Object) -> Self {
        Self {
            repo,
            chunks: object.chunks.clone(),
            next_chunk: 0,
            buffer: Vec::new(),
            buffer_pos: 0,
        }
    }

    fn fill_buffer(&mut self) -> Result<bool> {
        if self.next_chunk >= self.chunks.len() {
            return Ok(false);
        }
        let checksum = self.chunks[self.next_chunk];
        self.next_chunk += 1;
        self.buffer = self.repo.get_chunk(&checksum)?;
        self.buffer_pos = 0;
        Ok(true)
    }
}

impl Read for Reader<'_> {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        while self.buffer_pos >= self.buffer.len() {
            match self.fill_buffer() {
                Ok(true) => {}
                Ok(false) => return Ok(0),
                Err(e) => return Err(std::io::Error::other(e)),
            }
        }
        let available = &self.buffer[self.buffer_pos..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.buffer_pos += n;
        Ok(n)
    }
}
