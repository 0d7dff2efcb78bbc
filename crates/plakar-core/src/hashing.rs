use blake2::digest::consts::U32;
use blake2::Blake2b;
use sha2::{Digest, Sha256};

use crate::error::{PlakarError, Result};
use crate::objects::Checksum;

type Blake2b256 = Blake2b<U32>;

/// Digest algorithm selected by the repository configuration's `hashing` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hashing {
    Sha256,
    Blake2b256,
}

impl Hashing {
    /// Parse from a config string like "sha256".
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "sha256" => Ok(Hashing::Sha256),
            "blake2b256" => Ok(Hashing::Blake2b256),
            other => Err(PlakarError::Config(format!(
                "unknown hashing algorithm: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hashing::Sha256 => "sha256",
            Hashing::Blake2b256 => "blake2b256",
        }
    }

    /// One-shot digest of a byte slice.
    pub fn digest(&self, data: &[u8]) -> Checksum {
        let mut h = self.hasher();
        h.update(data);
        h.finalize()
    }

    /// Incremental hasher for streaming input (object digests).
    pub fn hasher(&self) -> Hasher {
        match self {
            Hashing::Sha256 => Hasher(HasherInner::Sha256(Sha256::new())),
            Hashing::Blake2b256 => Hasher(HasherInner::Blake2b256(Blake2b256::new())),
        }
    }
}

impl Default for Hashing {
    fn default() -> Self {
        Hashing::Sha256
    }
}

pub struct Hasher(HasherInner);

enum HasherInner {
    Sha256(Sha256),
    Blake2b256(Blake2b256),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.0 {
            HasherInner::Sha256(h) => h.update(data),
            HasherInner::Blake2b256(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Checksum {
        let mut out = [0u8; 32];
        match self.0 {
            HasherInner::Sha256(h) => out.copy_from_slice(&h.finalize()),
            HasherInner::Blake2b256(h) => out.copy_from_slice(&h.finalize()),
        }
        Checksum(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string.
        let empty = Hashing::Sha256.digest(b"");
        assert_eq!(
            empty.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        for algo in [Hashing::Sha256, Hashing::Blake2b256] {
            let mut h = algo.hasher();
            h.update(b"hello ");
            h.update(b"world");
            assert_eq!(h.finalize(), algo.digest(b"hello world"));
        }
    }

    #[test]
    fn algorithms_differ() {
        assert_ne!(
            Hashing::Sha256.digest(b"same input"),
            Hashing::Blake2b256.digest(b"same input")
        );
    }

    #[test]
    fn from_name_rejects_unknown() {
        assert!(Hashing::from_name("md5").is_err());
        assert_eq!(Hashing::from_name("sha256").unwrap(), Hashing::Sha256);
    }
}
