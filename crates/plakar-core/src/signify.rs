//! Snapshot signing with Ed25519 keypairs.
//!
//! The keyfile is a JSON document `{ "PublicKey": ..., "PrivateKey": ... }`
//! holding base64-encoded key material; the private key is wrapped with a
//! user passphrase and only usable after `unlock()`.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::{Deserialize, Serialize};

use crate::encryption::{Secret, WrappedKey};
use crate::error::{PlakarError, Result};
use crate::objects::Checksum;

pub const SIGNATURE_SIZE: usize = 64;
pub const PUBLIC_KEY_SIZE: usize = 32;

/// On-disk keyfile format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeypairFile {
    #[serde(rename = "PublicKey")]
    pub public_key: String,
    #[serde(rename = "PrivateKey")]
    pub private_key: String,
}

/// An unlocked signing key.
pub struct SecretKey(ed25519_dalek::SigningKey);

/// A verifying key, embedded raw in signed snapshot headers.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(ed25519_dalek::VerifyingKey);

/// Generate a new keypair, wrapping the private seed with `passphrase`.
pub fn generate(passphrase: &str) -> Result<KeypairFile> {
    let signing = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
    let seed = Secret(signing.to_bytes());
    let wrapped = seed.wrap(passphrase)?;
    let wrapped_bytes = rmp_serde::to_vec(&wrapped)?;

    Ok(KeypairFile {
        public_key: BASE64_STANDARD.encode(signing.verifying_key().to_bytes()),
        private_key: BASE64_STANDARD.encode(wrapped_bytes),
    })
}

impl KeypairFile {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        serde_json::from_slice(&data)
            .map_err(|e| PlakarError::InvalidFormat(format!("keyfile: {e}")))
    }

    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| PlakarError::InvalidFormat(format!("keyfile: {e}")))?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Decrypt the private key with the passphrase.
    pub fn unlock(&self, passphrase: &str) -> Result<SecretKey> {
        let wrapped_bytes = BASE64_STANDARD
            .decode(&self.private_key)
            .map_err(|e| PlakarError::InvalidFormat(format!("keyfile private key: {e}")))?;
        let wrapped: WrappedKey = rmp_serde::from_slice(&wrapped_bytes)?;
        let seed = Secret::unwrap_with(&wrapped, passphrase)?;
        Ok(SecretKey(ed25519_dalek::SigningKey::from_bytes(&seed.0)))
    }

    pub fn public(&self) -> Result<PublicKey> {
        let bytes = BASE64_STANDARD
            .decode(&self.public_key)
            .map_err(|e| PlakarError::InvalidFormat(format!("keyfile public key: {e}")))?;
        PublicKey::from_bytes(&bytes)
    }
}

impl SecretKey {
    /// Sign a header digest. Returns a detached 64-byte signature.
    pub fn sign(&self, digest: &Checksum) -> Vec<u8> {
        use ed25519_dalek::Signer;
        self.0.sign(&digest.0).to_bytes().to_vec()
    }

    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| PlakarError::InvalidFormat("public key must be 32 bytes".into()))?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&arr)
            .map_err(|_| PlakarError::InvalidFormat("invalid public key".into()))?;
        Ok(PublicKey(key))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }

    /// Verify a detached signature over a header digest.
    pub fn verify(&self, digest: &Checksum, signature: &[u8]) -> Result<()> {
        use ed25519_dalek::Verifier;
        let arr: [u8; SIGNATURE_SIZE] = signature
            .try_into()
            .map_err(|_| PlakarError::SignatureMismatch)?;
        let sig = ed25519_dalek::Signature::from_bytes(&arr);
        self.0
            .verify(&digest.0, &sig)
            .map_err(|_| PlakarError::SignatureMismatch)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey(<redacted>)")
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0.to_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::Hashing;

    #[test]
    fn sign_and_verify() {
        let keypair = generate("p").unwrap();
        let sk = keypair.unlock("p").unwrap();
        let digest = Hashing::Sha256.digest(b"header bytes");
        let sig = sk.sign(&digest);
        keypair.public().unwrap().verify(&digest, &sig).unwrap();
    }

    #[test]
    fn verify_fails_on_wrong_digest() {
        let keypair = generate("p").unwrap();
        let sk = keypair.unlock("p").unwrap();
        let sig = sk.sign(&Hashing::Sha256.digest(b"signed"));
        let other = Hashing::Sha256.digest(b"not signed");
        assert!(matches!(
            keypair.public().unwrap().verify(&other, &sig),
            Err(PlakarError::SignatureMismatch)
        ));
    }

    #[test]
    fn unlock_rejects_wrong_passphrase() {
        let keypair = generate("correct").unwrap();
        assert!(keypair.unlock("wrong").is_err());
    }

    #[test]
    fn keyfile_json_roundtrip() {
        let keypair = generate("p").unwrap();
        let json = serde_json::to_string(&keypair).unwrap();
        assert!(json.contains("PublicKey"));
        assert!(json.contains("PrivateKey"));
        let back: KeypairFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.public_key, keypair.public_key);
    }

    #[test]
    fn unlocked_public_matches_keyfile() {
        let keypair = generate("p").unwrap();
        let sk = keypair.unlock("p").unwrap();
        assert_eq!(sk.public().to_bytes(), keypair.public().unwrap().to_bytes());
    }
}
