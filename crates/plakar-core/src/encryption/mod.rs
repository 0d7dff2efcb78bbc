use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{PlakarError, Result};

pub const NONCE_SIZE: usize = 12;

/// The repository's symmetric secret, unwrapped from the CONFIG with the
/// user's passphrase. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret(pub [u8; 32]);

/// Encrypt with AES-256-GCM. Output is `[nonce][ciphertext + tag]`.
pub fn encrypt(key: &Secret, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| PlakarError::KeyDerivation(format!("cipher init: {e}")))?;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| PlakarError::DecryptionFailed)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data produced by `encrypt`. Fails on any tampering.
pub fn decrypt(key: &Secret, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_SIZE {
        return Err(PlakarError::DecryptionFailed);
    }
    let cipher = Aes256Gcm::new_from_slice(&key.0).map_err(|_| PlakarError::DecryptionFailed)?;
    let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
    cipher
        .decrypt(nonce, &data[NONCE_SIZE..])
        .map_err(|_| PlakarError::DecryptionFailed)
}

/// KDF parameters stored alongside the wrapped key in the CONFIG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: String,
    pub time_cost: u32,
    pub memory_cost: u32,
    pub parallelism: u32,
    #[serde(with = "hex_bytes")]
    pub salt: Vec<u8>,
}

/// Passphrase-wrapped repository secret, embedded in the CONFIG document.
/// Successful unwrap doubles as the passphrase verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKey {
    pub kdf: KdfParams,
    #[serde(with = "hex_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
}

// KDF parameter bounds to reject maliciously crafted key blobs.
const MAX_TIME_COST: u32 = 10;
const MAX_PARALLELISM: u32 = 16;
const MAX_MEMORY_KIB: u32 = 524_288; // 512 MiB
const MIN_SALT_LEN: usize = 16;
const MAX_SALT_LEN: usize = 64;

fn validate_kdf_params(kdf: &KdfParams) -> Result<()> {
    if kdf.algorithm != "argon2id" {
        return Err(PlakarError::DecryptionFailed);
    }
    if kdf.time_cost == 0 || kdf.time_cost > MAX_TIME_COST {
        return Err(PlakarError::DecryptionFailed);
    }
    if kdf.parallelism == 0 || kdf.parallelism > MAX_PARALLELISM {
        return Err(PlakarError::DecryptionFailed);
    }
    if kdf.memory_cost == 0 || kdf.memory_cost > MAX_MEMORY_KIB {
        return Err(PlakarError::DecryptionFailed);
    }
    if kdf.salt.len() < MIN_SALT_LEN || kdf.salt.len() > MAX_SALT_LEN {
        return Err(PlakarError::DecryptionFailed);
    }
    Ok(())
}

impl Secret {
    /// Generate a fresh random secret from OS entropy.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Secret(bytes)
    }

    /// Wrap the secret with a passphrase using argon2id + AES-256-GCM.
    pub fn wrap(&self, passphrase: &str) -> Result<WrappedKey> {
        let mut salt = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let kdf = KdfParams {
            algorithm: "argon2id".to_string(),
            time_cost: 3,
            memory_cost: 65536, // 64 MiB
            parallelism: 4,
            salt,
        };
        let wrapping_key = derive_key(passphrase, &kdf)?;

        let cipher = Aes256Gcm::new_from_slice(wrapping_key.as_ref())
            .map_err(|e| PlakarError::KeyDerivation(format!("cipher init: {e}")))?;
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, self.0.as_ref())
            .map_err(|e| PlakarError::KeyDerivation(format!("wrap: {e}")))?;

        Ok(WrappedKey {
            kdf,
            nonce: nonce_bytes.to_vec(),
            ciphertext,
        })
    }

    /// Unwrap a secret from its CONFIG form. `DecryptionFailed` means a wrong
    /// passphrase or a tampered key blob.
    pub fn unwrap_with(wrapped: &WrappedKey, passphrase: &str) -> Result<Self> {
        if wrapped.nonce.len() != NONCE_SIZE {
            return Err(PlakarError::DecryptionFailed);
        }
        validate_kdf_params(&wrapped.kdf)?;

        let wrapping_key = derive_key(passphrase, &wrapped.kdf)?;
        let cipher =
            Aes256Gcm::new_from_slice(wrapping_key.as_ref()).map_err(|_| PlakarError::DecryptionFailed)?;
        let nonce = Nonce::from_slice(&wrapped.nonce);
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(nonce, wrapped.ciphertext.as_ref())
                .map_err(|_| PlakarError::DecryptionFailed)?,
        );

        let bytes: [u8; 32] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| PlakarError::DecryptionFailed)?;
        Ok(Secret(bytes))
    }
}

/// Derive a 32-byte key from a passphrase using argon2id.
pub fn derive_key(passphrase: &str, kdf: &KdfParams) -> Result<Zeroizing<[u8; 32]>> {
    let params = argon2::Params::new(kdf.memory_cost, kdf.time_cost, kdf.parallelism, Some(32))
        .map_err(|e| PlakarError::KeyDerivation(format!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), &kdf.salt, output.as_mut())
        .map_err(|e| PlakarError::KeyDerivation(format!("argon2 hash: {e}")))?;
    Ok(output)
}

/// Serde helper: byte vectors as lowercase hex strings, keeping the JSON
/// CONFIG document readable.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
