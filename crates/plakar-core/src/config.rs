use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::encryption::WrappedKey;
use crate::error::{PlakarError, Result};

/// CONFIG document version understood by this build.
pub const CONFIG_VERSION: &str = "1.0.0";

pub const COMPRESSION_DEFLATE: &str = "deflate";
pub const ENCRYPTION_AES256GCM: &str = "aes-256-gcm";

/// Repository configuration, persisted unencrypted as JSON at `CONFIG`.
/// Empty `compression` / `encryption` strings disable the corresponding step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub version: String,
    pub repository_id: Uuid,
    pub hashing: String,
    pub compression: String,
    pub encryption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<WrappedKey>,
}

impl RepositoryConfig {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| PlakarError::Config(format!("serialize CONFIG: {e}")))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: RepositoryConfig = serde_json::from_slice(data)
            .map_err(|e| PlakarError::Config(format!("parse CONFIG: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject version skew and unknown algorithm names at startup.
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(PlakarError::UnsupportedVersion(self.version.clone()));
        }
        crate::hashing::Hashing::from_name(&self.hashing)?;
        match self.compression.as_str() {
            "" | COMPRESSION_DEFLATE => {}
            other => {
                return Err(PlakarError::Config(format!(
                    "unknown compression algorithm: {other}"
                )))
            }
        }
        match self.encryption.as_str() {
            "" => {}
            ENCRYPTION_AES256GCM => {
                if self.encryption_key.is_none() {
                    return Err(PlakarError::Config(
                        "encrypted repository is missing its encryption_key".into(),
                    ));
                }
            }
            other => {
                return Err(PlakarError::Config(format!(
                    "unknown encryption algorithm: {other}"
                )))
            }
        }
        Ok(())
    }
}

/// Options for `repository create`.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub hashing: String,
    pub compression: bool,
    /// Passphrase enabling AES-256-GCM encryption; `None` for plaintext.
    pub passphrase: Option<String>,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            hashing: "sha256".into(),
            compression: true,
            passphrase: None,
        }
    }
}
