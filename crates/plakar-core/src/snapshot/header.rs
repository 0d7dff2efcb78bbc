use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::Result;
use crate::objects::Checksum;

/// The snapshot header: identity, provenance, file histograms, and the
/// integrity anchors for the other artifacts. Written last so its presence
/// proves that index, filesystem, metadata, and signature are durable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub index_id: Uuid,
    pub creation_time: DateTime<Utc>,

    pub hostname: String,
    pub username: String,
    pub operating_system: String,
    pub machine_id: String,
    pub command_line: String,
    pub tags: Vec<String>,
    pub scanned_directories: Vec<String>,

    pub files_count: u64,
    pub file_kind: BTreeMap<String, u64>,
    pub file_type: BTreeMap<String, u64>,
    pub file_extension: BTreeMap<String, u64>,

    pub index_checksum: Checksum,
    pub index_size: u64,
    pub index_stored_size: u64,
    pub filesystem_checksum: Checksum,
    pub filesystem_size: u64,
    pub filesystem_stored_size: u64,
    pub metadata_checksum: Checksum,
    pub metadata_size: u64,
    pub metadata_stored_size: u64,

    /// Raw Ed25519 verifying key; empty when the snapshot is unsigned.
    #[serde(default)]
    pub public_key: Vec<u8>,
}

impl Header {
    pub fn new(index_id: Uuid, ctx: &AppContext) -> Self {
        Self {
            index_id,
            creation_time: Utc::now(),
            hostname: ctx.hostname.clone(),
            username: ctx.username.clone(),
            operating_system: ctx.operating_system.clone(),
            machine_id: ctx.machine_id.clone(),
            command_line: ctx.command_line.clone(),
            tags: Vec::new(),
            scanned_directories: Vec::new(),
            files_count: 0,
            file_kind: BTreeMap::new(),
            file_type: BTreeMap::new(),
            file_extension: BTreeMap::new(),
            index_checksum: Checksum([0; 32]),
            index_size: 0,
            index_stored_size: 0,
            filesystem_checksum: Checksum([0; 32]),
            filesystem_size: 0,
            filesystem_stored_size: 0,
            metadata_checksum: Checksum([0; 32]),
            metadata_size: 0,
            metadata_stored_size: 0,
            public_key: Vec::new(),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.public_key.is_empty()
    }

    /// Short form of the snapshot id for log lines.
    pub fn short_id(&self) -> String {
        self.index_id.to_string()[..8].to_string()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}
