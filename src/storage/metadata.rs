use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::io;

use crate::storage::{ObjectId, UploadOptions};

/// Metadata record describing one stored object, without its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObjectMetadata {
    pub id: ObjectId,
    pub filename: String,
    pub length: u64,
    pub chunk_size: u32,
    pub upload_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Hex SHA-256 of the full content
    pub sha256: String,
}

impl StoredObjectMetadata {
    pub fn new(
        id: ObjectId,
        filename: String,
        length: u64,
        chunk_size: u32,
        sha256: String,
        options: &UploadOptions,
    ) -> Self {
        Self {
            id,
            filename,
            length,
            chunk_size,
            upload_date: Utc::now(),
            content_type: options.content_type.clone(),
            aliases: options.aliases.clone(),
            metadata: options.metadata.clone(),
            sha256,
        }
    }

    /// Number of chunk records backing this object
    pub fn chunk_count(&self) -> u64 {
        let size = u64::from(self.chunk_size.max(1));
        self.length.div_ceil(size)
    }

    /// Expected byte length of chunk `n`; the last chunk may be short
    pub fn chunk_len(&self, n: u64) -> usize {
        let size = u64::from(self.chunk_size.max(1));
        let start = n.saturating_mul(size);
        self.length.saturating_sub(start).min(size) as usize
    }

    /// Compare the digest of the bytes fed to `hasher` with the recorded one.
    pub(crate) fn check_digest(&self, hasher: Sha256) -> io::Result<()> {
        let actual = hex::encode(hasher.finalize());
        if actual == self.sha256 {
            return Ok(());
        }
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "content digest mismatch for {}: expected {}, got {}",
                self.id, self.sha256, actual
            ),
        ))
    }

    /// Ordering key for "newest revision" and sorted listings
    pub(crate) fn revision_key(&self) -> (DateTime<Utc>, ObjectId) {
        (self.upload_date, self.id)
    }
}
