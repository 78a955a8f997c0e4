use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::storage::ObjectId;
use crate::utils::limits::MAX_CHUNK_SIZE;

/// Fields forwarded verbatim to the engine's upload stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadOptions {
    /// Overrides the bucket's chunk size for this object
    pub chunk_size_bytes: Option<u32>,
    pub content_type: Option<String>,
    pub aliases: Vec<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl UploadOptions {
    /// Chunk size for an upload, falling back to the bucket default.
    pub fn resolve_chunk_size(&self, bucket_default: u32) -> Result<u32> {
        let size = self.chunk_size_bytes.unwrap_or(bucket_default);
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(StoreError::InvalidArgument(format!(
                "chunk size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, size
            )));
        }
        Ok(size)
    }
}

/// Options for `ObjectStore::write`. `filename` is required at call time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub filename: Option<String>,
    /// Store under this id instead of letting the engine assign one
    pub id: Option<ObjectId>,
    pub upload: UploadOptions,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(filename: impl Into<String>) -> Self {
        Self::new().filename(filename)
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn id(mut self, id: ObjectId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn chunk_size_bytes(mut self, size: u32) -> Self {
        self.upload.chunk_size_bytes = Some(size);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.upload.content_type = Some(content_type.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.upload.aliases.push(alias.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.upload
            .metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}
