//! The object store facade.
//!
//! [`ObjectStore`] validates caller input, normalizes filters, and turns the
//! engine's upload/download streams into a stream-in / buffer-out API. It holds
//! no state besides the injected bucket handle.

use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::storage::{
    Bucket, Filter, FindOptions, ObjectId, StoredObjectMetadata, Target, WriteOptions,
};
use crate::stream::{self, ByteStream};

#[derive(Clone)]
pub struct ObjectStore {
    bucket: Arc<dyn Bucket>,
    max_read_bytes: Option<usize>,
}

impl ObjectStore {
    /// Wrap an already-open bucket. Fails if the handle is not ready.
    pub fn new(bucket: Arc<dyn Bucket>) -> Result<Self> {
        if !bucket.is_connected() {
            return Err(StoreError::Configuration(format!(
                "bucket '{}' is not connected",
                bucket.bucket_name()
            )));
        }
        Ok(Self {
            bucket,
            max_read_bytes: None,
        })
    }

    /// Refuse to buffer reads larger than `limit` bytes.
    pub fn with_max_read_bytes(mut self, limit: usize) -> Self {
        self.max_read_bytes = Some(limit);
        self
    }

    pub fn bucket(&self) -> &Arc<dyn Bucket> {
        &self.bucket
    }

    pub fn bucket_name(&self) -> &str {
        self.bucket.bucket_name()
    }

    pub fn chunk_size_bytes(&self) -> u32 {
        self.bucket.chunk_size_bytes()
    }

    /// All records matching `filter`. An absent files collection is `NotFound`;
    /// zero matches is an empty vec.
    pub async fn find(
        &self,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<StoredObjectMetadata>> {
        debug!("find in '{}': {:?}", self.bucket_name(), filter);
        let cursor = self.bucket.find(filter, options).await?.ok_or_else(|| {
            StoreError::NotFound(format!("collection '{}.files' not found", self.bucket_name()))
        })?;
        cursor.to_vec().await
    }

    pub async fn find_one(
        &self,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Option<StoredObjectMetadata>> {
        let options = FindOptions {
            limit: Some(1),
            ..options.clone()
        };
        let cursor = self.bucket.find(filter, &options).await?;
        let Some(mut cursor) = cursor else {
            return Err(StoreError::NotFound(format!(
                "collection '{}.files' not found",
                self.bucket_name()
            )));
        };
        cursor.try_next().await
    }

    pub async fn find_one_and_read(&self, filter: &Filter) -> Result<Option<Bytes>> {
        let Some(found) = self.find_one(filter, &FindOptions::default()).await? else {
            return Ok(None);
        };
        self.read(&Filter::by_id(found.id)).await.map(Some)
    }

    /// Read a whole object. The filter needs an id or a filename; the id wins.
    pub async fn read(&self, filter: &Filter) -> Result<Bytes> {
        let target = filter.target().ok_or_else(|| {
            StoreError::InvalidArgument("filter must contain an id or a filename".into())
        })?;
        debug!("read {} from '{}'", target, self.bucket_name());

        let download = match &target {
            Target::Id(id) => self.bucket.open_download_stream(*id).await?,
            Target::Filename(name) => self.bucket.open_download_stream_by_name(name).await?,
        };

        let data = match self.max_read_bytes {
            Some(limit) => stream::collect_with_limit(download, limit).await?,
            None => stream::collect(download).await?,
        };
        Ok(data)
    }

    /// Pump `source` into a new object and return its id once it is persisted.
    pub async fn write(&self, mut source: ByteStream, options: &WriteOptions) -> Result<ObjectId> {
        if !source.is_readable() {
            return Err(StoreError::InvalidArgument("stream is not a readable stream".into()));
        }
        let filename = options
            .filename
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StoreError::InvalidArgument("filename is not set".into()))?;

        let mut upload = match options.id {
            Some(id) => {
                self.bucket
                    .open_upload_stream_with_id(id, filename, &options.upload)
                    .await?
            }
            None => self.bucket.open_upload_stream(filename, &options.upload).await?,
        };
        debug!("write '{}' as {} into '{}'", filename, upload.id(), self.bucket_name());

        let mut written = 0u64;
        while let Some(item) = source.next().await {
            let result = match item {
                Ok(chunk) => {
                    written += chunk.len() as u64;
                    upload.write(chunk).await
                }
                Err(e) => Err(StoreError::Io(e)),
            };
            if let Err(err) = result {
                let id = upload.id();
                if let Err(abort_err) = upload.abort().await {
                    warn!("Failed to abort upload {} after write error: {}", id, abort_err);
                }
                return Err(err);
            }
        }

        let id = upload.finish().await?;
        info!("Stored '{}' as {} ({} bytes)", filename, id, written);
        Ok(id)
    }

    /// Store `buffer` as-is, via a single-shot stream.
    pub async fn write_buffer(
        &self,
        buffer: impl Into<Bytes>,
        options: &WriteOptions,
    ) -> Result<ObjectId> {
        self.write(ByteStream::once(buffer), options).await
    }

    /// Delete by id. A filename alone is rejected since names are not unique.
    pub async fn delete(&self, filter: &Filter) -> Result<ObjectId> {
        let id = filter.id.ok_or_else(|| {
            StoreError::InvalidArgument("filter must contain an id to delete".into())
        })?;

        self.bucket.delete(id).await?;
        info!("Deleted {} from '{}'", id, self.bucket_name());
        Ok(id)
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("bucket", &self.bucket_name())
            .field("max_read_bytes", &self.max_read_bytes)
            .finish()
    }
}
