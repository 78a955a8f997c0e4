use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};

use crate::error::Result;
use crate::storage::{Filter, FindOptions, ObjectId, StoredObjectMetadata, UploadOptions};
use crate::stream::ByteStream;

/// Sink returned by an engine for one object upload.
///
/// Nothing becomes visible to readers until [`UploadStream::finish`] returns:
/// either the full object and its metadata record exist, or nothing does.
#[async_trait]
pub trait UploadStream: Send {
    /// Identifier the object will be stored under
    fn id(&self) -> ObjectId;

    async fn write(&mut self, data: Bytes) -> Result<()>;

    /// Flush the remaining chunk and persist the metadata record.
    async fn finish(self: Box<Self>) -> Result<ObjectId>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> Result<()>;
}

/// Chunked object storage engine.
#[async_trait]
pub trait Bucket: Send + Sync {
    fn bucket_name(&self) -> &str;

    fn chunk_size_bytes(&self) -> u32;

    /// Whether the handle is live and ready for operations
    fn is_connected(&self) -> bool;

    async fn open_upload_stream(
        &self,
        filename: &str,
        options: &UploadOptions,
    ) -> Result<Box<dyn UploadStream>> {
        self.open_upload_stream_with_id(ObjectId::new(), filename, options)
            .await
    }

    /// Upload under a caller-chosen id. Fails with `Conflict` if it is taken.
    async fn open_upload_stream_with_id(
        &self,
        id: ObjectId,
        filename: &str,
        options: &UploadOptions,
    ) -> Result<Box<dyn UploadStream>>;

    async fn open_download_stream(&self, id: ObjectId) -> Result<ByteStream>;

    /// Download the most recently uploaded object named `filename`.
    async fn open_download_stream_by_name(&self, filename: &str) -> Result<ByteStream>;

    /// `Ok(None)` means the metadata collection itself does not exist.
    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Option<Cursor>>;

    /// Remove the metadata record and every chunk of `id`.
    async fn delete(&self, id: ObjectId) -> Result<()>;
}

/// Cursor over metadata records
pub struct Cursor {
    inner: BoxStream<'static, Result<StoredObjectMetadata>>,
}

impl Cursor {
    pub fn new<S>(records: S) -> Self
    where
        S: Stream<Item = Result<StoredObjectMetadata>> + Send + 'static,
    {
        Self {
            inner: records.boxed(),
        }
    }

    pub fn from_records(records: Vec<StoredObjectMetadata>) -> Self {
        Self::new(stream::iter(records.into_iter().map(Ok)))
    }

    pub async fn try_next(&mut self) -> Result<Option<StoredObjectMetadata>> {
        self.inner.next().await.transpose()
    }

    pub async fn to_vec(self) -> Result<Vec<StoredObjectMetadata>> {
        self.inner.try_collect().await
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cursor")
    }
}
