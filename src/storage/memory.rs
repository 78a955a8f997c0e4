//! In-process chunked bucket.
//!
//! Holds one metadata record per object and chunk records keyed by
//! `(files_id, n)`, the same split a document-database bucket keeps in its
//! files and chunks collections. Uploads stage their chunks privately and
//! commit chunks plus metadata under a single write lock.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::storage::{
    Bucket, Cursor, Filter, FindOptions, ObjectId, StoredObjectMetadata, UploadOptions,
    UploadStream,
};
use crate::stream::ByteStream;
use crate::utils::buffer::ChunkBuffer;
use crate::utils::limits::{DEFAULT_BUCKET_NAME, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Default)]
struct Collections {
    files: HashMap<ObjectId, StoredObjectMetadata>,
    chunks: BTreeMap<(ObjectId, u32), Bytes>,
    /// Set by `drop_collection`, cleared by the next committed upload
    dropped: bool,
}

pub struct MemoryBucket {
    name: String,
    chunk_size: u32,
    connected: Arc<AtomicBool>,
    state: Arc<RwLock<Collections>>,
}

impl MemoryBucket {
    pub fn new(name: impl Into<String>, chunk_size: u32) -> Self {
        Self {
            name: name.into(),
            chunk_size,
            connected: Arc::new(AtomicBool::new(true)),
            state: Arc::new(RwLock::new(Collections::default())),
        }
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Remove every object and mark the files collection as absent.
    pub fn drop_collection(&self) {
        let mut state = self.write_state();
        state.files.clear();
        state.chunks.clear();
        state.dropped = true;
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.read_state().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of chunk records stored for `id`
    pub fn chunk_count(&self, id: ObjectId) -> usize {
        self.read_state()
            .chunks
            .range((id, 0)..=(id, u32::MAX))
            .count()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Collections> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Collections> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(not_connected(&self.name))
        }
    }

    fn download(&self, meta: &StoredObjectMetadata) -> ByteStream {
        let state = self.read_state();
        let mut items = Vec::new();
        let mut hasher = Sha256::new();

        for n in 0..meta.chunk_count() {
            let expected = meta.chunk_len(n);
            let item = match state.chunks.get(&(meta.id, n as u32)) {
                Some(chunk) if chunk.len() == expected => {
                    hasher.update(chunk);
                    Ok(chunk.clone())
                }
                Some(chunk) => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "chunk {} of {} has {} bytes, expected {}",
                        n, meta.id, chunk.len(), expected
                    ),
                )),
                None => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("chunk {} of {} is missing", n, meta.id),
                )),
            };
            let failed = item.is_err();
            items.push(item);
            if failed {
                break;
            }
        }

        if items.last().is_some_and(|item| item.is_ok()) {
            if let Err(e) = meta.check_digest(hasher) {
                items.pop();
                items.push(Err(e));
            }
        }

        ByteStream::new(stream::iter(items))
    }
}

impl Default for MemoryBucket {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_NAME, DEFAULT_CHUNK_SIZE)
    }
}

fn not_connected(name: &str) -> StoreError {
    StoreError::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        format!("bucket '{}' is not connected", name),
    ))
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn bucket_name(&self) -> &str {
        &self.name
    }

    fn chunk_size_bytes(&self) -> u32 {
        self.chunk_size
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn open_upload_stream_with_id(
        &self,
        id: ObjectId,
        filename: &str,
        options: &UploadOptions,
    ) -> Result<Box<dyn UploadStream>> {
        self.ensure_connected()?;
        let chunk_size = options.resolve_chunk_size(self.chunk_size)?;

        if self.read_state().files.contains_key(&id) {
            return Err(StoreError::Conflict(format!("object id {} already in use", id)));
        }

        debug!("Opened memory upload {} for '{}'", id, filename);
        Ok(Box::new(MemoryUpload {
            id,
            filename: filename.to_string(),
            options: options.clone(),
            chunk_size,
            buffer: ChunkBuffer::new(chunk_size as usize),
            staged: Vec::new(),
            hasher: Sha256::new(),
            length: 0,
            connected: Arc::clone(&self.connected),
            bucket: self.name.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn open_download_stream(&self, id: ObjectId) -> Result<ByteStream> {
        self.ensure_connected()?;
        let meta = self
            .read_state()
            .files
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("file not found for id {}", id)))?;
        Ok(self.download(&meta))
    }

    async fn open_download_stream_by_name(&self, filename: &str) -> Result<ByteStream> {
        self.ensure_connected()?;
        let meta = self
            .read_state()
            .files
            .values()
            .filter(|meta| meta.filename == filename)
            .max_by_key(|meta| meta.revision_key())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("file not found: '{}'", filename)))?;
        Ok(self.download(&meta))
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Option<Cursor>> {
        self.ensure_connected()?;
        let state = self.read_state();
        if state.dropped {
            return Ok(None);
        }

        let matched: Vec<_> = state
            .files
            .values()
            .filter(|meta| filter.matches(meta))
            .cloned()
            .collect();
        Ok(Some(Cursor::from_records(options.apply(matched))))
    }

    async fn delete(&self, id: ObjectId) -> Result<()> {
        self.ensure_connected()?;
        let mut state = self.write_state();
        if state.files.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("file not found for id {}", id)));
        }
        state.chunks.retain(|(files_id, _), _| *files_id != id);
        Ok(())
    }
}

struct MemoryUpload {
    id: ObjectId,
    filename: String,
    options: UploadOptions,
    chunk_size: u32,
    buffer: ChunkBuffer,
    staged: Vec<Bytes>,
    hasher: Sha256,
    length: u64,
    connected: Arc<AtomicBool>,
    bucket: String,
    state: Arc<RwLock<Collections>>,
}

#[async_trait]
impl UploadStream for MemoryUpload {
    fn id(&self) -> ObjectId {
        self.id
    }

    async fn write(&mut self, data: Bytes) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(not_connected(&self.bucket));
        }

        self.hasher.update(&data);
        self.length += data.len() as u64;
        self.buffer.extend(&data);
        while let Some(chunk) = self.buffer.next_full() {
            self.staged.push(chunk);
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<ObjectId> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(not_connected(&self.bucket));
        }
        if let Some(rest) = self.buffer.take_rest() {
            self.staged.push(rest);
        }

        let upload = *self;
        let meta = StoredObjectMetadata::new(
            upload.id,
            upload.filename,
            upload.length,
            upload.chunk_size,
            hex::encode(upload.hasher.finalize()),
            &upload.options,
        );

        let mut state = upload.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.files.contains_key(&upload.id) {
            return Err(StoreError::Conflict(format!("object id {} already in use", upload.id)));
        }
        for (n, chunk) in upload.staged.into_iter().enumerate() {
            state.chunks.insert((upload.id, n as u32), chunk);
        }
        state.files.insert(upload.id, meta);
        state.dropped = false;

        Ok(upload.id)
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        debug!("Aborted memory upload {}", self.id);
        Ok(())
    }
}
