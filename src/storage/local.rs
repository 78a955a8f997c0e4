use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::storage::{
    Bucket, Cursor, Filter, FindOptions, ObjectId, StoredObjectMetadata, UploadOptions,
    UploadStream,
};
use crate::stream::ByteStream;
use crate::utils::buffer::ChunkBuffer;
use crate::utils::crc::{decode_chunk, encode_chunk};

/// Filesystem bucket.
///
/// Layout under `root`:
///   {name}.files/{id}.json          metadata record
///   {name}.files/{id}.lock          held by the one upload writing `id`
///   {name}.chunks/{id}/{n}.chunk    CRC32 header + payload
///   {name}.chunks/.staging/         uploads in progress
pub struct LocalBucket {
    root: PathBuf,
    name: String,
    chunk_size: u32,
}

impl LocalBucket {
    pub async fn open(
        root: impl Into<PathBuf>,
        name: impl Into<String>,
        chunk_size: u32,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StoreError::Configuration("chunk size must be non-zero".into()));
        }
        let bucket = Self {
            root: root.into(),
            name: name.into(),
            chunk_size,
        };

        fs::create_dir_all(bucket.files_dir()).await?;
        fs::create_dir_all(bucket.staging_dir()).await?;
        debug!("Opened local bucket '{}' at {:?}", bucket.name, bucket.root);
        Ok(bucket)
    }

    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::open(
            config.data_directory.clone(),
            config.bucket_name.clone(),
            config.chunk_size_bytes,
        )
        .await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn files_dir(&self) -> PathBuf {
        self.root.join(format!("{}.files", self.name))
    }

    fn chunks_dir(&self) -> PathBuf {
        self.root.join(format!("{}.chunks", self.name))
    }

    fn staging_dir(&self) -> PathBuf {
        self.chunks_dir().join(".staging")
    }

    fn meta_path(&self, id: ObjectId) -> PathBuf {
        self.files_dir().join(format!("{}.json", id))
    }

    fn claim_path(&self, id: ObjectId) -> PathBuf {
        self.files_dir().join(format!("{}.lock", id))
    }

    fn chunk_dir(&self, id: ObjectId) -> PathBuf {
        self.chunks_dir().join(id.to_hex())
    }

    async fn load_meta(&self, id: ObjectId) -> Result<Option<StoredObjectMetadata>> {
        let raw = match fs::read(self.meta_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// All metadata records, or `None` if the files directory is gone.
    async fn load_all(&self) -> Result<Option<Vec<StoredObjectMetadata>>> {
        let mut entries = match fs::read_dir(self.files_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            // Deleted between listing and reading.
            let raw = match fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            records.push(serde_json::from_slice(&raw)?);
        }
        Ok(Some(records))
    }

    fn download(&self, meta: StoredObjectMetadata) -> ByteStream {
        let dir = self.chunk_dir(meta.id);
        ByteStream::new(stream::unfold((0u64, Sha256::new()), move |(n, mut hasher)| {
            let dir = dir.clone();
            let meta = meta.clone();
            async move {
                let count = meta.chunk_count();
                if n >= count {
                    return None;
                }
                let item = read_chunk(&dir, &meta, n).await.and_then(|chunk| {
                    hasher.update(&chunk);
                    if n + 1 == count {
                        meta.check_digest(std::mem::take(&mut hasher))?;
                    }
                    Ok(chunk)
                });
                Some((item, (n + 1, hasher)))
            }
        }))
    }
}

fn id_in_use(id: ObjectId) -> StoreError {
    StoreError::Conflict(format!("object id {} already in use", id))
}

fn chunk_path(dir: &Path, n: u64) -> PathBuf {
    dir.join(format!("{}.chunk", n))
}

async fn read_chunk(dir: &Path, meta: &StoredObjectMetadata, n: u64) -> io::Result<Bytes> {
    let raw = match fs::read(chunk_path(dir, n)).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chunk {} of {} is missing", n, meta.id),
            ));
        }
        Err(e) => return Err(e),
    };

    let payload = decode_chunk(Bytes::from(raw))?;
    let expected = meta.chunk_len(n);
    if payload.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "chunk {} of {} has {} bytes, expected {}",
                n, meta.id, payload.len(), expected
            ),
        ));
    }
    Ok(payload)
}

#[async_trait]
impl Bucket for LocalBucket {
    fn bucket_name(&self) -> &str {
        &self.name
    }

    fn chunk_size_bytes(&self) -> u32 {
        self.chunk_size
    }

    fn is_connected(&self) -> bool {
        self.root.is_dir()
    }

    async fn open_upload_stream_with_id(
        &self,
        id: ObjectId,
        filename: &str,
        options: &UploadOptions,
    ) -> Result<Box<dyn UploadStream>> {
        let chunk_size = options.resolve_chunk_size(self.chunk_size)?;

        fs::create_dir_all(self.files_dir()).await?;
        let claim = self.claim_path(id);
        match fs::OpenOptions::new().write(true).create_new(true).open(&claim).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(id_in_use(id)),
            Err(e) => return Err(e.into()),
        }

        let mut upload = Box::new(LocalUpload {
            id,
            filename: filename.to_string(),
            options: options.clone(),
            chunk_size,
            buffer: ChunkBuffer::new(chunk_size as usize),
            hasher: Sha256::new(),
            length: 0,
            next_chunk: 0,
            staging: self
                .staging_dir()
                .join(format!("{}-{:016x}", id, rand::random::<u64>())),
            chunk_dir: self.chunk_dir(id),
            meta_path: self.meta_path(id),
            claim,
            settled: false,
        });

        // The claim is ours, so a committed record means the id is taken.
        let opened = match fs::try_exists(&upload.meta_path).await {
            Ok(true) => Err(id_in_use(id)),
            Ok(false) => fs::create_dir_all(&upload.staging).await.map_err(StoreError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(err) = opened {
            upload.discard().await;
            return Err(err);
        }

        debug!("Opened local upload {} for '{}'", id, filename);
        Ok(upload)
    }

    async fn open_download_stream(&self, id: ObjectId) -> Result<ByteStream> {
        let meta = self
            .load_meta(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("file not found for id {}", id)))?;
        Ok(self.download(meta))
    }

    async fn open_download_stream_by_name(&self, filename: &str) -> Result<ByteStream> {
        let newest = self
            .load_all()
            .await?
            .unwrap_or_default()
            .into_iter()
            .filter(|meta| meta.filename == filename)
            .max_by_key(|meta| meta.revision_key())
            .ok_or_else(|| StoreError::NotFound(format!("file not found: '{}'", filename)))?;
        Ok(self.download(newest))
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Option<Cursor>> {
        let Some(records) = self.load_all().await? else {
            return Ok(None);
        };
        let matched = records.into_iter().filter(|meta| filter.matches(meta)).collect();
        Ok(Some(Cursor::from_records(options.apply(matched))))
    }

    async fn delete(&self, id: ObjectId) -> Result<()> {
        match fs::remove_file(self.meta_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!("file not found for id {}", id)));
            }
            Err(e) => return Err(e.into()),
        }

        // The record is gone, so the object is deleted even if chunk cleanup fails.
        if let Err(e) = fs::remove_dir_all(self.chunk_dir(id)).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Orphaned chunks left for {}: {}", id, e);
            }
        }
        Ok(())
    }
}

struct LocalUpload {
    id: ObjectId,
    filename: String,
    options: UploadOptions,
    chunk_size: u32,
    buffer: ChunkBuffer,
    hasher: Sha256,
    length: u64,
    next_chunk: u64,
    staging: PathBuf,
    chunk_dir: PathBuf,
    meta_path: PathBuf,
    claim: PathBuf,
    /// Staging and claim already released
    settled: bool,
}

impl LocalUpload {
    async fn flush_chunk(&mut self, chunk: Bytes) -> Result<()> {
        fs::write(chunk_path(&self.staging, self.next_chunk), encode_chunk(&chunk)).await?;
        self.next_chunk += 1;
        Ok(())
    }

    /// Remove the staging dir (if still there) and release the id claim.
    async fn discard(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.staging).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove staging dir {:?}: {}", self.staging, e);
            }
        }
        if let Err(e) = fs::remove_file(&self.claim).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to release claim {:?}: {}", self.claim, e);
            }
        }
        self.settled = true;
    }

    async fn commit(&mut self) -> Result<ObjectId> {
        if let Some(rest) = self.buffer.take_rest() {
            self.flush_chunk(rest).await?;
        }

        if fs::try_exists(&self.meta_path).await? {
            return Err(id_in_use(self.id));
        }

        // Chunks without a record are leftovers of an interrupted delete or
        // commit; only the claim holder may clear them.
        if fs::try_exists(&self.chunk_dir).await? {
            fs::remove_dir_all(&self.chunk_dir).await?;
        }
        fs::rename(&self.staging, &self.chunk_dir).await?;

        let hasher = std::mem::take(&mut self.hasher);
        let meta = StoredObjectMetadata::new(
            self.id,
            self.filename.clone(),
            self.length,
            self.chunk_size,
            hex::encode(hasher.finalize()),
            &self.options,
        );

        let tmp_path = self.meta_path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_vec_pretty(&meta)?).await?;
        fs::rename(&tmp_path, &self.meta_path).await?;

        debug!("Committed local upload {} ({} chunks)", self.id, self.next_chunk);
        Ok(self.id)
    }
}

impl Drop for LocalUpload {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Dropped mid-upload, e.g. a cancelled write.
        if let Err(e) = std::fs::remove_dir_all(&self.staging) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove staging dir {:?}: {}", self.staging, e);
            }
        }
        if let Err(e) = std::fs::remove_file(&self.claim) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to release claim {:?}: {}", self.claim, e);
            }
        }
    }
}

#[async_trait]
impl UploadStream for LocalUpload {
    fn id(&self) -> ObjectId {
        self.id
    }

    async fn write(&mut self, data: Bytes) -> Result<()> {
        self.hasher.update(&data);
        self.length += data.len() as u64;
        self.buffer.extend(&data);
        while let Some(chunk) = self.buffer.next_full() {
            self.flush_chunk(chunk).await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<ObjectId> {
        let result = self.commit().await;
        self.discard().await;
        result
    }

    async fn abort(mut self: Box<Self>) -> Result<()> {
        self.discard().await;
        Ok(())
    }
}
