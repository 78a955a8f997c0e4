//! # gridstore
//!
//! A thin async facade over a chunked object storage engine ("bucket"):
//! - write a byte stream or buffer under a filename, optionally with a caller-chosen id
//! - read an object back as one contiguous buffer, by id or by filename
//! - enumerate stored objects by metadata filter
//! - delete an object by id
//!
//! ```text
//!   caller ──► ObjectStore ──► dyn Bucket ──► chunks + metadata record
//!                  ▲                │
//!                  └── collect() ◄──┘ download stream
//! ```
//!
//! Chunking, reassembly and metadata lifecycle belong to the engine. Two engines
//! ship with the crate: [`MemoryBucket`] and [`LocalBucket`].

pub mod config;
pub mod error;
pub mod storage;
pub mod store;
pub mod stream;
pub mod utils;

pub use config::StoreConfig;
pub use error::{ErrorKind, Result, StoreError};
pub use storage::{
    Bucket, Cursor, Filter, FindOptions, LocalBucket, MemoryBucket, ObjectId, SortOrder,
    StoredObjectMetadata, Target, UploadOptions, UploadStream, WriteOptions,
};
pub use store::ObjectStore;
pub use stream::{collect, collect_with_limit, ByteStream};

/// Current version of gridstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
