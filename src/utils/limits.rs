/// Bucket name used when none is configured
pub const DEFAULT_BUCKET_NAME: &str = "fs";

/// Default chunk size (255 KiB)
pub const DEFAULT_CHUNK_SIZE: u32 = 255 * 1024;

/// Largest chunk an engine will accept. A chunk must fit in one 16 MiB record.
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024 - 1024;

/// Read size used when turning an `AsyncRead` into a byte stream
pub const READ_BUFFER_SIZE: usize = 64 * 1024;
