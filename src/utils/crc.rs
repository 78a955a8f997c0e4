use bytes::Bytes;
use crc32fast::Hasher;
use std::io;

/// Length of the checksum header in front of every chunk file
pub const CHUNK_HEADER_LEN: usize = 4;

/// Compute CRC32 checksum for a byte slice
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Prefix a chunk payload with its big-endian CRC32
pub fn encode_chunk(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(CHUNK_HEADER_LEN + payload.len());
    out.extend_from_slice(&crc32(payload).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Strip and check the checksum header written by [`encode_chunk`]
pub fn decode_chunk(raw: Bytes) -> io::Result<Bytes> {
    if raw.len() < CHUNK_HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("chunk truncated: {} bytes", raw.len()),
        ));
    }

    let expected = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let payload = raw.slice(CHUNK_HEADER_LEN..);
    let actual = crc32(&payload);

    if actual != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("chunk checksum mismatch: expected {:08x}, got {:08x}", expected, actual),
        ));
    }

    Ok(payload)
}
