use bytes::{Bytes, BytesMut};

/// Accumulates written bytes and cuts them into fixed-size chunks
#[derive(Debug)]
pub struct ChunkBuffer {
    buf: BytesMut,
    chunk_size: usize,
}

impl ChunkBuffer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(chunk_size),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Take the next full chunk, if one is buffered
    pub fn next_full(&mut self) -> Option<Bytes> {
        if self.buf.len() >= self.chunk_size {
            Some(self.buf.split_to(self.chunk_size).freeze())
        } else {
            None
        }
    }

    /// Take whatever is left as a final, possibly short, chunk
    pub fn take_rest(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.split().freeze())
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Concatenate chunks in order into one contiguous buffer
pub fn concat(mut chunks: Vec<Bytes>, total_len: usize) -> Bytes {
    match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.pop().unwrap_or_default(),
        _ => {
            let mut out = BytesMut::with_capacity(total_len);
            for chunk in &chunks {
                out.extend_from_slice(chunk);
            }
            out.freeze()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_chunk_boundaries() {
        let mut buffer = ChunkBuffer::new(4);
        buffer.extend(b"abcdefghij");

        assert_eq!(buffer.next_full().unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(buffer.next_full().unwrap(), Bytes::from_static(b"efgh"));
        assert!(buffer.next_full().is_none());
        assert_eq!(buffer.take_rest().unwrap(), Bytes::from_static(b"ij"));
        assert!(buffer.take_rest().is_none());
    }

    #[test]
    fn test_concat_preserves_order() {
        let chunks = vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")];
        assert_eq!(concat(chunks, 4), Bytes::from_static(b"abcd"));
        assert!(concat(Vec::new(), 0).is_empty());
    }
}
