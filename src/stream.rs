//! Readable byte streams and the aggregator that drains them into one buffer.

use bytes::Bytes;
use futures::stream::{self, BoxStream, FusedStream, Stream, StreamExt};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::utils::buffer::concat;

/// A readable source of byte chunks.
///
/// The stream stays readable until it has yielded its end or an error. After
/// that the inner source is dropped and every further poll returns `None`.
pub struct ByteStream {
    inner: Option<BoxStream<'static, io::Result<Bytes>>>,
}

impl ByteStream {
    pub fn new<S>(source: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: Some(source.boxed()),
        }
    }

    /// Single-shot stream: one data item carrying `data`, then end.
    pub fn once(data: impl Into<Bytes>) -> Self {
        Self::new(stream::once(futures::future::ready(Ok(data.into()))))
    }

    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(chunks.into_iter().map(Ok)))
    }

    /// Readable stream that ends without yielding data.
    pub fn empty() -> Self {
        Self::new(stream::empty())
    }

    /// A stream that is no longer readable.
    pub fn closed() -> Self {
        Self { inner: None }
    }

    /// Read `reader` to EOF in pieces of at most `read_size` bytes.
    pub fn from_reader<R>(reader: R, read_size: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let buf = vec![0u8; read_size.max(1)];
        Self::new(stream::unfold(
            (reader, buf),
            |(mut reader, mut buf)| async move {
                match reader.read(&mut buf).await {
                    Ok(0) => None,
                    Ok(n) => Some((Ok(Bytes::copy_from_slice(&buf[..n])), (reader, buf))),
                    Err(e) => Some((Err(e), (reader, buf))),
                }
            },
        ))
    }

    pub fn is_readable(&self) -> bool {
        self.inner.is_some()
    }
}

impl Stream for ByteStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };

        let polled = inner.as_mut().poll_next(cx);
        match polled {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(e))) => {
                self.inner = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for ByteStream {
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("readable", &self.is_readable())
            .finish()
    }
}

/// Drain `stream` into one contiguous buffer.
///
/// A stream that is not readable yields an empty buffer. The first error item
/// fails the whole collection; the stream is dropped either way.
pub async fn collect(stream: ByteStream) -> io::Result<Bytes> {
    collect_with_limit(stream, usize::MAX).await
}

/// Like [`collect`], but fails with `InvalidData` once more than `max_bytes`
/// have arrived.
pub async fn collect_with_limit(mut stream: ByteStream, max_bytes: usize) -> io::Result<Bytes> {
    if !stream.is_readable() {
        return Ok(Bytes::new());
    }

    let mut chunks = Vec::new();
    let mut total = 0usize;

    while let Some(item) = stream.next().await {
        let chunk = item?;
        total = total.saturating_add(chunk.len());
        if total > max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("stream exceeded {} bytes", max_bytes),
            ));
        }
        chunks.push(chunk);
    }

    Ok(concat(chunks, total))
}
