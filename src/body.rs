//! Lazy body sources handed to an exchange.
//!
//! A [`Body`] is either nothing, one fully buffered chunk, or a stream of
//! chunks produced on demand. The exchange pulls the next chunk only after
//! the connection acknowledged the previous write, so a stream is never
//! polled faster than the transport drains it. Dropping a stream cancels it;
//! any chunk it already produced is disposed by [`Payload`]'s drop.

use std::{
    io::{self, SeekFrom},
    path::Path,
    pin::Pin,
};

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;

use crate::{error::BodyError, payload::Payload};

/// A type-erased stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Payload, BodyError>> + Send + 'static>>;

/// Outbound body of an exchange.
pub enum Body {
    /// No body at all.
    Empty,
    /// A fully buffered body, eligible for the single-frame fast path.
    Full(Payload),
    /// Chunks produced lazily, sent with streaming framing.
    Stream(BodyStream),
}

impl Body {
    /// Wrap any stream of chunks.
    pub fn stream<S>(source: S) -> Self
    where
        S: Stream<Item = Result<Payload, BodyError>> + Send + 'static,
    {
        Self::Stream(Box::pin(source))
    }

    /// Stream the given chunks in order.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Payload>,
        I::IntoIter: Send + 'static,
    {
        Self::stream(stream::iter(chunks.into_iter().map(|chunk| Ok(chunk.into()))))
    }

    /// Stream `length` bytes of the file at `path`, starting at `offset`.
    ///
    /// The stream yields an [`io::ErrorKind::UnexpectedEof`] error after its
    /// last chunk if the file ends before `length` bytes were read.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened or positioned.
    pub async fn file_region(
        path: &Path,
        offset: u64,
        length: u64,
        chunk_size: usize,
    ) -> io::Result<Self> {
        let mut file = File::open(path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let reader = ReaderStream::with_capacity(file.take(length), chunk_size.max(1));
        let chunks = stream::unfold((reader, length), |(mut reader, remaining)| async move {
            match reader.next().await {
                Some(Ok(bytes)) => {
                    let read = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
                    let remaining = remaining.saturating_sub(read);
                    Some((Ok(Payload::new(bytes)), (reader, remaining)))
                }
                Some(Err(e)) => Some((Err(BodyError::from(e)), (reader, 0))),
                None if remaining > 0 => {
                    let short = io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("file region ended {remaining} bytes short"),
                    );
                    Some((Err(BodyError::from(short)), (reader, 0)))
                }
                None => None,
            }
        });
        Ok(Self::stream(chunks))
    }
}

impl From<Payload> for Body {
    fn from(payload: Payload) -> Self { Self::Full(payload) }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self { Self::Full(Payload::new(bytes)) }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Full(payload) => f.debug_tuple("Full").field(payload).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}
