use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::codec::{FrameConfig, FrameDecoder, LogEntry};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Async counterpart of [`FrameReader`](crate::FrameReader).
///
/// `read_frame` is cancel safe: bytes already pulled from the stream stay
/// buffered if the future is dropped before a frame completes.
pub struct AsyncFrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<T: AsyncRead + Unpin> AsyncFrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(config.max_payload_size),
        }
    }

    /// Read the next complete entry.
    ///
    /// Returns `Err(FrameError::EndOfStream)` when EOF is reached on a frame
    /// boundary.
    pub async fn read_frame(&mut self) -> Result<LogEntry> {
        loop {
            if let Some(entry) = self.decoder.decode(&mut self.buf)? {
                return Ok(entry);
            }

            self.buf.reserve(READ_CHUNK_SIZE);
            let read = match self.inner.read_buf(&mut self.buf).await {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                self.decoder.finish(&mut self.buf)?;
                return Err(FrameError::EndOfStream);
            }
        }
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes};
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::codec::{encode_frame, DEFAULT_MAX_PAYLOAD};
    use crate::error::CorruptFrame;

    fn encode(entry: &LogEntry) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(entry, &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        buf.to_vec()
    }

    #[tokio::test]
    async fn reads_frames_written_in_pieces() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = AsyncFrameReader::new(rx);
        let entry = LogEntry::new("stdout", Bytes::from_static(b"split across writes"), 7);
        let bytes = encode(&entry);

        let writer = tokio::spawn(async move {
            for piece in bytes.chunks(3) {
                tx.write_all(piece).await.unwrap();
                tokio::task::yield_now().await;
            }
        });

        assert_eq!(reader.read_frame().await.unwrap(), entry);
        writer.await.unwrap();
        assert!(matches!(
            reader.read_frame().await.unwrap_err(),
            FrameError::EndOfStream
        ));
    }

    #[tokio::test]
    async fn truncated_frame_reported_at_eof() {
        let mut partial = BytesMut::new();
        partial.put_u32(32);
        partial.put_slice(b"short");

        let mut reader = AsyncFrameReader::new(std::io::Cursor::new(partial.to_vec()));
        let err = reader.read_frame().await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::FrameCorrupt(CorruptFrame::Truncated {
                expected: 36,
                received: 9
            })
        ));
    }

    #[tokio::test]
    async fn oversized_frame_then_valid_frame() {
        let big = LogEntry::new("stdout", vec![b'x'; 512], 1);
        let small = LogEntry::new("stdout", Bytes::from_static(b"fits"), 2);
        let mut bytes = encode(&big);
        bytes.extend(encode(&small));

        let cfg = FrameConfig {
            max_payload_size: 128,
        };
        let mut reader = AsyncFrameReader::with_config(std::io::Cursor::new(bytes), cfg);
        assert!(matches!(
            reader.read_frame().await.unwrap_err(),
            FrameError::FrameTooLarge { max: 128, .. }
        ));
        assert_eq!(reader.read_frame().await.unwrap(), small);
    }
}
