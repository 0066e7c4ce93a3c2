use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{FrameConfig, FrameDecoder, LogEntry};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete log entries from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// After a [`FrameError::FrameTooLarge`] or [`FrameError::FrameCorrupt`] the
/// reader stays usable and continues at the next frame boundary.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
}

impl<T: Read> FrameReader<T> {
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

    /// Read the next complete entry (blocking).
    ///
    /// Returns `Err(FrameError::EndOfStream)` when EOF is reached on a frame
    /// boundary.
    pub fn read_frame(&mut self) -> Result<LogEntry> {
        loop {
            if let Some(entry) = self.decoder.decode(&mut self.buf)? {
                return Ok(entry);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                self.decoder.finish(&mut self.buf)?;
                return Err(FrameError::EndOfStream);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Iterator for FrameReader<T> {
    type Item = Result<LogEntry>;

    /// Yields entries until the stream ends; protocol errors are yielded
    /// in place and iteration continues past them.
    fn next(&mut self) -> Option<Self::Item> {
        match self.read_frame() {
            Err(FrameError::EndOfStream) => None,
            other => Some(other),
        }
    }
}
