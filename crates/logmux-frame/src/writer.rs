use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_frame, FrameConfig, LogEntry};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write one entry as a complete frame (blocking).
    pub fn write_entry(&mut self, entry: &LogEntry) -> Result<()> {
        self.buf.clear();
        encode_frame(entry, &mut self.buf, self.config.max_payload_size)?;

        // write_all retries Interrupted and maps a zero-length write to WriteZero.
        self.inner.write_all(&self.buf)?;
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
