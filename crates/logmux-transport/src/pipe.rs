//! Bounded in-process byte pipe.
//!
//! The writer pushes whole chunks (one encoded frame each) into a bounded
//! channel; the reader exposes them as a contiguous [`AsyncRead`] stream.
//! A full channel suspends the writer until the reader catches up. The
//! writer can end the stream cleanly or with an error that the reader
//! observes on its next read.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

type Chunk = io::Result<Bytes>;

/// Create a pipe buffering at most `capacity` chunks.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PipeWriter { tx },
        PipeReader {
            inner: StreamReader::new(Chunks { rx }),
        },
    )
}

/// Write half of a [`pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<Chunk>,
}

impl PipeWriter {
    /// Send a chunk, waiting while the pipe is full.
    ///
    /// Fails with [`io::ErrorKind::BrokenPipe`] once the reader is gone.
    pub async fn write(&self, chunk: Bytes) -> io::Result<()> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))
    }

    /// End the stream; the reader sees EOF after draining buffered chunks.
    pub fn close(self) {}

    /// End the stream with an error delivered after the buffered chunks.
    pub async fn close_with_error(self, err: io::Error) {
        let _ = self.tx.send(Err(err)).await;
    }

    /// Resolves once the reader has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Whether the reader has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read half of a [`pipe`]. Dropping it signals the writer.
#[derive(Debug)]
pub struct PipeReader {
    inner: StreamReader<Chunks, Bytes>,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

#[derive(Debug)]
struct Chunks {
    rx: mpsc::Receiver<Chunk>,
}

impl futures_core::Stream for Chunks {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
