use std::future::Future;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Opens the input byte-stream named by a stream handle.
///
/// The handle is opaque to the driver; [`FifoOpener`](crate::FifoOpener)
/// treats it as a filesystem path to a named FIFO.
pub trait InputOpener: Send + Sync + 'static {
    /// Stream produced by a successful open.
    type Stream: AsyncRead + Send + Unpin + 'static;

    /// Open `handle` for reading.
    ///
    /// Implementations may wait for the producer side to appear, but must
    /// give up with [`TransportError::Cancelled`](crate::TransportError::Cancelled)
    /// once `cancel` fires.
    fn open(
        &self,
        handle: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;
}

impl<T: InputOpener> InputOpener for std::sync::Arc<T> {
    type Stream = T::Stream;

    fn open(
        &self,
        handle: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Self::Stream>> + Send {
        T::open(self, handle, cancel)
    }
}
