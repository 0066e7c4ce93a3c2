//! Byte-stream endpoints for log stream transport.
//!
//! Two kinds of endpoint live here:
//! - Named FIFOs that producers write framed log records into. Opening one
//!   blocks until a writer shows up, and can be abandoned through a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken).
//! - A bounded in-process [`pipe`] used to stream read-back output to a
//!   consumer with backpressure and error propagation.
//!
//! Everything above this crate talks to inputs through the [`InputOpener`]
//! trait so that tests can substitute in-memory streams.

pub mod error;
pub mod pipe;
pub mod traits;

#[cfg(unix)]
pub mod fifo;

pub use error::{Result, TransportError};
pub use pipe::{pipe, PipeReader, PipeWriter};
pub use traits::InputOpener;

#[cfg(unix)]
pub use fifo::{create_fifo, open_fifo, FifoOpener, DEFAULT_FIFO_MODE};
