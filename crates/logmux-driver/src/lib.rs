//! Log stream multiplexer.
//!
//! A [`LogDriver`] accepts framed log streams from many producers. Each
//! stream is identified by a *handle* (for FIFOs, the FIFO path) and
//! belongs to a producer identity. For every stream the driver:
//!
//! 1. reserves the handle in the [`StreamRegistry`],
//! 2. creates a [`LogSink`] through the configured [`SinkFactory`],
//! 3. opens the input through an [`InputOpener`](logmux_transport::InputOpener),
//! 4. spawns a worker that decodes frames into [`LogMessage`]s and stores them.
//!
//! Stored logs are read back per producer identity as a stream of frames
//! in the same wire format the producers write.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use logmux_driver::{DriverConfig, LogDriver, MemorySinkFactory, StreamMetadata};
//!
//! # async fn run() -> logmux_driver::Result<()> {
//! let sinks = Arc::new(MemorySinkFactory::default());
//! let driver = LogDriver::new(DriverConfig::default(), sinks)?;
//! driver
//!     .start_ingestion("/run/logmux/c1.fifo", StreamMetadata::new("c1"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod ingest;
pub mod memory;
pub mod message;
pub mod notify;
pub mod readback;
pub mod registry;
pub mod sink;

pub use config::{DriverConfig, DEFAULT_LOG_ROOT, DEFAULT_WEBHOOK_MAX_IN_FLIGHT};
pub use driver::LogDriver;
pub use error::{DriverError, RegistryError, Result};
pub use ingest::IngestExit;
pub use memory::{MemorySink, MemorySinkFactory, DEFAULT_MEMORY_CAPACITY};
pub use message::{LogMessage, PartialMetadata};
pub use notify::{NotifyError, WebhookNotifier, WebhookPayload};
pub use readback::ReadBackExit;
pub use registry::{ActiveStream, Reservation, StreamMetadata, StreamRegistry};
pub use sink::{
    LogReader, LogSink, LogWatcher, ReadConfig, SinkContext, SinkError, SinkFactory,
    WatchPublisher,
};
