use std::path::PathBuf;
use std::sync::Arc;

use logmux_transport::{pipe, InputOpener, PipeReader, TransportError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::error::{DriverError, RegistryError, Result};
use crate::ingest::IngestWorker;
use crate::notify::WebhookNotifier;
use crate::readback::stream_to_pipe;
use crate::registry::{ActiveStream, Reservation, StreamMetadata, StreamRegistry};
use crate::sink::{LogSink, ReadConfig, SinkContext, SinkFactory};

#[cfg(unix)]
use logmux_transport::FifoOpener;

/// Multiplexes producer log streams into per-stream sinks.
///
/// Every operation that spawns work (`start_ingestion`, `read_back`) must be
/// called from within a Tokio runtime.
pub struct LogDriver<O> {
    registry: StreamRegistry,
    sinks: Arc<dyn SinkFactory>,
    opener: O,
    config: DriverConfig,
    notifier: Option<WebhookNotifier>,
    tasks: TaskTracker,
}

#[cfg(unix)]
impl LogDriver<FifoOpener> {
    /// Driver whose stream handles are FIFO paths.
    pub fn new(config: DriverConfig, sinks: Arc<dyn SinkFactory>) -> Result<Self> {
        Self::with_opener(config, sinks, FifoOpener)
    }
}

impl<O: InputOpener> LogDriver<O> {
    pub fn with_opener(
        config: DriverConfig,
        sinks: Arc<dyn SinkFactory>,
        opener: O,
    ) -> Result<Self> {
        let tasks = TaskTracker::new();
        let notifier = config
            .webhook_url
            .as_deref()
            .map(|url| {
                WebhookNotifier::new(url, config.webhook_timeout).map(|notifier| {
                    notifier
                        .with_max_in_flight(config.webhook_max_in_flight)
                        .with_tasks(tasks.clone())
                })
            })
            .transpose()?;

        Ok(Self {
            registry: StreamRegistry::new(),
            sinks,
            opener,
            config,
            notifier,
            tasks,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Register `handle`, open its input and spawn its ingestion worker.
    ///
    /// Returns once the input is open. Fails with
    /// [`RegistryError::AlreadyRegistered`] if the handle is pending or
    /// active, and with [`RegistryError::Stopped`] if the handle is stopped
    /// while its input is still being opened. Dropping the returned future
    /// before it completes releases the handle and the pending open.
    pub async fn start_ingestion(&self, handle: &str, metadata: StreamMetadata) -> Result<()> {
        let mut pending = PendingStart {
            registry: &self.registry,
            handle: handle.to_string(),
            reservation: Some(self.registry.reserve(handle)?),
            sink: None,
        };

        let (log_path, sink, input) = self.establish(&mut pending, handle, &metadata).await?;
        let stream = pending.publish(metadata, log_path, sink)?;

        info!(
            id = %stream.producer_id(),
            file = %stream.handle(),
            logpath = %stream.log_path().display(),
            "started log ingestion"
        );

        let worker = IngestWorker::new(stream, input, &self.config, self.notifier.clone());
        self.tasks.spawn(worker.run());
        Ok(())
    }

    async fn establish(
        &self,
        pending: &mut PendingStart<'_>,
        handle: &str,
        metadata: &StreamMetadata,
    ) -> Result<(PathBuf, Arc<dyn LogSink>, O::Stream)> {
        let log_path = metadata
            .log_path
            .clone()
            .unwrap_or_else(|| self.config.default_log_path(&metadata.producer_id));

        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| DriverError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let sink = self
            .sinks
            .create(&SinkContext {
                handle,
                metadata,
                log_path: &log_path,
            })
            .map_err(|source| DriverError::Sink {
                handle: handle.to_string(),
                source,
            })?;
        pending.sink = Some(Arc::clone(&sink));

        debug!(
            id = %metadata.producer_id,
            file = %handle,
            logpath = %log_path.display(),
            "opening log input"
        );

        let cancel = pending.cancel_token();
        let input = self
            .opener
            .open(handle, &cancel)
            .await
            .map_err(|err| match err {
                TransportError::Cancelled { .. } => {
                    RegistryError::Stopped(handle.to_string()).into()
                }
                other => DriverError::Open(other),
            })?;

        Ok((log_path, sink, input))
    }

    /// Stop ingesting `handle`. Unknown handles are ignored.
    ///
    /// A registration still opening its input is cancelled. Otherwise the
    /// stream leaves both indexes, its input is closed and its sink released.
    pub fn stop_ingestion(&self, handle: &str) {
        debug!(file = %handle, "stopping log ingestion");
        let Some(stream) = self.registry.unregister(handle) else {
            return;
        };
        close_sink(stream.sink().as_ref(), handle);
    }

    /// Stream the stored logs of `producer_id` as frames.
    ///
    /// The returned reader ends cleanly when the watch finishes, yields an
    /// error if the watch fails, and releases the watch when dropped.
    pub fn read_back(&self, producer_id: &str, config: ReadConfig) -> Result<PipeReader> {
        let stream = self.registry.lookup_by_producer(producer_id)?;
        let reader = stream
            .sink()
            .reader()
            .ok_or_else(|| DriverError::Unsupported(producer_id.to_string()))?;

        let watcher = reader.read_logs(config);
        let (writer, pipe_reader) = pipe(self.config.readback_buffer);
        self.tasks.spawn(stream_to_pipe(
            watcher,
            writer,
            producer_id.to_string(),
            self.config.max_frame_size,
        ));
        Ok(pipe_reader)
    }

    /// Stop every stream and wait for workers, read-back tasks and webhook
    /// posts to finish.
    pub async fn shutdown(&self) {
        for handle in self.registry.handles() {
            self.stop_ingestion(&handle);
        }
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }
}

/// Registration between `reserve` and `publish`.
///
/// Dropped before publication (an error, or the caller abandoning the
/// future), it cancels the pending open, frees the handle and closes the
/// sink created so far.
struct PendingStart<'a> {
    registry: &'a StreamRegistry,
    handle: String,
    reservation: Option<Reservation>,
    sink: Option<Arc<dyn LogSink>>,
}

impl PendingStart<'_> {
    fn cancel_token(&self) -> CancellationToken {
        self.reservation
            .as_ref()
            .map(|reservation| reservation.cancel_token().clone())
            .unwrap_or_default()
    }

    fn publish(
        mut self,
        metadata: StreamMetadata,
        log_path: PathBuf,
        sink: Arc<dyn LogSink>,
    ) -> std::result::Result<Arc<ActiveStream>, RegistryError> {
        let Some(reservation) = self.reservation.take() else {
            return Err(RegistryError::Stopped(self.handle.clone()));
        };
        let stream = ActiveStream::new(&reservation, metadata, log_path, sink);
        let stream = self.registry.publish(reservation, stream)?;
        self.sink = None;
        Ok(stream)
    }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if let Some(reservation) = self.reservation.take() {
            reservation.cancel_token().cancel();
            self.registry.abandon(reservation);
        }
        if let Some(sink) = self.sink.take() {
            close_sink(sink.as_ref(), &self.handle);
        }
    }
}

fn close_sink(sink: &dyn LogSink, handle: &str) {
    if let Err(err) = sink.close() {
        warn!(file = %handle, error = %err, "error closing log sink");
    }
}

impl<O> std::fmt::Debug for LogDriver<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogDriver")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
