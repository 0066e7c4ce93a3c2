//! Per-stream ingestion worker.
//!
//! Decodes frames from the stream's input, maps them to [`LogMessage`]s and
//! hands them to the sink (and webhook). Decode errors are logged and the
//! worker keeps reading at the next frame boundary; sink errors never stop
//! it. The worker ends on end-of-stream, when the input is closed by a stop,
//! or when the optional consecutive-error budget is exhausted.

use std::sync::Arc;
use std::time::Duration;

use logmux_frame::{AsyncFrameReader, FrameError};
use tokio::io::AsyncRead;
use tracing::{debug, error, info, warn};

use crate::config::DriverConfig;
use crate::message::LogMessage;
use crate::notify::WebhookNotifier;
use crate::registry::ActiveStream;

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestExit {
    /// The producer closed its end.
    EndOfStream,
    /// The stream was stopped.
    InputClosed,
    /// Too many decode errors in a row.
    ErrorBudgetExhausted,
}

pub(crate) struct IngestWorker<R> {
    stream: Arc<ActiveStream>,
    reader: AsyncFrameReader<R>,
    notifier: Option<WebhookNotifier>,
    max_consecutive_errors: Option<u32>,
    io_error_backoff: Duration,
}

impl<R: AsyncRead + Unpin> IngestWorker<R> {
    pub(crate) fn new(
        stream: Arc<ActiveStream>,
        input: R,
        config: &DriverConfig,
        notifier: Option<WebhookNotifier>,
    ) -> Self {
        Self {
            stream,
            reader: AsyncFrameReader::with_config(input, config.frame_config()),
            notifier,
            max_consecutive_errors: config.max_consecutive_errors,
            io_error_backoff: config.io_error_backoff,
        }
    }

    /// Ingest until the stream ends. The input is dropped on return.
    pub(crate) async fn run(mut self) -> IngestExit {
        let closed = self.stream.input_token().clone();
        let mut consecutive_errors = 0u32;

        loop {
            let read = tokio::select! {
                biased;
                _ = closed.cancelled() => {
                    debug!(
                        id = %self.stream.producer_id(),
                        file = %self.stream.handle(),
                        "input closed, stopping ingestion"
                    );
                    return IngestExit::InputClosed;
                }
                read = self.reader.read_frame() => read,
            };

            match read {
                Ok(entry) => {
                    consecutive_errors = 0;
                    self.forward(LogMessage::from(entry));
                }
                Err(FrameError::EndOfStream) => {
                    info!(
                        id = %self.stream.producer_id(),
                        file = %self.stream.handle(),
                        "shutting down log ingestion"
                    );
                    self.stream.close_input();
                    return IngestExit::EndOfStream;
                }
                Err(err) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    warn!(
                        id = %self.stream.producer_id(),
                        file = %self.stream.handle(),
                        error = %err,
                        consecutive_errors,
                        "error decoding log frame"
                    );

                    if self
                        .max_consecutive_errors
                        .is_some_and(|limit| consecutive_errors >= limit)
                    {
                        error!(
                            id = %self.stream.producer_id(),
                            file = %self.stream.handle(),
                            consecutive_errors,
                            "too many consecutive decode errors, closing input"
                        );
                        self.stream.close_input();
                        return IngestExit::ErrorBudgetExhausted;
                    }

                    if !err.is_protocol_error() {
                        tokio::select! {
                            _ = closed.cancelled() => return IngestExit::InputClosed,
                            _ = tokio::time::sleep(self.io_error_backoff) => {}
                        }
                    }
                }
            }
        }
    }

    fn forward(&self, message: LogMessage) {
        if let Err(err) = self.stream.sink().log(&message) {
            error!(
                id = %self.stream.producer_id(),
                file = %self.stream.handle(),
                error = %err,
                "error writing log message"
            );
            return;
        }

        if let Some(notifier) = &self.notifier {
            notifier.notify(&message);
        }
    }
}
