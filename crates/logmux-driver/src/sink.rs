//! Storage seams: where decoded messages go and how they are read back.
//!
//! A [`LogSink`] is created per stream by a [`SinkFactory`]. Sinks that can
//! replay what they stored also expose a [`LogReader`], which hands out a
//! [`LogWatcher`] per read request. The watcher carries two channels
//! (messages and a terminal error) and a consumer-gone signal that the
//! producing side observes through its [`WatchPublisher`].

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::message::LogMessage;
use crate::registry::StreamMetadata;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("log sink is closed")]
    Closed,

    #[error("watcher fell behind by {0} messages")]
    Lagged(u64),

    #[error("log sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Per-stream storage backend.
pub trait LogSink: Send + Sync {
    /// Store one message. Errors are reported by the caller and never end the stream.
    fn log(&self, message: &LogMessage) -> Result<(), SinkError>;

    /// Read-back capability, if this sink has one.
    fn reader(&self) -> Option<&dyn LogReader> {
        None
    }

    /// Release resources once the stream is stopped.
    fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

pub trait LogReader: Send + Sync {
    /// Start a watch over stored (and optionally future) messages.
    fn read_logs(&self, config: ReadConfig) -> LogWatcher;
}

/// What a [`SinkFactory`] gets to know about the stream it serves.
#[derive(Debug, Clone, Copy)]
pub struct SinkContext<'a> {
    pub handle: &'a str,
    pub metadata: &'a StreamMetadata,
    pub log_path: &'a Path,
}

pub trait SinkFactory: Send + Sync {
    fn create(&self, context: &SinkContext<'_>) -> Result<Arc<dyn LogSink>, SinkError>;
}

/// Read-back request parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadConfig {
    /// Only records at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only records at or before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Keep streaming new records after the stored ones.
    pub follow: bool,
    /// Only the last N stored records.
    pub tail: Option<usize>,
}

impl ReadConfig {
    /// Whether `message` falls inside the since/until window.
    pub fn admits(&self, message: &LogMessage) -> bool {
        self.since.is_none_or(|since| message.timestamp >= since)
            && self.until.is_none_or(|until| message.timestamp <= until)
    }
}

/// Consumer half of a read-back watch.
///
/// Dropping the watcher counts as [`consumer_gone`](Self::consumer_gone).
#[derive(Debug)]
pub struct LogWatcher {
    pub messages: mpsc::Receiver<LogMessage>,
    pub errors: mpsc::Receiver<SinkError>,
    gone: CancellationToken,
}

impl LogWatcher {
    /// Create a watcher and the publisher that feeds it.
    pub fn channel(capacity: usize) -> (WatchPublisher, LogWatcher) {
        let (messages_tx, messages) = mpsc::channel(capacity.max(1));
        let (errors_tx, errors) = mpsc::channel(1);
        let gone = CancellationToken::new();
        (
            WatchPublisher {
                messages: messages_tx,
                errors: errors_tx,
                gone: gone.clone(),
            },
            LogWatcher {
                messages,
                errors,
                gone,
            },
        )
    }

    /// Tell the producing side to stop and release its resources.
    pub fn consumer_gone(&self) {
        self.gone.cancel();
    }
}

impl Drop for LogWatcher {
    fn drop(&mut self) {
        self.gone.cancel();
    }
}

/// Producer half of a read-back watch.
#[derive(Debug)]
pub struct WatchPublisher {
    messages: mpsc::Sender<LogMessage>,
    errors: mpsc::Sender<SinkError>,
    gone: CancellationToken,
}

impl WatchPublisher {
    /// Deliver one message. Returns `false` once the consumer is gone.
    pub async fn send(&self, message: LogMessage) -> bool {
        if self.gone.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.gone.cancelled() => false,
            sent = self.messages.send(message) => sent.is_ok(),
        }
    }

    /// End the watch with an error.
    pub async fn fail(self, err: SinkError) {
        tokio::select! {
            biased;
            _ = self.gone.cancelled() => {}
            _ = self.errors.send(err) => {}
        }
    }

    /// Resolves once the consumer is gone.
    pub async fn consumer_gone(&self) {
        self.gone.cancelled().await
    }

    pub fn is_consumer_gone(&self) -> bool {
        self.gone.is_cancelled()
    }
}
