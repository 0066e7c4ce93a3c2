//! Bounded in-memory sink with read-back support.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::message::LogMessage;
use crate::sink::{LogReader, LogSink, LogWatcher, ReadConfig, SinkContext, SinkError, SinkFactory};

/// Messages retained per sink by default.
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

const WATCH_BUFFER: usize = 64;

/// Keeps the most recent messages of one stream and replays them on request.
///
/// Followers receive live messages through a broadcast channel. The history
/// snapshot and the follower subscription are taken under the same lock as
/// [`LogSink::log`], so a follower sees every message exactly once.
pub struct MemorySink {
    state: Mutex<MemoryState>,
    live: broadcast::Sender<LogMessage>,
    shutdown: CancellationToken,
    capacity: usize,
}

struct MemoryState {
    entries: VecDeque<LogMessage>,
    closed: bool,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (live, _) = broadcast::channel(capacity.min(WATCH_BUFFER * 16));
        Self {
            state: Mutex::new(MemoryState {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            live,
            shutdown: CancellationToken::new(),
            capacity,
        }
    }

    /// Snapshot of the retained messages, oldest first.
    pub fn messages(&self) -> Vec<LogMessage> {
        self.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

impl std::fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySink")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl LogSink for MemorySink {
    fn log(&self, message: &LogMessage) -> Result<(), SinkError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SinkError::Closed);
        }
        if state.entries.len() == self.capacity {
            state.entries.pop_front();
        }
        state.entries.push_back(message.clone());
        // No followers is fine.
        let _ = self.live.send(message.clone());
        Ok(())
    }

    fn reader(&self) -> Option<&dyn LogReader> {
        Some(self)
    }

    fn close(&self) -> Result<(), SinkError> {
        self.lock().closed = true;
        self.shutdown.cancel();
        Ok(())
    }
}

impl LogReader for MemorySink {
    fn read_logs(&self, config: ReadConfig) -> LogWatcher {
        let (publisher, watcher) = LogWatcher::channel(WATCH_BUFFER);

        let (history, live) = {
            let state = self.lock();
            let history = select_history(&state.entries, &config);
            let live = (config.follow && !state.closed).then(|| self.live.subscribe());
            (history, live)
        };
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            for message in history {
                if !publisher.send(message).await {
                    return;
                }
            }

            let Some(mut live) = live else {
                return;
            };
            loop {
                let received = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = publisher.consumer_gone() => return,
                    received = live.recv() => received,
                };
                match received {
                    Ok(message) => {
                        if config.until.is_some_and(|until| message.timestamp > until) {
                            return;
                        }
                        if config.since.is_some_and(|since| message.timestamp < since) {
                            continue;
                        }
                        if !publisher.send(message).await {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, "follower lagged behind memory sink");
                        publisher.fail(SinkError::Lagged(missed)).await;
                        return;
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });

        watcher
    }
}

fn select_history(entries: &VecDeque<LogMessage>, config: &ReadConfig) -> Vec<LogMessage> {
    let mut selected: Vec<LogMessage> = entries
        .iter()
        .filter(|message| config.admits(message))
        .cloned()
        .collect();
    if let Some(tail) = config.tail {
        let skip = selected.len().saturating_sub(tail);
        selected.drain(..skip);
    }
    selected
}

/// Creates one [`MemorySink`] per stream and remembers it by handle.
#[derive(Debug)]
pub struct MemorySinkFactory {
    capacity: usize,
    sinks: Mutex<HashMap<String, Arc<MemorySink>>>,
}

impl MemorySinkFactory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sinks: Mutex::new(HashMap::new()),
        }
    }

    /// Most recent sink created for `handle`.
    pub fn sink(&self, handle: &str) -> Option<Arc<MemorySink>> {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
    }
}

impl Default for MemorySinkFactory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

impl SinkFactory for MemorySinkFactory {
    fn create(&self, context: &SinkContext<'_>) -> Result<Arc<dyn LogSink>, SinkError> {
        let sink = Arc::new(MemorySink::new(self.capacity));
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(context.handle.to_string(), Arc::clone(&sink));
        Ok(sink)
    }
}
