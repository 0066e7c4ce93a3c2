#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use logmux_driver::{
    DriverConfig, LogDriver, LogMessage, LogReader, LogSink, LogWatcher, ReadConfig, SinkContext,
    SinkError, SinkFactory, WatchPublisher,
};
use logmux_frame::{encode_frame, LogEntry};
use logmux_transport::{InputOpener, TransportError};
use tokio::io::{AsyncRead, DuplexStream, ReadBuf};
use tokio_util::sync::CancellationToken;

pub type BoxedInput = Box<dyn AsyncRead + Send + Unpin>;

pub fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/logmux-driver-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

pub fn test_config(tag: &str) -> DriverConfig {
    DriverConfig {
        log_root: unique_temp_dir(tag),
        ..DriverConfig::default()
    }
}

pub fn frame(line: &str, time_nano: i64) -> Bytes {
    let entry = LogEntry::new("stdout", Bytes::copy_from_slice(line.as_bytes()), time_nano);
    let mut buf = BytesMut::new();
    encode_frame(&entry, &mut buf, usize::MAX).expect("entry should encode");
    buf.freeze()
}

pub fn frames(lines: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        out.extend_from_slice(&frame(line, i as i64 + 1));
    }
    out
}

pub fn lines(messages: &[LogMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|m| String::from_utf8_lossy(&m.line).into_owned())
        .collect()
}

pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let start = Instant::now();
    while !condition() {
        if start.elapsed() >= Duration::from_secs(3) {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Opener handing out pre-registered in-memory inputs.
///
/// Handles with no input block until cancelled, like a FIFO with no writer.
#[derive(Default)]
pub struct TestOpener {
    inputs: Mutex<HashMap<String, BoxedInput>>,
}

impl TestOpener {
    pub fn insert(&self, handle: &str, input: impl AsyncRead + Send + Unpin + 'static) {
        self.inputs
            .lock()
            .unwrap()
            .insert(handle.to_string(), Box::new(input));
    }

    /// Register a duplex input and return the producer's end.
    pub fn duplex(&self, handle: &str) -> DuplexStream {
        let (producer, input) = tokio::io::duplex(64 * 1024);
        self.insert(handle, input);
        producer
    }
}

impl InputOpener for TestOpener {
    type Stream = BoxedInput;

    async fn open(
        &self,
        handle: &str,
        cancel: &CancellationToken,
    ) -> logmux_transport::Result<BoxedInput> {
        let input = self.inputs.lock().unwrap().remove(handle);
        match input {
            Some(input) => Ok(input),
            None => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled {
                    path: PathBuf::from(handle),
                })
            }
        }
    }
}

/// Input that replays scripted reads. An empty chunk reads as EOF once.
pub struct ScriptedInput {
    steps: VecDeque<Vec<u8>>,
}

impl ScriptedInput {
    pub fn new(steps: Vec<Vec<u8>>) -> Self {
        Self {
            steps: steps.into(),
        }
    }
}

impl AsyncRead for ScriptedInput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Some(mut chunk) = self.steps.pop_front() {
            let n = chunk.len().min(buf.remaining());
            buf.put_slice(&chunk[..n]);
            if n < chunk.len() {
                let rest = chunk.split_off(n);
                self.steps.push_front(rest);
            }
        }
        Poll::Ready(Ok(()))
    }
}

/// Sink that records messages and refuses lines listed in `reject`.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<LogMessage>>,
    reject: Vec<&'static str>,
    closed: Mutex<bool>,
}

impl RecordingSink {
    pub fn rejecting(reject: Vec<&'static str>) -> Self {
        Self {
            reject,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<LogMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, message: &LogMessage) -> Result<(), SinkError> {
        if self.reject.iter().any(|line| message.line.as_ref() == line.as_bytes()) {
            return Err(SinkError::Other("rejected".into()));
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), SinkError> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// Sink whose watches are driven by the test through their publishers.
#[derive(Default)]
pub struct ScriptedReaderSink {
    publishers: Mutex<Vec<WatchPublisher>>,
    configs: Mutex<Vec<ReadConfig>>,
}

impl ScriptedReaderSink {
    pub async fn next_publisher(&self) -> WatchPublisher {
        let start = Instant::now();
        loop {
            if let Some(publisher) = self.publishers.lock().unwrap().pop() {
                return publisher;
            }
            if start.elapsed() >= Duration::from_secs(3) {
                panic!("no watch was started");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub fn configs(&self) -> Vec<ReadConfig> {
        self.configs.lock().unwrap().clone()
    }
}

impl LogSink for ScriptedReaderSink {
    fn log(&self, _message: &LogMessage) -> Result<(), SinkError> {
        Ok(())
    }

    fn reader(&self) -> Option<&dyn LogReader> {
        Some(self)
    }
}

impl LogReader for ScriptedReaderSink {
    fn read_logs(&self, config: ReadConfig) -> LogWatcher {
        let (publisher, watcher) = LogWatcher::channel(1);
        self.publishers.lock().unwrap().push(publisher);
        self.configs.lock().unwrap().push(config);
        watcher
    }
}

/// Factory that hands every stream the same sink.
pub struct SharedSinkFactory(pub Arc<dyn LogSink>);

impl SinkFactory for SharedSinkFactory {
    fn create(&self, _context: &SinkContext<'_>) -> Result<Arc<dyn LogSink>, SinkError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Factory that always fails.
pub struct FailingSinkFactory;

impl SinkFactory for FailingSinkFactory {
    fn create(&self, context: &SinkContext<'_>) -> Result<Arc<dyn LogSink>, SinkError> {
        Err(SinkError::Other(format!("no storage for {}", context.handle)))
    }
}

pub fn driver_with(
    config: DriverConfig,
    sinks: Arc<dyn SinkFactory>,
) -> (Arc<LogDriver<Arc<TestOpener>>>, Arc<TestOpener>) {
    let opener = Arc::new(TestOpener::default());
    let driver = LogDriver::with_opener(config, sinks, Arc::clone(&opener))
        .expect("driver should build");
    (Arc::new(driver), opener)
}
