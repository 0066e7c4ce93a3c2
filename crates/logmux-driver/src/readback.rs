use std::io;

use bytes::BytesMut;
use logmux_frame::{encode_frame, LogEntry};
use logmux_transport::PipeWriter;
use tracing::{debug, warn};

use crate::message::LogMessage;
use crate::sink::{LogWatcher, SinkError};

/// How a read-back stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadBackExit {
    /// The watch finished; the consumer saw a clean end of stream.
    Completed,
    /// The watch reported an error; the consumer saw it on its next read.
    WatchFailed,
    /// The consumer closed its end first.
    ConsumerGone,
}

enum Step {
    Message(LogMessage),
    Finished,
    Failed(SinkError),
    ConsumerGone,
}

/// Re-encode watched messages as frames into `writer` until the watch ends,
/// fails, or the consumer goes away. Always signals consumer-gone on exit.
pub(crate) async fn stream_to_pipe(
    mut watcher: LogWatcher,
    writer: PipeWriter,
    producer_id: String,
    max_payload: usize,
) -> ReadBackExit {
    let mut buf = BytesMut::new();

    let exit = loop {
        // Buffered messages drain before a pending error.
        let step = tokio::select! {
            biased;
            _ = writer.closed() => Step::ConsumerGone,
            received = watcher.messages.recv() => match received {
                Some(message) => Step::Message(message),
                None => match watcher.errors.try_recv() {
                    Ok(err) => Step::Failed(err),
                    Err(_) => Step::Finished,
                },
            },
            Some(err) = watcher.errors.recv() => Step::Failed(err),
        };

        match step {
            Step::Message(message) => {
                let entry = LogEntry::from(&message);
                if let Err(err) = encode_frame(&entry, &mut buf, max_payload) {
                    warn!(
                        id = %producer_id,
                        error = %err,
                        "skipping message that cannot be re-encoded"
                    );
                    buf.clear();
                    continue;
                }
                if writer.write(buf.split().freeze()).await.is_err() {
                    break ReadBackExit::ConsumerGone;
                }
            }
            Step::Finished => {
                writer.close();
                break ReadBackExit::Completed;
            }
            Step::Failed(err) => {
                debug!(id = %producer_id, error = %err, "log watch failed");
                writer.close_with_error(io::Error::other(err)).await;
                break ReadBackExit::WatchFailed;
            }
            Step::ConsumerGone => break ReadBackExit::ConsumerGone,
        }
    };

    debug!(id = %producer_id, ?exit, "read-back finished");
    watcher.consumer_gone();
    exit
}
