//! Length-prefixed protobuf framing for log entries.
//!
//! Every log record travels as one frame:
//! - A 4-byte big-endian payload length
//! - A protobuf-encoded [`LogEntry`] of exactly that length
//!
//! Decoders bound allocation by a configured maximum payload size and
//! resynchronise after oversized or malformed frames, so one bad record never
//! poisons the rest of the stream.

#[cfg(feature = "async")]
pub mod async_reader;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_reader::AsyncFrameReader;
pub use codec::{
    encode_frame, FrameConfig, FrameDecoder, LogEntry, PartialLogEntryMetadata,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{CorruptFrame, FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
