/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The declared payload length exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The frame could not be decoded.
    #[error("corrupt frame: {0}")]
    FrameCorrupt(#[from] CorruptFrame),

    /// The stream ended cleanly on a frame boundary.
    #[error("end of stream")]
    EndOfStream,

    /// The entry could not be serialized.
    #[error("frame encode error: {0}")]
    Encode(#[from] prost::EncodeError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True for errors caused by bad bytes on the wire rather than by the
    /// underlying stream. The decoder has already skipped past them.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. } | Self::FrameCorrupt(_))
    }
}

/// Why a frame was rejected as corrupt.
#[derive(Debug, thiserror::Error)]
pub enum CorruptFrame {
    /// The payload is not a valid protobuf log entry.
    #[error("malformed payload: {0}")]
    Malformed(#[from] prost::DecodeError),

    /// The stream ended partway through a frame.
    #[error("truncated frame ({received} of {expected} bytes)")]
    Truncated { expected: usize, received: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
