use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use tracing::trace;

use crate::error::{CorruptFrame, FrameError, Result};

/// Frame header: big-endian payload length (4).
pub const HEADER_SIZE: usize = 4;

/// Default maximum payload size: 1,000,000 bytes.
pub const DEFAULT_MAX_PAYLOAD: usize = 1_000_000;

/// A single log record as carried on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct LogEntry {
    /// Output the line came from, e.g. `stdout` or `stderr`.
    #[prost(string, tag = "1")]
    pub source: String,
    /// Nanoseconds since the Unix epoch.
    #[prost(int64, tag = "2")]
    pub time_nano: i64,
    /// Raw line bytes, without the trailing newline.
    #[prost(bytes = "bytes", tag = "3")]
    pub line: Bytes,
    /// Whether this line is a fragment of a longer logical line.
    #[prost(bool, tag = "4")]
    pub partial: bool,
    /// Fragment bookkeeping for partial lines.
    #[prost(message, optional, tag = "5")]
    pub partial_log_metadata: Option<PartialLogEntryMetadata>,
}

/// Identifies one fragment of a line that was split across frames.
#[derive(Clone, PartialEq, Message)]
pub struct PartialLogEntryMetadata {
    /// Set on the final fragment.
    #[prost(bool, tag = "1")]
    pub last: bool,
    /// Shared by all fragments of the same logical line.
    #[prost(string, tag = "2")]
    pub id: String,
    /// Position of this fragment, starting at 1.
    #[prost(int32, tag = "3")]
    pub ordinal: i32,
}

impl LogEntry {
    /// Create a complete (non-partial) entry.
    pub fn new(source: impl Into<String>, line: impl Into<Bytes>, time_nano: i64) -> Self {
        Self {
            source: source.into(),
            time_nano,
            line: line.into(),
            partial: false,
            partial_log_metadata: None,
        }
    }

    /// The total wire size of this entry (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.encoded_len()
    }
}

/// Encode an entry into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────────────────┐
/// │ Length (4B BE)   │ Payload (protobuf LogEntry)  │
/// └──────────────────┴──────────────────────────────┘
/// ```
pub fn encode_frame(entry: &LogEntry, dst: &mut BytesMut, max_payload: usize) -> Result<()> {
    let max = max_payload.min(u32::MAX as usize);
    let payload_len = entry.encoded_len();
    if payload_len > max {
        return Err(FrameError::FrameTooLarge {
            size: payload_len,
            max,
        });
    }

    dst.reserve(HEADER_SIZE + payload_len);
    dst.put_u32(payload_len as u32);
    entry.encode(dst)?;
    Ok(())
}

/// Incremental frame decoder.
///
/// Tracks how many bytes of a rejected oversized frame are still in flight so
/// that the stream lines up again on the next frame boundary.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_payload: usize,
    discard: usize,
    discard_frame_len: usize,
}

impl FrameDecoder {
    /// Create a decoder that rejects payloads larger than `max_payload`.
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            discard: 0,
            discard_frame_len: 0,
        }
    }

    /// Decode one entry from `src`.
    ///
    /// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
    /// On success, or on a corrupt or oversized frame, the frame's bytes are
    /// consumed from the buffer.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LogEntry>> {
        if self.discard > 0 {
            let skipped = self.discard.min(src.len());
            src.advance(skipped);
            self.discard -= skipped;
            if self.discard > 0 {
                return Ok(None);
            }
        }

        let Some(payload_len) = peek_len(src) else {
            return Ok(None); // Need more data
        };

        if payload_len > self.max_payload {
            src.advance(HEADER_SIZE);
            let available = payload_len.min(src.len());
            src.advance(available);
            self.discard = payload_len - available;
            self.discard_frame_len = HEADER_SIZE + payload_len;
            trace!(
                size = payload_len,
                pending = self.discard,
                "discarding oversized frame"
            );
            return Err(FrameError::FrameTooLarge {
                size: payload_len,
                max: self.max_payload,
            });
        }

        let total = HEADER_SIZE + payload_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None); // Need more data
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(payload_len).freeze();
        let entry = LogEntry::decode(payload).map_err(CorruptFrame::from)?;
        Ok(Some(entry))
    }

    /// Account for the end of the stream.
    ///
    /// Succeeds when the stream stopped on a frame boundary. Leftover bytes
    /// of an unfinished frame are dropped and reported as truncated, and so
    /// is an oversized frame whose payload never fully arrived.
    pub fn finish(&mut self, src: &mut BytesMut) -> Result<()> {
        let missing = std::mem::take(&mut self.discard);
        if missing > 0 {
            let expected = self.discard_frame_len;
            src.clear();
            return Err(CorruptFrame::Truncated {
                expected,
                received: expected - missing,
            }
            .into());
        }

        if src.is_empty() {
            return Ok(());
        }

        let received = src.len();
        let expected = peek_len(src).map_or(HEADER_SIZE, |len| HEADER_SIZE + len);
        src.clear();
        Err(CorruptFrame::Truncated { expected, received }.into())
    }

    /// Update maximum payload size for subsequent frames.
    pub fn set_max_payload(&mut self, max_payload: usize) {
        self.max_payload = max_payload;
    }

    /// Current maximum payload size.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD)
    }
}

fn peek_len(src: &BytesMut) -> Option<usize> {
    if src.len() < HEADER_SIZE {
        return None;
    }
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&src[..HEADER_SIZE]);
    Some(u32::from_be_bytes(header) as usize)
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 1,000,000.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogEntry {
        LogEntry::new("stdout", Bytes::from_static(b"hello"), 1_700_000_000_123_456_789)
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let entry = sample();

        encode_frame(&entry, &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(buf.len(), entry.wire_size());

        let decoded = FrameDecoder::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, entry);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_roundtrip_with_partial_metadata() {
        let mut entry = sample();
        entry.partial = true;
        entry.partial_log_metadata = Some(PartialLogEntryMetadata {
            last: false,
            id: "frag-1".to_string(),
            ordinal: 2,
        });

        let mut buf = BytesMut::new();
        encode_frame(&entry, &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        let decoded = FrameDecoder::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_header_is_big_endian_payload_length() {
        let entry = sample();
        let mut buf = BytesMut::new();
        encode_frame(&entry, &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();

        let expected = (entry.encoded_len() as u32).to_be_bytes();
        assert_eq!(&buf[..HEADER_SIZE], &expected);
        assert_eq!(&buf[HEADER_SIZE..], entry.encode_to_vec().as_slice());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        let result = FrameDecoder::default().decode(&mut buf).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(&sample(), &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        let result = FrameDecoder::default().decode(&mut buf).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_oversized_frame_skipped_then_next_decodes() {
        let mut decoder = FrameDecoder::new(16);
        let big = LogEntry::new("stdout", vec![b'x'; 64], 1);
        let small = LogEntry::new("stderr", Bytes::from_static(b"ok"), 2);

        let mut wire = BytesMut::new();
        encode_frame(&big, &mut wire, DEFAULT_MAX_PAYLOAD).unwrap();
        encode_frame(&small, &mut wire, DEFAULT_MAX_PAYLOAD).unwrap();

        let err = decoder.decode(&mut wire).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { max: 16, .. }));
        assert_eq!(decoder.decode(&mut wire).unwrap().unwrap(), small);
    }

    #[test]
    fn test_oversized_frame_skipped_across_reads() {
        let mut decoder = FrameDecoder::new(16);
        let big = LogEntry::new("stdout", vec![b'x'; 64], 1);
        let small = LogEntry::new("stdout", Bytes::from_static(b"next"), 2);

        let mut wire = BytesMut::new();
        encode_frame(&big, &mut wire, DEFAULT_MAX_PAYLOAD).unwrap();
        encode_frame(&small, &mut wire, DEFAULT_MAX_PAYLOAD).unwrap();
        let mut rest = wire.split_off(HEADER_SIZE + 10);

        assert!(matches!(
            decoder.decode(&mut wire),
            Err(FrameError::FrameTooLarge { .. })
        ));
        assert!(wire.is_empty());

        assert_eq!(decoder.decode(&mut rest).unwrap().unwrap(), small);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_malformed_payload_is_consumed() {
        let mut wire = BytesMut::new();
        // Field 1 claims 5 bytes of string but only one follows.
        let body = [0x0A, 0x05, b'a'];
        wire.put_u32(body.len() as u32);
        wire.put_slice(&body);
        encode_frame(&sample(), &mut wire, DEFAULT_MAX_PAYLOAD).unwrap();

        let mut decoder = FrameDecoder::default();
        let err = decoder.decode(&mut wire).unwrap_err();
        assert!(matches!(
            err,
            FrameError::FrameCorrupt(CorruptFrame::Malformed(_))
        ));
        assert!(err.is_protocol_error());
        assert_eq!(decoder.decode(&mut wire).unwrap().unwrap(), sample());
    }

    #[test]
    fn test_finish_reports_truncated_frame() {
        let mut wire = BytesMut::new();
        wire.put_u32(50);
        wire.put_slice(&[0u8; 10]);

        let mut decoder = FrameDecoder::default();
        assert!(decoder.decode(&mut wire).unwrap().is_none());

        let err = decoder.finish(&mut wire).unwrap_err();
        assert!(matches!(
            err,
            FrameError::FrameCorrupt(CorruptFrame::Truncated {
                expected: 54,
                received: 14
            })
        ));
        assert!(wire.is_empty());
        decoder.finish(&mut wire).unwrap();
    }

    #[test]
    fn test_finish_reports_oversized_frame_cut_short() {
        let mut wire = BytesMut::new();
        wire.put_u32(100);
        wire.put_slice(&[0u8; 20]);

        let mut decoder = FrameDecoder::new(10);
        let err = decoder.decode(&mut wire).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 100, max: 10 }));
        assert!(wire.is_empty());

        let err = decoder.finish(&mut wire).unwrap_err();
        assert!(matches!(
            err,
            FrameError::FrameCorrupt(CorruptFrame::Truncated {
                expected: 104,
                received: 24
            })
        ));
        decoder.finish(&mut wire).unwrap();
    }

    #[test]
    fn test_empty_entry() {
        let mut buf = BytesMut::new();
        encode_frame(&LogEntry::default(), &mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(buf.as_ref(), &[0, 0, 0, 0]);

        let entry = FrameDecoder::default().decode(&mut buf).unwrap().unwrap();
        assert_eq!(entry, LogEntry::default());
    }

    #[test]
    fn test_encode_rejects_oversized_entry() {
        let mut buf = BytesMut::new();
        let entry = LogEntry::new("stdout", vec![0u8; 32], 0);

        let err = encode_frame(&entry, &mut buf, 8).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { max: 8, .. }));
        assert!(buf.is_empty());
    }
}
