//! Canonical in-memory form of a log record.
//!
//! Every decoded [`LogEntry`] is mapped to a [`LogMessage`] before it reaches
//! a sink, and read-back maps it the other way when re-encoding.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use logmux_frame::{LogEntry, PartialLogEntryMetadata};
use serde::{Serialize, Serializer};

/// A single stored log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogMessage {
    /// Raw line bytes. Serialized as lossy UTF-8.
    #[serde(serialize_with = "serialize_line")]
    pub line: Bytes,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    /// Present only when the record is a fragment of a longer line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<PartialMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialMetadata {
    pub id: String,
    pub last: bool,
    pub ordinal: i32,
}

impl LogMessage {
    pub fn new(
        source: impl Into<String>,
        line: impl Into<Bytes>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            line: line.into(),
            source: source.into(),
            timestamp,
            partial: None,
        }
    }

    pub fn with_partial(mut self, partial: PartialMetadata) -> Self {
        self.partial = Some(partial);
        self
    }

    /// Timestamp as nanoseconds since the epoch, saturating outside the i64 range.
    pub fn timestamp_nanos(&self) -> i64 {
        self.timestamp.timestamp_nanos_opt().unwrap_or(if self.timestamp.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        })
    }
}

impl From<LogEntry> for LogMessage {
    fn from(entry: LogEntry) -> Self {
        Self {
            line: entry.line,
            source: entry.source,
            timestamp: DateTime::from_timestamp_nanos(entry.time_nano),
            partial: entry.partial_log_metadata.map(PartialMetadata::from),
        }
    }
}

impl From<&LogMessage> for LogEntry {
    fn from(message: &LogMessage) -> Self {
        Self {
            source: message.source.clone(),
            time_nano: message.timestamp_nanos(),
            line: message.line.clone(),
            partial: message.partial.is_some(),
            partial_log_metadata: message.partial.as_ref().map(PartialLogEntryMetadata::from),
        }
    }
}

impl From<PartialLogEntryMetadata> for PartialMetadata {
    fn from(meta: PartialLogEntryMetadata) -> Self {
        Self {
            id: meta.id,
            last: meta.last,
            ordinal: meta.ordinal,
        }
    }
}

impl From<&PartialMetadata> for PartialLogEntryMetadata {
    fn from(meta: &PartialMetadata) -> Self {
        Self {
            last: meta.last,
            id: meta.id.clone(),
            ordinal: meta.ordinal,
        }
    }
}

fn serialize_line<S: Serializer>(line: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(line))
}
