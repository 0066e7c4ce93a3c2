use std::path::PathBuf;
use std::time::Duration;

use logmux_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};

/// Directory that receives per-producer log paths when none is supplied.
pub const DEFAULT_LOG_ROOT: &str = "/var/log/logmux";

/// Webhook posts allowed in flight by default.
pub const DEFAULT_WEBHOOK_MAX_IN_FLIGHT: usize = 64;

/// Runtime configuration for a [`LogDriver`](crate::LogDriver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Parent of derived log paths (`<log_root>/<producer_id>`).
    pub log_root: PathBuf,
    /// Largest accepted frame payload in bytes.
    pub max_frame_size: usize,
    /// Optional webhook that receives every stored message.
    pub webhook_url: Option<String>,
    /// Per-request timeout for webhook posts.
    pub webhook_timeout: Duration,
    /// Webhook posts allowed in flight at once; further messages skip the webhook.
    pub webhook_max_in_flight: usize,
    /// Frames buffered between a read-back task and its consumer.
    pub readback_buffer: usize,
    /// Stop a worker after this many decode errors in a row. `None` never stops.
    pub max_consecutive_errors: Option<u32>,
    /// Pause after an I/O error before reading again.
    pub io_error_backoff: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from(DEFAULT_LOG_ROOT),
            max_frame_size: DEFAULT_MAX_PAYLOAD,
            webhook_url: None,
            webhook_timeout: Duration::from_secs(5),
            webhook_max_in_flight: DEFAULT_WEBHOOK_MAX_IN_FLIGHT,
            readback_buffer: 64,
            max_consecutive_errors: None,
            io_error_backoff: Duration::from_millis(10),
        }
    }
}

impl DriverConfig {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_frame_size,
        }
    }

    /// Log path used for a producer that did not supply one.
    pub fn default_log_path(&self, producer_id: &str) -> PathBuf {
        self.log_root.join(producer_id)
    }
}
