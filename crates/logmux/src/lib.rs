//! Framed log stream multiplexer.
//!
//! logmux accepts length-prefixed protobuf log records from many producers
//! over named FIFOs, stores them per stream through pluggable sinks, and
//! streams stored records back per producer in the same wire format.
//!
//! # Crate Structure
//!
//! - [`transport`]: FIFO endpoints and the bounded read-back pipe
//! - [`frame`]: Length-prefixed protobuf framing
//! - [`driver`]: Stream registry, ingestion workers and read-back (behind `driver` feature)

/// Re-export transport types.
pub mod transport {
    pub use logmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use logmux_frame::*;
}

/// Re-export driver types (requires `driver` feature).
#[cfg(feature = "driver")]
pub mod driver {
    pub use logmux_driver::*;
}
