use std::fmt;
use std::io;

use logmux_driver::{DriverError, RegistryError};
use logmux_frame::FrameError;
use logmux_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::BrokenPipe => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { source, .. }
        | TransportError::Create { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::NotFifo { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::FrameTooLarge { .. } | FrameError::FrameCorrupt(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::EndOfStream => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn driver_error(context: &str, err: DriverError) -> CliError {
    match err {
        DriverError::Open(err) => transport_error(context, err),
        DriverError::CreateDir { source, .. } => io_error(context, source),
        DriverError::Registry(RegistryError::AlreadyRegistered(_))
        | DriverError::Unsupported(_) => CliError::new(USAGE, format!("{context}: {err}")),
        DriverError::Notify(_) => CliError::new(USAGE, format!("{context}: {err}")),
        DriverError::Registry(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
