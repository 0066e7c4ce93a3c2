use std::path::PathBuf;

use logmux_transport::TransportError;

use crate::notify::NotifyError;
use crate::sink::SinkError;

/// Failures reported by the [`StreamRegistry`](crate::StreamRegistry).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("logger for {0:?} already exists")]
    AlreadyRegistered(String),

    #[error("logger does not exist for {0}")]
    NotFound(String),

    #[error("registration of {0:?} was stopped before it completed")]
    Stopped(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("error setting up logger dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("error creating log sink for {handle:?}: {source}")]
    Sink {
        handle: String,
        #[source]
        source: SinkError,
    },

    #[error("error opening logger input: {0}")]
    Open(#[source] TransportError),

    #[error("logger for {0} does not support reading")]
    Unsupported(String),

    #[error("webhook setup failed: {0}")]
    Notify(#[from] NotifyError),
}

pub type Result<T> = std::result::Result<T, DriverError>;
