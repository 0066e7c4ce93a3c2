use std::path::PathBuf;

/// Errors that can occur while opening or creating stream endpoints.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the endpoint for reading.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to create the endpoint.
    #[error("failed to create fifo {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The path exists but is not a FIFO.
    #[error("{path} is not a fifo")]
    NotFifo { path: PathBuf },

    /// The open was abandoned before a writer connected.
    #[error("open of {path} cancelled")]
    Cancelled { path: PathBuf },

    /// An I/O error occurred on the endpoint.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
