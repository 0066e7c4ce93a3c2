use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::unix::pipe;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::InputOpener;

/// Default permission mode for created FIFOs.
pub const DEFAULT_FIFO_MODE: u32 = 0o700;

const RELEASE_ATTEMPTS: usize = 20;
const RELEASE_INTERVAL: Duration = Duration::from_millis(25);

/// Opens stream handles as named FIFOs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoOpener;

impl InputOpener for FifoOpener {
    type Stream = pipe::Receiver;

    async fn open(&self, handle: &str, cancel: &CancellationToken) -> Result<Self::Stream> {
        open_fifo(handle, cancel).await
    }
}

/// Create a named FIFO at `path` with the given permission mode.
///
/// An existing FIFO at `path` is accepted as-is; any other existing file is
/// rejected with [`TransportError::NotFifo`].
pub fn create_fifo(path: impl AsRef<Path>, mode: u32) -> Result<()> {
    let path = path.as_ref();

    if let Ok(metadata) = std::fs::symlink_metadata(path) {
        if metadata.file_type().is_fifo() {
            return Ok(());
        }
        return Err(TransportError::NotFifo {
            path: path.to_path_buf(),
        });
    }

    let c_path =
        CString::new(path.as_os_str().as_bytes()).map_err(|_| TransportError::Create {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path contains an interior nul byte",
            ),
        })?;

    // SAFETY: `c_path` is a valid nul-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc != 0 {
        return Err(TransportError::Create {
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }

    debug!(?path, "created fifo");
    Ok(())
}

/// Open a FIFO for reading.
///
/// Like a plain `open(2)` with `O_RDONLY`, this waits until a writer opens the
/// other end. The wait runs on the blocking pool; cancelling `cancel` releases
/// it and returns [`TransportError::Cancelled`]. Dropping the returned future
/// releases the wait as well.
pub async fn open_fifo(
    path: impl AsRef<Path>,
    cancel: &CancellationToken,
) -> Result<pipe::Receiver> {
    let path = path.as_ref().to_path_buf();

    let wait = cancel.child_token();
    let _release_on_drop = wait.clone().drop_guard();
    let file = tokio::spawn(wait_for_writer(path.clone(), wait))
        .await
        .map_err(|err| TransportError::Io(std::io::Error::other(err)))??;

    if !file.metadata()?.file_type().is_fifo() {
        return Err(TransportError::NotFifo { path });
    }

    let receiver = pipe::Receiver::from_file(file).map_err(|source| TransportError::Open {
        path: path.clone(),
        source,
    })?;

    debug!(?path, "fifo opened for reading");
    Ok(receiver)
}

/// Blocking `open(2)` raced against `cancel`. Runs detached from the caller
/// so a cancelled wait is still released after the caller has gone.
async fn wait_for_writer(path: PathBuf, cancel: CancellationToken) -> Result<File> {
    let blocking_path = path.clone();
    let mut opening =
        tokio::task::spawn_blocking(move || OpenOptions::new().read(true).open(&blocking_path));

    let opened = tokio::select! {
        joined = &mut opening => joined,
        _ = cancel.cancelled() => {
            debug!(?path, "cancelling pending fifo open");
            // The blocking open may not have reached open(2) yet, so keep
            // nudging until it returns.
            for _ in 0..RELEASE_ATTEMPTS {
                release_pending_open(&path);
                if tokio::time::timeout(RELEASE_INTERVAL, &mut opening).await.is_ok() {
                    break;
                }
            }
            return Err(TransportError::Cancelled { path });
        }
    };

    opened
        .map_err(|err| TransportError::Io(std::io::Error::other(err)))?
        .map_err(|source| TransportError::Open { path, source })
}

/// Briefly open the write side so a reader blocked in `open(2)` returns.
fn release_pending_open(path: &Path) {
    match OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
    {
        Ok(_writer) => {}
        Err(err) => debug!(?path, %err, "no pending reader to release"),
    }
}
