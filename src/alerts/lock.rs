//! Advisory file lock serializing alert processing across processes.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::AlertError;

/// Exclusive `flock` held until dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Blocks until an exclusive lock on `path` is held.
    ///
    /// The file is created if it does not exist.
    pub fn acquire(path: &Path) -> Result<Self, AlertError> {
        let lock_err = |source| AlertError::Lock {
            path: path.to_path_buf(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(lock_err)?;

        loop {
            // SAFETY: the descriptor is owned by `file` and open for the call.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc == 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(lock_err(err));
            }
        }

        debug!(path = %path.display(), "Lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Acquires the lock on the blocking thread pool.
    pub async fn acquire_async(path: &Path) -> Result<Self, AlertError> {
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::acquire(&owned))
            .await
            .map_err(|e| AlertError::Lock {
                path: path.to_path_buf(),
                source: io::Error::other(e),
            })?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // SAFETY: the descriptor is still owned by `self.file`.
        let rc = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if rc != 0 {
            warn!(
                path = %self.path.display(),
                error = %io::Error::last_os_error(),
                "Failed to release lock"
            );
        } else {
            debug!(path = %self.path.display(), "Lock released");
        }
    }
}
