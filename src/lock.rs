use crate::error::LockError;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Exclusive advisory lock that keeps a second master off the same lock file.
///
/// Holds the flock for as long as the guard lives; [`LockGuard::release`]
/// drops it early and may be called any number of times.
pub struct LockGuard {
    path: Option<PathBuf>,
    held: Option<Flock<File>>,
}

impl LockGuard {
    /// A guard that holds nothing. Used before `start` and when locking is disabled.
    pub fn disabled() -> Self {
        LockGuard { path: None, held: None }
    }



    /*
        @@@
        @acquire();
        . No path means locking is disabled: succeeds without any exclusivity.
        . Creates the lock file if missing, opens it for writing and tries a non-blocking exclusive flock.
        . EWOULDBLOCK maps to AlreadyHeld, every other failure to Io.
    */
    pub fn acquire(path: Option<&Path>) -> Result<Self, LockError> {
        let Some(path) = path else {
            return Ok(Self::disabled());
        };

        trace!(path = %path.display(), "Try to take the lock");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| LockError::Io { path: path.to_path_buf(), source })?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(held) => Ok(LockGuard {
                path: Some(path.to_path_buf()),
                held: Some(held),
            }),
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                Err(LockError::AlreadyHeld { path: path.to_path_buf() })
            }
            Err((_, errno)) => Err(LockError::Io {
                path: path.to_path_buf(),
                source: errno.into(),
            }),
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Unlocks, closes and unlinks the lock file. Returns `false` when there was nothing to release.
    pub fn release(&mut self) -> bool {
        let Some(held) = self.held.take() else {
            return false;
        };

        match held.unlock() {
            Ok(file) => drop(file),
            // closing the last descriptor drops the lock anyway
            Err((held, errno)) => {
                debug!(error = %errno, "flock unlock failed");
                drop(held);
            }
        }

        if let Some(path) = &self.path {
            if let Err(e) = fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "Cannot remove lock file");
            }
        }
        true
    }

    /// Closes the descriptor a worker inherited through fork without touching the lock.
    ///
    /// flock locks belong to the open file description, which the master still
    /// references, so only the worker's reference goes away.
    pub fn abandon(&mut self) {
        if let Some(held) = self.held.take() {
            let fd = held.as_raw_fd();
            std::mem::forget(held);
            let _ = nix::unistd::close(fd);
        }
        self.path = None;
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("path", &self.path)
            .field("held", &self.is_held())
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
