//! Per-record exclusive locks.
//!
//! Every read-modify-write of a session runs while holding an advisory
//! `flock` on `sessions/<id>.lock`. The lock file is separate from the data
//! file, because the data file is replaced by rename on every save and a lock
//! on a replaced inode would protect nothing.
//!
//! # Semantics
//!
//! - `flock` locks belong to the open file description, so two threads of one
//!   process that each call [`RecordLock::acquire`] exclude each other just like
//!   two processes do.
//! - Acquisition polls `LOCK_EX | LOCK_NB` with exponential backoff
//!   (1ms → 100ms) and gives up with [`StoreError::LockBusy`] after the timeout.
//! - The kernel drops the lock if the holder dies, so a crashed writer never
//!   leaves a session permanently locked.
//! - [`RecordLock`] releases in `Drop`, which covers early returns, `?`, and panics.
//!
//! Locks are not reentrant. Acquiring the same id twice on one thread waits
//! for itself until the timeout.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{Result, StoreError};

/// Default bound on how long a writer waits for a busy record.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const INITIAL_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// An exclusive lock on one named resource, held until dropped.
#[derive(Debug)]
pub struct RecordLock {
    file: File,
    path: PathBuf,
}

impl RecordLock {
    /// Blocks up to `timeout` for exclusive access to `path`.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let file = open_lock_file(path)?;
        let start = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if try_flock(&file, path)? {
                return Ok(RecordLock {
                    file,
                    path: path.to_path_buf(),
                });
            }

            let waited = start.elapsed();
            if waited >= timeout {
                tracing::warn!(
                    lock = %path.display(),
                    waited_ms = waited.as_millis() as u64,
                    "Gave up waiting for record lock"
                );
                return Err(StoreError::LockBusy {
                    resource: path.display().to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }

            std::thread::sleep(backoff.min(timeout.saturating_sub(waited)));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Takes the lock only if it is free right now.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        if try_flock(&file, path)? {
            Ok(Some(RecordLock {
                file,
                path: path.to_path_buf(),
            }))
        } else {
            Ok(None)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| StoreError::io(format!("opening lock file {}", path.display()), e))
}

/// `Ok(true)` if acquired, `Ok(false)` if another holder has it.
#[cfg(unix)]
fn try_flock(file: &File, path: &Path) -> Result<bool> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the fd comes from a File that outlives this call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(code) if code == libc::EWOULDBLOCK || code == libc::EAGAIN => Ok(false),
        Some(code) if code == libc::EINTR => Ok(false),
        _ => Err(StoreError::io(format!("flock {}", path.display()), err)),
    }
}

#[cfg(not(unix))]
fn try_flock(_file: &File, path: &Path) -> Result<bool> {
    Err(StoreError::Unsupported(format!(
        "record locking for {}",
        path.display()
    )))
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;

    // SAFETY: same fd as above; closing the File would also release it.
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}
