//! Advisory inter-process lock on a sibling lock file.
//!
//! The lock is the existence of `<file>.lock`, created with
//! exclusive-create semantics; removing the file releases it. A process
//! that crashes while holding the lock leaves the file behind, and the jar
//! does not break such stale locks: acquisition gives up with
//! [`StoreError::LockContended`] after a bounded wait instead.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{trace, warn};

use super::StoreError;

/// Pause between acquisition attempts while the lock is contended.
const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Give up and report contention after this long.
const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Holds the exclusive advisory lock for a cookie file; releases on drop.
#[derive(Debug)]
pub(crate) struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Acquires the lock guarding `target`, spinning with a short sleep
    /// while another holder exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockContended`] when the lock stays held past
    /// the bounded wait, or [`StoreError::Io`] when the lock file cannot
    /// be created for any other reason.
    pub fn acquire(target: &Path) -> Result<Self, StoreError> {
        let path = lock_path(target);
        let deadline = Instant::now() + WAIT_TIMEOUT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::LockContended { path });
                    }
                    trace!(path = %path.display(), "cookie file lock contended");
                    thread::sleep(RETRY_DELAY);
                }
                Err(err) => return Err(StoreError::Io(err)),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(
                path = %self.path.display(),
                error = %err,
                "failed to release cookie file lock"
            );
        }
    }
}

/// Returns the sibling lock file path for a cookie file.
fn lock_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}
