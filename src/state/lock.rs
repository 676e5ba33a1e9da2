//! Whole-run advisory lock
//!
//! Only one `run` or `reconcile` may own a state directory at a time. Open the
//! lock with [`RunLock::open`] and keep the guard from [`RunLock::try_guard`]
//! alive for the duration of the command.

use super::StateError;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::Path;

/// File name of the run lock inside the state directory
pub const RUN_LOCK_FILENAME: &str = "run.lock";

/// Advisory lock file for a state directory
pub struct RunLock {
    lock: RwLock<File>,
}

impl RunLock {
    /// Open (creating if needed) the lock file in `state_dir`.
    pub fn open(state_dir: &Path) -> Result<Self, StateError> {
        std::fs::create_dir_all(state_dir).map_err(|e| StateError::IoError(e.to_string()))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(state_dir.join(RUN_LOCK_FILENAME))
            .map_err(|e| StateError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            lock: RwLock::new(file),
        })
    }

    /// Take the exclusive lock without blocking.
    ///
    /// Returns an error immediately if another process holds it. The lock is
    /// released when the guard is dropped.
    pub fn try_guard(&mut self) -> Result<RwLockWriteGuard<'_, File>, StateError> {
        self.lock.try_write().map_err(|e| {
            StateError::LockError(format!("state directory is in use by another run: {e}"))
        })
    }
}
