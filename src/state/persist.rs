//! Atomic JSON persistence for durable state documents
//!
//! Both the error ledger and the processed set are plain JSON documents that
//! are rewritten wholesale on every save. Writes go through a temp file in the
//! same directory and an atomic rename; a sibling `.lock` file guarded by
//! fd-lock serializes readers and writers.

use super::StateError;
use fd_lock::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maximum accepted state file size (64 MB). A ledger entry is roughly 400
/// bytes, so this leaves room for ~150k failure records.
pub const MAX_STATE_FILE_SIZE: u64 = 64 * 1024 * 1024;

fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("lock")
}

fn open_lock_file(path: &Path) -> Result<File, StateError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))
        .map_err(|e| StateError::LockError(format!("Failed to create lock file: {e}")))
}

/// Serialize `value` and atomically replace the file at `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StateError::IoError(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| StateError::SerializationError(e.to_string()))?;

    let mut lock = RwLock::new(open_lock_file(path)?);
    let _guard = lock
        .write()
        .map_err(|e| StateError::LockError(format!("Failed to acquire write lock: {e}")))?;

    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| StateError::IoError(format!("Failed to create temp file: {e}")))?;

    temp_file
        .write_all(json.as_bytes())
        .map_err(|e| StateError::IoError(format!("Failed to write to temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| StateError::IoError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| StateError::IoError(format!("Failed to sync temp file: {e}")))?;

    temp_file
        .persist(path)
        .map_err(|e| StateError::IoError(format!("Failed to persist temp file: {e}")))?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    debug!(path = %path.display(), bytes = json.len(), "State document written");
    Ok(())
}

/// Read and deserialize the JSON document at `path`.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    if !path.exists() {
        return Ok(None);
    }

    let lock = RwLock::new(open_lock_file(path)?);
    let _guard = lock
        .read()
        .map_err(|e| StateError::LockError(format!("Failed to acquire read lock: {e}")))?;

    let metadata = std::fs::metadata(path).map_err(|e| StateError::IoError(e.to_string()))?;
    if metadata.len() > MAX_STATE_FILE_SIZE {
        return Err(StateError::StateTooLarge {
            size: metadata.len(),
            max: MAX_STATE_FILE_SIZE,
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|e| StateError::IoError(e.to_string()))?;
    let value = serde_json::from_str(&contents)
        .map_err(|e| StateError::DeserializationError(e.to_string()))?;
    Ok(Some(value))
}

/// Load a document, degrading to `T::default()` on any failure.
///
/// Missing files are silent; unreadable or corrupt ones are logged.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path, what: &str) -> T {
    match read_json(path) {
        Ok(Some(value)) => value,
        Ok(None) => {
            debug!(path = %path.display(), "No {what} file found, starting empty");
            T::default()
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to load {what}, starting with an empty one"
            );
            T::default()
        }
    }
}
