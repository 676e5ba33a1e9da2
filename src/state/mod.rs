//! Durable state plumbing shared by the ledger and the processed set
//!
//! Provides atomic JSON writes with file locking and the whole-run lock.

pub mod lock;
pub mod persist;

pub use lock::RunLock;
pub use persist::{load_or_default, read_json, write_json_atomic};

use std::path::{Path, PathBuf};

/// File name of the error ledger inside the state directory
pub const LEDGER_FILENAME: &str = "errors.json";

/// File name of the processed set inside the state directory
pub const PROCESSED_FILENAME: &str = "processed.json";

/// Path of the error ledger document for a state directory
pub fn ledger_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LEDGER_FILENAME)
}

/// Path of the processed-set document for a state directory
pub fn processed_path(state_dir: &Path) -> PathBuf {
    state_dir.join(PROCESSED_FILENAME)
}

/// Errors related to durable state files
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
