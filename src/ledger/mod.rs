//! Error classification and the durable error ledger
//!
//! - [`classify`] maps failure text to an [`ErrorKind`] using ordered rules
//! - [`record`] defines records, kinds and statistics
//! - [`store`] owns the record set and its persistence

pub mod classify;
pub mod record;
pub mod store;

pub use classify::{classify, classify_error, classify_status};
pub use record::{ErrorDetails, ErrorKind, ErrorRecord, LedgerStatistics};
pub use store::{ErrorLedger, LedgerDocument};

use crate::state::StateError;

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Persisting the ledger failed
    #[error("ledger persistence error: {0}")]
    StateError(#[from] StateError),

    /// In-memory state disagrees with itself
    #[error("ledger inconsistency: {0}")]
    Inconsistent(String),
}
