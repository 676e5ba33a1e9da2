//! Processed-set tracking and archive reconciliation

pub mod reconcile;
pub mod set;

pub use reconcile::{reconcile, ReconcileReport};
pub use set::{Bucket, ProcessedDocument, ProcessedSet};

use crate::archive::ArchiveError;
use crate::ledger::LedgerError;
use crate::state::StateError;

/// Processed-set and reconciliation errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessedError {
    /// Persisting the processed set failed
    #[error("processed set persistence error: {0}")]
    StateError(#[from] StateError),

    /// Archive access failed
    #[error("archive error: {0}")]
    ArchiveError(#[from] ArchiveError),

    /// Ledger update failed
    #[error("ledger error: {0}")]
    LedgerError(#[from] LedgerError),
}
