//! Reconciliation of the processed set against the archive on disk
//!
//! The archive is the ground truth. Two passes:
//!
//! 1. Ids marked successful whose metadata is gone are unmarked, their
//!    directory is deleted and a `not_found` error is recorded.
//! 2. Directories holding metadata but absent from every bucket are marked
//!    successful and any stale error is cleared.
//!
//! Running it twice without touching the filesystem changes nothing the second
//! time.

use super::set::{Bucket, ProcessedSet};
use super::ProcessedError;
use crate::archive::LocalArchive;
use crate::ledger::{ErrorDetails, ErrorKind, ErrorLedger};
use serde::Serialize;
use tracing::{info, info_span, warn};

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Ids unmarked because their metadata is missing
    pub not_found: Vec<String>,
    /// Ids newly marked successful from the archive contents
    pub recovered: Vec<String>,
}

impl ReconcileReport {
    /// Whether nothing was changed
    pub fn is_noop(&self) -> bool {
        self.not_found.is_empty() && self.recovered.is_empty()
    }
}

/// Align `processed` and `ledger` with the contents of `archive`.
///
/// Mutates both stores in memory; the caller decides when to save them.
pub fn reconcile(
    archive: &LocalArchive,
    processed: &mut ProcessedSet,
    ledger: &mut ErrorLedger,
) -> Result<ReconcileReport, ProcessedError> {
    let _span = info_span!("reconcile", root = %archive.root().display()).entered();
    let mut report = ReconcileReport::default();

    for id in processed.ids(Bucket::Successful) {
        if archive.exists_local_metadata(&id) {
            continue;
        }
        warn!(id = %id, "Marked successful but metadata is missing");
        processed.remove(&id);
        archive.remove_item(&id)?;
        ledger.remove_error(&id)?;
        ledger.add_error(
            &id,
            ErrorKind::NotFound,
            ErrorDetails::message("metadata missing from archive during reconciliation")
                .with_file_path(archive.item_dir(&id)),
        )?;
        report.not_found.push(id);
    }

    for id in archive.list_item_ids()? {
        if processed.contains(&id) || !archive.exists_local_metadata(&id) {
            continue;
        }
        processed.mark(&id, Bucket::Successful);
        ledger.remove_error(&id)?;
        report.recovered.push(id);
    }

    info!(
        not_found = report.not_found.len(),
        recovered = report.recovered.len(),
        "Reconciliation finished"
    );
    Ok(report)
}
