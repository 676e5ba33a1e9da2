//! Durable error ledger
//!
//! One record per work item id, plus aggregate statistics kept in step with
//! every insert and removal. Persistence is either immediate (every mutation
//! rewrites the document) or deferred in batch mode until [`ErrorLedger::flush`].

use super::record::{ErrorDetails, ErrorKind, ErrorRecord, LedgerStatistics};
use super::LedgerError;
use crate::state::{load_or_default, write_json_atomic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk ledger document
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LedgerDocument {
    /// Records keyed by work item id
    #[serde(default)]
    pub errors: BTreeMap<String, ErrorRecord>,
    /// Aggregate counters
    #[serde(default)]
    pub statistics: LedgerStatistics,
}

/// Error ledger with optional deferred persistence
#[derive(Debug)]
pub struct ErrorLedger {
    path: Option<PathBuf>,
    document: LedgerDocument,
    batch_mode: bool,
    dirty: bool,
}

impl ErrorLedger {
    /// Ledger that never touches disk (tests, dry runs)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: LedgerDocument::default(),
            batch_mode: false,
            dirty: false,
        }
    }

    /// Load the ledger at `path`.
    ///
    /// A missing or corrupt file yields an empty ledger with zeroed
    /// statistics. Statistics that disagree with the loaded records are
    /// rebuilt from the records.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut document: LedgerDocument = load_or_default(&path, "error ledger");

        let derived = LedgerStatistics::from_records(document.errors.values());
        if derived != document.statistics {
            warn!(
                path = %path.display(),
                stored_total = document.statistics.total_errors,
                derived_total = derived.total_errors,
                "Ledger statistics out of sync with records, rebuilding"
            );
            document.statistics = derived;
        }

        info!(
            path = %path.display(),
            errors = document.errors.len(),
            "Error ledger loaded"
        );

        Self {
            path: Some(path),
            document,
            batch_mode: false,
            dirty: false,
        }
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether writes are currently deferred
    pub fn is_batch_mode(&self) -> bool {
        self.batch_mode
    }

    /// Whether there are mutations not yet written to disk
    pub fn has_pending_writes(&self) -> bool {
        self.dirty
    }

    /// Enable or disable deferred persistence.
    ///
    /// Leaving batch mode flushes any pending writes.
    pub fn set_batch_mode(&mut self, enabled: bool) -> Result<(), LedgerError> {
        debug!(enabled, "Ledger batch mode");
        self.batch_mode = enabled;
        if !enabled && self.dirty {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the document if anything changed since the last write
    pub fn flush(&mut self) -> Result<(), LedgerError> {
        if !self.dirty {
            return Ok(());
        }
        self.save()
    }

    /// Unconditionally write the document
    pub fn save(&mut self) -> Result<(), LedgerError> {
        if let Some(path) = &self.path {
            write_json_atomic(path, &self.document)?;
            debug!(
                path = %path.display(),
                errors = self.document.errors.len(),
                "Error ledger saved"
            );
        }
        self.dirty = false;
        Ok(())
    }

    fn changed(&mut self) -> Result<(), LedgerError> {
        self.dirty = true;
        if self.batch_mode {
            Ok(())
        } else {
            self.save()
        }
    }

    /// Record a failure for `id` now. See [`ErrorLedger::add_error_at`].
    pub fn add_error(
        &mut self,
        id: &str,
        kind: ErrorKind,
        details: ErrorDetails,
    ) -> Result<&ErrorRecord, LedgerError> {
        self.add_error_at(id, kind, details, Utc::now())
    }

    /// Record a failure for `id` at `timestamp`.
    ///
    /// Upserts the record: `retry_count` starts at 1 and grows by one on every
    /// call for the same id, whatever the kind. Statistics move the previous
    /// record out of its kind/date buckets and count the new one.
    pub fn add_error_at(
        &mut self,
        id: &str,
        kind: ErrorKind,
        details: ErrorDetails,
        timestamp: DateTime<Utc>,
    ) -> Result<&ErrorRecord, LedgerError> {
        let retry_count = match self.document.errors.get(id) {
            Some(previous) => {
                self.document
                    .statistics
                    .forget(previous.kind, previous.date());
                previous.retry_count.saturating_add(1)
            }
            None => 1,
        };

        let record = ErrorRecord {
            kind,
            timestamp,
            retry_count,
            details,
        };
        self.document.statistics.record(record.kind, record.date());
        self.document.errors.insert(id.to_string(), record);
        crate::metrics::record_error(kind);

        debug!(id = %id, kind = %kind, retry_count, "Error recorded");
        self.changed()?;

        self.document
            .errors
            .get(id)
            .ok_or_else(|| LedgerError::Inconsistent(format!("record for {id} vanished")))
    }

    /// Whether `id` has a record
    pub fn has_error(&self, id: &str) -> bool {
        self.document.errors.contains_key(id)
    }

    /// Record for `id`
    pub fn get_error(&self, id: &str) -> Option<&ErrorRecord> {
        self.document.errors.get(id)
    }

    /// Delete the record for `id`, returning it
    pub fn remove_error(&mut self, id: &str) -> Result<Option<ErrorRecord>, LedgerError> {
        let Some(record) = self.document.errors.remove(id) else {
            return Ok(None);
        };
        self.document.statistics.forget(record.kind, record.date());
        debug!(id = %id, kind = %record.kind, "Error cleared");
        self.changed()?;
        Ok(Some(record))
    }

    /// Records of one kind, ordered by id
    pub fn errors_by_kind(&self, kind: ErrorKind) -> Vec<(&str, &ErrorRecord)> {
        self.iter().filter(|(_, r)| r.kind == kind).collect()
    }

    /// Records with at least `min` recorded failures, ordered by id
    pub fn errors_by_retry_count(&self, min: u32) -> Vec<(&str, &ErrorRecord)> {
        self.iter().filter(|(_, r)| r.retry_count >= min).collect()
    }

    /// Drop every record and zero the statistics; returns how many were removed
    pub fn clear_all(&mut self) -> Result<usize, LedgerError> {
        let removed = self.document.errors.len();
        self.document = LedgerDocument::default();
        info!(removed, "Error ledger cleared");
        self.changed()?;
        Ok(removed)
    }

    /// Aggregate statistics
    pub fn statistics(&self) -> &LedgerStatistics {
        &self.document.statistics
    }

    /// All records ordered by id
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ErrorRecord)> {
        self.document.errors.iter().map(|(id, r)| (id.as_str(), r))
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.document.errors.len()
    }

    /// Whether the ledger has no records
    pub fn is_empty(&self) -> bool {
        self.document.errors.is_empty()
    }

    /// The whole document (for JSON output)
    pub fn document(&self) -> &LedgerDocument {
        &self.document
    }
}
