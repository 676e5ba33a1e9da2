//! Per-item download logic
//!
//! For one work item the orchestrator:
//!
//! 1. skips it outright when the ledger shows `max_item_retries` failures
//! 2. fetches its metadata document if none is archived yet (retry policy
//!    applies here; an auth failure halts the run)
//! 3. reads the document, enumerates media and selects the best video variant
//! 4. dispatches one transfer per destination not already on disk, all
//!    through the shared [`ConcurrencyLimiter`]
//! 5. records every failed transfer in the ledger and the item's terminal
//!    outcome in the processed set
//!
//! Transfers write to a `.part` file that is renamed into place on success, so
//! an interrupted download never looks like a finished one.

use super::limiter::ConcurrencyLimiter;
use super::retry::{RetryOutcome, RetryPolicy};
use crate::archive::{ArchiveError, LocalArchive};
use crate::fetcher::{FetchFailure, MediaTransfer, MetadataFetcher};
use crate::ledger::{ErrorDetails, ErrorKind, ErrorLedger};
use crate::processed::{Bucket, ProcessedSet};
use crate::shutdown::{ShutdownCoordinator, SharedShutdown};
use crate::{MediaEntry, MediaKind};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Ledger shared between concurrently processed items
pub type SharedLedger = Arc<Mutex<ErrorLedger>>;

/// Processed set shared between concurrently processed items
pub type SharedProcessed = Arc<Mutex<ProcessedSet>>;

/// File counts for one item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MediaStats {
    /// Files transferred in this run
    pub downloaded: u32,
    /// Files already present on disk
    pub skipped: u32,
    /// Files that failed
    pub failed: u32,
}

/// Terminal (or interrupted) outcome of processing one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Every media file is on disk
    Completed(MediaStats),
    /// Some media files failed
    PartialFailure(MediaStats),
    /// Metadata has no media
    NoMedia,
    /// Metadata could not be fetched, read or parsed
    MetadataFailed {
        /// Classification of the failure
        kind: ErrorKind,
    },
    /// Retry budget spent in earlier runs; nothing attempted
    MaxRetriesExceeded {
        /// Failures on record
        retry_count: u32,
    },
    /// Fatal failure; the run is halting
    Halted {
        /// Classification of the failure
        kind: ErrorKind,
    },
    /// Shutdown stopped the item before it finished
    Interrupted(MediaStats),
}

impl ItemOutcome {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOutcome::Completed(_) => "completed",
            ItemOutcome::PartialFailure(_) => "partial_failure",
            ItemOutcome::NoMedia => "no_media",
            ItemOutcome::MetadataFailed { .. } => "metadata_failed",
            ItemOutcome::MaxRetriesExceeded { .. } => "max_retry_exceeded",
            ItemOutcome::Halted { .. } => "halted",
            ItemOutcome::Interrupted(_) => "interrupted",
        }
    }

    /// File counts, when media was enumerated
    pub fn media_stats(&self) -> Option<MediaStats> {
        match self {
            ItemOutcome::Completed(stats)
            | ItemOutcome::PartialFailure(stats)
            | ItemOutcome::Interrupted(stats) => Some(*stats),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct PlannedTransfer {
    url: String,
    dest: PathBuf,
    media_kind: MediaKind,
    bitrate: Option<u64>,
    role: &'static str,
}

#[derive(Debug, Clone)]
struct TransferFailure {
    kind: ErrorKind,
    details: ErrorDetails,
}

#[derive(Debug)]
enum TransferResult {
    Downloaded,
    Skipped,
    Cancelled,
    Failed(TransferFailure),
}

/// Path a transfer streams into before it is renamed to `dest`
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial file"),
    }
}

/// Destination currently being written by some task
struct DestinationClaim<'a> {
    claims: &'a std::sync::Mutex<HashSet<PathBuf>>,
    path: PathBuf,
}

impl Drop for DestinationClaim<'_> {
    fn drop(&mut self) {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.remove(&self.path);
    }
}

/// Per-item download logic shared by every item of a run
pub struct DownloadOrchestrator {
    archive: LocalArchive,
    ledger: SharedLedger,
    processed: SharedProcessed,
    transfer: Arc<dyn MediaTransfer>,
    fetcher: Option<Arc<dyn MetadataFetcher>>,
    limiter: ConcurrencyLimiter,
    fetch_limiter: ConcurrencyLimiter,
    retry_policy: RetryPolicy,
    max_item_retries: u32,
    shutdown: SharedShutdown,
    claims: std::sync::Mutex<HashSet<PathBuf>>,
}

impl DownloadOrchestrator {
    /// Orchestrator over `archive` using the given stores and transfer
    pub fn new(
        archive: LocalArchive,
        ledger: SharedLedger,
        processed: SharedProcessed,
        transfer: Arc<dyn MediaTransfer>,
        limiter: ConcurrencyLimiter,
    ) -> Self {
        Self {
            archive,
            ledger,
            processed,
            transfer,
            fetcher: None,
            limiter,
            fetch_limiter: ConcurrencyLimiter::new(super::config::DEFAULT_FETCH_CONCURRENCY),
            retry_policy: RetryPolicy::default(),
            max_item_retries: super::config::MAX_ITEM_RETRIES,
            shutdown: ShutdownCoordinator::shared(),
            claims: std::sync::Mutex::new(HashSet::new()),
        }
    }

    /// Fetch missing metadata documents with `fetcher`
    pub fn with_fetcher(mut self, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Gate for metadata fetch attempts. Retry waits happen outside it.
    pub fn with_fetch_limiter(mut self, limiter: ConcurrencyLimiter) -> Self {
        self.fetch_limiter = limiter;
        self
    }

    /// Retry policy for metadata fetches
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Recorded failures after which an item is skipped
    pub fn with_max_item_retries(mut self, max: u32) -> Self {
        self.max_item_retries = max;
        self
    }

    /// Shutdown handle observed between steps and requested on auth failure
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// The archive being written
    pub fn archive(&self) -> &LocalArchive {
        &self.archive
    }

    /// The shared limiter
    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    /// Process one work item to an outcome. Never fails: problems are
    /// recorded in the ledger and reflected in the outcome.
    pub async fn process_item(&self, id: &str) -> ItemOutcome {
        let outcome = self
            .process_item_inner(id)
            .instrument(info_span!("item", id = %id))
            .await;
        crate::metrics::record_item(outcome.as_str());
        outcome
    }

    async fn process_item_inner(&self, id: &str) -> ItemOutcome {
        let prior_failures = self.ledger.lock().await.get_error(id).map(|r| r.retry_count);
        if let Some(retry_count) = prior_failures {
            if retry_count >= self.max_item_retries {
                info!(id = %id, retry_count, "Max retries exceeded, skipping");
                self.mark(id, Bucket::Failed).await;
                return ItemOutcome::MaxRetriesExceeded { retry_count };
            }
            debug!(id = %id, retry_count, "Retrying previously failed item");
        }

        if self.shutdown.is_shutdown_requested() {
            return ItemOutcome::Interrupted(MediaStats::default());
        }

        if let Err(outcome) = self.ensure_metadata(id).await {
            return outcome;
        }

        let document = match self.archive.read_metadata(id) {
            Ok(document) => document,
            Err(e) => {
                let kind = match e {
                    ArchiveError::MetadataParse { .. } => ErrorKind::JsonParseError,
                    _ => ErrorKind::DownloadFailed,
                };
                self.record_failure(id, kind, ErrorDetails::message(e.to_string()))
                    .await;
                self.mark(id, Bucket::Failed).await;
                return ItemOutcome::MetadataFailed { kind };
            }
        };

        let media = match document.media() {
            Some(media) if !media.is_empty() => media,
            _ => {
                debug!(id = %id, "No media");
                self.clear_error(id).await;
                self.mark(id, Bucket::NoMedia).await;
                return ItemOutcome::NoMedia;
            }
        };

        let (planned, invalid) = self.plan_transfers(id, media);
        let results = futures::future::join_all(
            planned.into_iter().map(|transfer| self.dispatch(transfer)),
        )
        .await;

        let mut stats = MediaStats::default();
        let mut cancelled = false;
        let mut failures = invalid;
        for result in results {
            match result {
                TransferResult::Downloaded => stats.downloaded += 1,
                TransferResult::Skipped => stats.skipped += 1,
                TransferResult::Cancelled => cancelled = true,
                TransferResult::Failed(failure) => failures.push(failure),
            }
        }
        stats.failed = failures.len() as u32;

        for failure in failures {
            self.record_failure(id, failure.kind, failure.details).await;
        }

        if stats.failed > 0 {
            self.mark(id, Bucket::Failed).await;
            ItemOutcome::PartialFailure(stats)
        } else if cancelled {
            ItemOutcome::Interrupted(stats)
        } else {
            self.clear_error(id).await;
            self.mark(id, Bucket::Successful).await;
            debug!(
                id = %id,
                downloaded = stats.downloaded,
                skipped = stats.skipped,
                "Item complete"
            );
            ItemOutcome::Completed(stats)
        }
    }

    /// Make sure a metadata document is archived, fetching it if needed.
    async fn ensure_metadata(&self, id: &str) -> Result<(), ItemOutcome> {
        if self.archive.exists_local_metadata(id) {
            return Ok(());
        }
        let Some(fetcher) = self.fetcher.as_deref() else {
            return Ok(());
        };

        let fetch_limiter = &self.fetch_limiter;
        let outcome = self
            .retry_policy
            .run(id, Some(&self.shutdown), move || async move {
                fetch_limiter
                    .run(fetcher.fetch(id))
                    .await
                    .unwrap_or_else(|e| Err(FetchFailure::new(e.to_string())))
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, retries } => {
                if retries > 0 {
                    info!(id = %id, retries, "Metadata fetched after retries");
                }
                if let Err(e) = self.archive.write_metadata(id, &value) {
                    let kind = ErrorKind::DownloadFailed;
                    self.record_failure(id, kind, ErrorDetails::message(e.to_string()))
                        .await;
                    self.mark(id, Bucket::Failed).await;
                    return Err(ItemOutcome::MetadataFailed { kind });
                }
                Ok(())
            }
            RetryOutcome::Failed {
                failure,
                kind,
                retries,
            } => {
                let details = fetch_details(&failure).with_extra("fetch_retries", retries);
                self.record_failure(id, kind, details).await;
                self.mark(id, Bucket::Failed).await;
                Err(ItemOutcome::MetadataFailed { kind })
            }
            RetryOutcome::Halted { failure, kind } => {
                self.record_failure(id, kind, fetch_details(&failure)).await;
                error!(id = %id, kind = %kind, "Halting run: {}", failure.message);
                self.shutdown
                    .request_shutdown_with_reason(format!("{kind} while fetching {id}: {failure}"));
                Err(ItemOutcome::Halted { kind })
            }
            RetryOutcome::Interrupted { failure, kind } => {
                // Operator interrupts do not spend the item's retry budget
                info!(id = %id, kind = %kind, "Metadata fetch interrupted: {}", failure.message);
                Err(ItemOutcome::Interrupted(MediaStats::default()))
            }
        }
    }

    /// Destinations to fetch for an item, in listed order, plus entries that
    /// cannot be downloaded at all.
    fn plan_transfers(
        &self,
        id: &str,
        media: &[MediaEntry],
    ) -> (Vec<PlannedTransfer>, Vec<TransferFailure>) {
        let mut planned = Vec::new();
        let mut invalid = Vec::new();
        let mut seen = HashSet::new();

        for (index, entry) in media.iter().enumerate() {
            let mut sources: Vec<(&str, Option<u64>, &'static str)> = Vec::new();
            match entry.kind {
                MediaKind::Photo => {
                    if let Some(url) = entry.primary_url() {
                        sources.push((url, None, "media"));
                    }
                }
                MediaKind::Video => {
                    if let Some(variant) = entry.best_variant() {
                        sources.push((variant.url.as_str(), variant.bitrate, "media"));
                    }
                    if let Some(cover) = entry.cover() {
                        sources.push((cover, None, "cover"));
                    }
                }
                MediaKind::Unknown => {
                    warn!(id = %id, index, "Skipping media entry of unknown type");
                    continue;
                }
            }

            if sources.is_empty() {
                invalid.push(TransferFailure {
                    kind: ErrorKind::MediaDownloadFailed,
                    details: ErrorDetails::message(format!("{} entry {index} has no URL", entry.kind))
                        .with_media_kind(entry.kind),
                });
                continue;
            }

            for (url, bitrate, role) in sources {
                match self.archive.media_path(id, url) {
                    Ok(dest) => {
                        if seen.insert(dest.clone()) {
                            planned.push(PlannedTransfer {
                                url: url.to_string(),
                                dest,
                                media_kind: entry.kind,
                                bitrate,
                                role,
                            });
                        }
                    }
                    Err(e) => invalid.push(TransferFailure {
                        kind: ErrorKind::MediaDownloadFailed,
                        details: ErrorDetails::message(e.to_string())
                            .with_url(url)
                            .with_media_kind(entry.kind)
                            .with_extra("role", role),
                    }),
                }
            }
        }

        (planned, invalid)
    }

    fn claim(&self, path: &Path) -> Option<DestinationClaim<'_>> {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.insert(path.to_path_buf()).then(|| DestinationClaim {
            claims: &self.claims,
            path: path.to_path_buf(),
        })
    }

    async fn dispatch(&self, transfer: PlannedTransfer) -> TransferResult {
        if transfer.dest.exists() {
            debug!(path = %transfer.dest.display(), "Already downloaded, skipping");
            return TransferResult::Skipped;
        }

        let Some(_claim) = self.claim(&transfer.dest) else {
            debug!(path = %transfer.dest.display(), "Another task is downloading this file");
            return TransferResult::Skipped;
        };

        let result = self
            .limiter
            .run(async {
                // Admission may come long after dispatch
                if self.shutdown.is_shutdown_requested() {
                    return TransferResult::Cancelled;
                }
                if transfer.dest.exists() {
                    return TransferResult::Skipped;
                }
                self.transfer_file(&transfer).await
            })
            .await;

        result.unwrap_or_else(|e| {
            TransferResult::Failed(TransferFailure {
                kind: ErrorKind::UnknownError,
                details: ErrorDetails::message(e.to_string()).with_url(&transfer.url),
            })
        })
    }

    async fn transfer_file(&self, transfer: &PlannedTransfer) -> TransferResult {
        let part = partial_path(&transfer.dest);
        let started = Instant::now();

        let failure = match self.transfer.transfer(&transfer.url, &part).await {
            Ok(bytes) => match tokio::fs::rename(&part, &transfer.dest).await {
                Ok(()) => {
                    crate::metrics::record_transfer_success(bytes, started.elapsed());
                    debug!(
                        url = %transfer.url,
                        path = %transfer.dest.display(),
                        bytes,
                        "Downloaded"
                    );
                    return TransferResult::Downloaded;
                }
                Err(e) => FetchFailure::new(format!(
                    "failed to move {} into place: {e}",
                    transfer.dest.display()
                )),
            },
            Err(failure) => failure,
        };

        remove_partial(&part).await;
        let kind = failure.kind();
        crate::metrics::record_transfer_failure(kind);

        let mut details = fetch_details(&failure)
            .with_url(&transfer.url)
            .with_media_kind(transfer.media_kind)
            .with_file_path(&transfer.dest)
            .with_bitrate(transfer.bitrate);
        if transfer.role != "media" {
            details = details.with_extra("role", transfer.role);
        }
        TransferResult::Failed(TransferFailure { kind, details })
    }

    async fn record_failure(&self, id: &str, kind: ErrorKind, details: ErrorDetails) {
        warn!(
            id = %id,
            kind = %kind,
            url = details.url.as_deref().unwrap_or("-"),
            "{}",
            details.message.as_deref().unwrap_or("failure recorded")
        );
        if let Err(e) = self.ledger.lock().await.add_error(id, kind, details) {
            error!(id = %id, error = %e, "Failed to record error");
        }
    }

    async fn clear_error(&self, id: &str) {
        if let Err(e) = self.ledger.lock().await.remove_error(id) {
            error!(id = %id, error = %e, "Failed to clear error record");
        }
    }

    async fn mark(&self, id: &str, bucket: Bucket) {
        self.processed.lock().await.mark(id, bucket);
    }
}

fn fetch_details(failure: &FetchFailure) -> ErrorDetails {
    let details = ErrorDetails::message(&failure.message).with_status(failure.status);
    match &failure.raw_output {
        Some(raw) => details.with_extra("raw_output", raw.trim().to_string()),
        None => details,
    }
}
