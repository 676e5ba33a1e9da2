//! Whole-run driver
//!
//! Loads the durable stores, filters the worklist through the processed set,
//! drives the remaining items chunk by chunk through the orchestrator and
//! checkpoints both stores after every chunk.

use super::batch::BatchRunner;
use super::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_FETCH_CONCURRENCY, MAX_ITEM_RETRIES,
};
use super::limiter::ConcurrencyLimiter;
use super::orchestrator::{DownloadOrchestrator, ItemOutcome, SharedLedger, SharedProcessed};
use super::progress::{format_duration, BatchProgress};
use super::retry::RetryPolicy;
use super::DownloadError;
use crate::archive::LocalArchive;
use crate::fetcher::{MediaTransfer, MetadataFetcher};
use crate::ledger::ErrorLedger;
use crate::processed::{Bucket, ProcessedSet};
use crate::shutdown::{self, SharedShutdown, ShutdownCoordinator};
use crate::state;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};

/// Run-wide settings
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Simultaneous media transfers
    pub concurrency: usize,
    /// Simultaneous metadata fetches
    pub fetch_concurrency: usize,
    /// Items per chunk
    pub batch_size: usize,
    /// Recorded failures after which an item is skipped
    pub max_item_retries: u32,
    /// Metadata fetch escalation
    pub retry_policy: RetryPolicy,
    /// Re-attempt items in the `failed` bucket
    pub retry_failed: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            max_item_retries: MAX_ITEM_RETRIES,
            retry_policy: RetryPolicy::default(),
            retry_failed: false,
        }
    }
}

/// End-of-run totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Distinct ids in the worklist
    pub requested: usize,
    /// Skipped because they already reached a terminal outcome
    pub already_processed: usize,
    /// Handed to the orchestrator
    pub attempted: usize,
    /// All media on disk
    pub completed: usize,
    /// Metadata without media
    pub no_media: usize,
    /// Some media failed
    pub partial_failures: usize,
    /// Metadata could not be obtained or parsed
    pub metadata_failures: usize,
    /// Skipped because the retry budget is spent
    pub max_retry_exceeded: usize,
    /// Stopped mid-item by shutdown
    pub interrupted: usize,
    /// Never started because the run stopped early
    pub not_attempted: usize,
    /// Media files transferred
    pub files_downloaded: u64,
    /// Media files already present
    pub files_skipped: u64,
    /// Media files that failed
    pub files_failed: u64,
    /// Whether the run stopped early
    pub halted: bool,
    /// Why the run stopped early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    /// Wall-clock duration
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunSummary {
    fn absorb(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Completed(_) => self.completed += 1,
            ItemOutcome::PartialFailure(_) => self.partial_failures += 1,
            ItemOutcome::NoMedia => self.no_media += 1,
            ItemOutcome::MetadataFailed { .. } | ItemOutcome::Halted { .. } => {
                self.metadata_failures += 1
            }
            ItemOutcome::MaxRetriesExceeded { .. } => self.max_retry_exceeded += 1,
            ItemOutcome::Interrupted(_) => self.interrupted += 1,
        }
        if let Some(stats) = outcome.media_stats() {
            self.files_downloaded += u64::from(stats.downloaded);
            self.files_skipped += u64::from(stats.skipped);
            self.files_failed += u64::from(stats.failed);
        }
    }

    /// Whether anything failed in this run
    pub fn has_failures(&self) -> bool {
        self.partial_failures + self.metadata_failures > 0
    }

    /// Multi-line text summary
    pub fn format_human(&self) -> String {
        let mut lines = vec![
            format!("Run finished in {}", format_duration(self.elapsed)),
            format!(
                "Items: {} requested, {} already processed, {} attempted",
                self.requested, self.already_processed, self.attempted
            ),
            format!("  completed:          {}", self.completed),
            format!("  no media:           {}", self.no_media),
            format!("  partial failures:   {}", self.partial_failures),
            format!("  metadata failures:  {}", self.metadata_failures),
            format!("  max retry exceeded: {}", self.max_retry_exceeded),
        ];
        if self.interrupted > 0 || self.not_attempted > 0 {
            lines.push(format!("  interrupted:        {}", self.interrupted));
            lines.push(format!("  not attempted:      {}", self.not_attempted));
        }
        lines.push(format!(
            "Files: {} downloaded, {} already present, {} failed",
            self.files_downloaded, self.files_skipped, self.files_failed
        ));
        if self.halted {
            lines.push(format!(
                "Run halted: {}",
                self.halt_reason.as_deref().unwrap_or("shutdown requested")
            ));
        }
        lines.join("\n")
    }
}

type ProgressHook = Box<dyn Fn(&BatchProgress) + Send + Sync>;

/// Drives a whole run over a worklist
pub struct RunExecutor {
    orchestrator: DownloadOrchestrator,
    ledger: SharedLedger,
    processed: SharedProcessed,
    config: RunConfig,
    shutdown: SharedShutdown,
    on_progress: Option<ProgressHook>,
}

impl RunExecutor {
    /// Load the stores from `state_dir` and prepare a run over `archive`.
    ///
    /// Missing or corrupt state files start empty.
    pub fn open(
        archive: LocalArchive,
        state_dir: &Path,
        transfer: Arc<dyn MediaTransfer>,
        config: RunConfig,
    ) -> Self {
        let ledger = ErrorLedger::load(state::ledger_path(state_dir));
        let processed = ProcessedSet::load(state::processed_path(state_dir));
        Self::with_stores(archive, ledger, processed, transfer, config)
    }

    /// Prepare a run over already-loaded stores
    pub fn with_stores(
        archive: LocalArchive,
        ledger: ErrorLedger,
        processed: ProcessedSet,
        transfer: Arc<dyn MediaTransfer>,
        config: RunConfig,
    ) -> Self {
        let ledger = Arc::new(Mutex::new(ledger));
        let processed = Arc::new(Mutex::new(processed));
        let shutdown = shutdown::get_global_shutdown().unwrap_or_else(ShutdownCoordinator::shared);

        let orchestrator = DownloadOrchestrator::new(
            archive,
            ledger.clone(),
            processed.clone(),
            transfer,
            ConcurrencyLimiter::new(config.concurrency),
        )
        .with_fetch_limiter(ConcurrencyLimiter::new(config.fetch_concurrency))
        .with_retry_policy(config.retry_policy)
        .with_max_item_retries(config.max_item_retries)
        .with_shutdown(shutdown.clone());

        Self {
            orchestrator,
            ledger,
            processed,
            config,
            shutdown,
            on_progress: None,
        }
    }

    /// Fetch missing metadata with `fetcher`
    pub fn with_fetcher(mut self, fetcher: Arc<dyn MetadataFetcher>) -> Self {
        self.orchestrator = self.orchestrator.with_fetcher(fetcher);
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.orchestrator = self.orchestrator.with_shutdown(shutdown.clone());
        self.shutdown = shutdown;
        self
    }

    /// Observe progress after each chunk
    pub fn with_progress<F>(mut self, on_progress: F) -> Self
    where
        F: Fn(&BatchProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    /// The shared ledger
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// The shared processed set
    pub fn processed(&self) -> &SharedProcessed {
        &self.processed
    }

    /// Split `ids` into the worklist and the count already processed.
    /// Duplicate ids are dropped, keeping the first.
    async fn gate(&self, ids: &[String]) -> (Vec<String>, usize, usize) {
        let processed = self.processed.lock().await;
        let mut seen = HashSet::with_capacity(ids.len());
        let mut worklist = Vec::new();
        let mut already = 0;

        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match processed.bucket_of(id) {
                Some(Bucket::Successful) | Some(Bucket::NoMedia) => already += 1,
                Some(Bucket::Failed) if !self.config.retry_failed => already += 1,
                _ => worklist.push(id.clone()),
            }
        }
        (worklist, already, seen.len())
    }

    /// Flush the ledger and save the processed set
    pub async fn checkpoint(&self) -> Result<(), DownloadError> {
        self.ledger.lock().await.flush()?;
        self.processed.lock().await.save()?;
        Ok(())
    }

    /// Process every id in `ids` that has not reached a terminal outcome.
    pub async fn run(&self, ids: &[String]) -> Result<RunSummary, DownloadError> {
        let started = Instant::now();
        let span = info_span!("run", items = ids.len());

        async {
            self.ledger.lock().await.set_batch_mode(true)?;

            let (worklist, already_processed, requested) = self.gate(ids).await;
            info!(
                requested,
                already_processed,
                to_process = worklist.len(),
                concurrency = self.config.concurrency,
                batch_size = self.config.batch_size,
                "Starting run"
            );

            let runner = BatchRunner::new(self.config.batch_size).with_shutdown(self.shutdown.clone());
            let orchestrator = &self.orchestrator;
            let outcome = runner
                .process_batch(
                    &worklist,
                    |_, chunk| async move {
                        let outcomes = futures::future::join_all(
                            chunk.iter().map(|id| orchestrator.process_item(id)),
                        )
                        .await;
                        if let Err(e) = self.checkpoint().await {
                            error!(error = %e, "Checkpoint failed");
                        }
                        outcomes
                    },
                    |progress| {
                        info!("{}", progress.format_progress());
                        if let Some(hook) = &self.on_progress {
                            hook(progress);
                        }
                    },
                )
                .await;

            let mut summary = RunSummary {
                requested,
                already_processed,
                attempted: outcome.results.len(),
                not_attempted: worklist.len() - outcome.results.len(),
                ..RunSummary::default()
            };
            for item in &outcome.results {
                summary.absorb(item);
            }
            if self.shutdown.is_shutdown_requested() {
                summary.halted = true;
                summary.halt_reason = self.shutdown.reason();
                warn!(
                    reason = summary.halt_reason.as_deref().unwrap_or("shutdown requested"),
                    not_attempted = summary.not_attempted,
                    "Run stopped early"
                );
            }

            self.ledger.lock().await.set_batch_mode(false)?;
            self.checkpoint().await?;

            summary.elapsed = started.elapsed();
            info!(
                completed = summary.completed,
                no_media = summary.no_media,
                partial_failures = summary.partial_failures,
                metadata_failures = summary.metadata_failures,
                max_retry_exceeded = summary.max_retry_exceeded,
                files_downloaded = summary.files_downloaded,
                "Run finished"
            );
            Ok::<_, DownloadError>(summary)
        }
        .instrument(span)
        .await
    }
}
