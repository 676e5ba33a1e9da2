//! Download orchestration
//!
//! # Overview
//!
//! A run flows through these pieces, leaves first:
//!
//! 1. **Limiter**: [`limiter::ConcurrencyLimiter`] caps simultaneous media
//!    transfers across every item of a run
//! 2. **Retry policy**: [`retry::RetryPolicy`] waits out transient metadata
//!    failures and halts the run on auth failures
//! 3. **Orchestrator**: [`orchestrator::DownloadOrchestrator`] takes one item
//!    from ledger check to archived media
//! 4. **Batch runner**: [`batch::BatchRunner`] feeds the worklist through in
//!    fixed-size chunks with progress reporting
//! 5. **Executor**: [`executor::RunExecutor`] owns the stores, gates the
//!    worklist and checkpoints after every chunk
//!
//! # Quick Start
//!
//! ```no_run
//! use likes_archiver::archive::LocalArchive;
//! use likes_archiver::downloader::{RunConfig, RunExecutor};
//! use likes_archiver::fetcher::{HttpMetadataFetcher, HttpTransfer};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpMetadataFetcher::new("https://api.example.com/posts/{id}")?;
//! let executor = RunExecutor::open(
//!     LocalArchive::new("./archive"),
//!     "./.likes-archiver".as_ref(),
//!     Arc::new(HttpTransfer::new()),
//!     RunConfig::default(),
//! )
//! .with_fetcher(Arc::new(fetcher));
//!
//! let ids = vec!["1234567890".to_string()];
//! let summary = executor.run(&ids).await?;
//! assert_eq!(summary.requested, 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Per-file and per-item failures never surface as `Err`: they are recorded
//! in the error ledger and counted in the [`RunSummary`]. `Err` is reserved
//! for state that cannot be persisted.

pub mod batch;
pub mod config;
pub mod executor;
pub mod limiter;
pub mod orchestrator;
pub mod progress;
pub mod retry;

pub use batch::{BatchOutcome, BatchRunner};
pub use executor::{RunConfig, RunExecutor, RunSummary};
pub use limiter::{ConcurrencyLimiter, LimiterError};
pub use orchestrator::{DownloadOrchestrator, ItemOutcome, MediaStats};
pub use progress::BatchProgress;
pub use retry::{RetryDecision, RetryOutcome, RetryPolicy, RetryState};

use crate::ledger::LedgerError;
use crate::processed::ProcessedError;

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Limiter error
    #[error("limiter error: {0}")]
    LimiterError(#[from] LimiterError),

    /// Error ledger could not be persisted
    #[error("ledger error: {0}")]
    LedgerError(#[from] LedgerError),

    /// Processed set could not be persisted
    #[error("processed set error: {0}")]
    ProcessedError(#[from] ProcessedError),
}
