//! CLI error types and conversions

use crate::archive::ArchiveError;
use crate::downloader::DownloadError;
use crate::export::ExportError;
use crate::ledger::LedgerError;
use crate::processed::ProcessedError;
use crate::state::StateError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Export could not be read
    #[error("export error: {0}")]
    ExportError(#[from] ExportError),

    /// Run failed
    #[error("download error: {0}")]
    DownloadError(#[from] DownloadError),

    /// Ledger could not be persisted
    #[error("ledger error: {0}")]
    LedgerError(#[from] LedgerError),

    /// Processed set could not be updated
    #[error("processed set error: {0}")]
    ProcessedError(#[from] ProcessedError),

    /// State directory problem, including a held run lock
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    /// Archive access failed
    #[error("archive error: {0}")]
    ArchiveError(#[from] ArchiveError),

    /// Output could not be produced
    #[error("output error: {0}")]
    OutputError(String),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// The run stopped before its worklist was exhausted
    #[error("run halted: {0}")]
    RunHalted(String),

    /// Archive validation found problems
    #[error("{0} archive item(s) failed validation")]
    ValidationFailed(usize),
}
