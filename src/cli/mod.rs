//! CLI command implementations

pub mod error;
pub mod errors;
pub mod reconcile;
pub mod run;
pub mod validate;

pub use error::CliError;
pub use errors::ErrorsCommand;
pub use reconcile::ReconcileCommand;
pub use run::RunArgs;
pub use validate::ValidateCommand;

use crate::archive::LocalArchive;
use crate::ledger::ErrorLedger;
use crate::processed::ProcessedSet;
use crate::state::{self, RunLock};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Likes Archiver CLI
#[derive(Parser, Debug)]
#[command(name = "likes-archiver")]
#[command(about = "Archive liked posts and their media with resumable, audited runs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Directory holding the error ledger, processed set and run lock
    #[arg(long, global = true, default_value = ".likes-archiver")]
    pub state_dir: PathBuf,

    /// Archive root; one directory per liked post
    #[arg(long, global = true, default_value = "archive")]
    pub archive_dir: PathBuf,
}

impl Cli {
    /// The archive selected by `--archive-dir`
    pub fn archive(&self) -> LocalArchive {
        LocalArchive::new(self.archive_dir.clone())
    }

    /// Load the error ledger from the state directory
    pub fn load_ledger(&self) -> ErrorLedger {
        ErrorLedger::load(state::ledger_path(&self.state_dir))
    }

    /// Load the processed set from the state directory
    pub fn load_processed(&self) -> ProcessedSet {
        ProcessedSet::load(state::processed_path(&self.state_dir))
    }

    /// Open the run lock of the state directory
    pub fn run_lock(&self) -> Result<RunLock, CliError> {
        Ok(RunLock::open(&self.state_dir)?)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive every post listed in an export
    Run(RunArgs),

    /// Inspect and edit the error ledger
    Errors(ErrorsCommand),

    /// Align the processed set with the archive on disk
    Reconcile(ReconcileCommand),

    /// Check every archived metadata document
    Validate(ValidateCommand),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Print `value` as one line of JSON
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let line = serde_json::to_string(value)
        .map_err(|e| CliError::OutputError(format!("failed to serialize output: {e}")))?;
    println!("{line}");
    Ok(())
}
