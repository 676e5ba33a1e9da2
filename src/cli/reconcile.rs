//! `reconcile` command

use crate::processed::{reconcile, Bucket};
use clap::Args;
use serde_json::json;

use super::{print_json, Cli, CliError, OutputFormat};

/// Align the processed set and the error ledger with the archive on disk
#[derive(Debug, Args)]
pub struct ReconcileCommand {
    /// List every affected id instead of only the counts
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

impl ReconcileCommand {
    /// Execute the reconciliation
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let mut lock = cli.run_lock()?;
        let _guard = lock.try_guard()?;

        let archive = cli.archive();
        let mut ledger = cli.load_ledger();
        let mut processed = cli.load_processed();
        ledger.set_batch_mode(true)?;

        let report = reconcile(&archive, &mut processed, &mut ledger)?;

        ledger.set_batch_mode(false)?;
        processed.save()?;

        match cli.output_format {
            OutputFormat::Json => print_json(&json!({
                "not_found": report.not_found,
                "recovered": report.recovered,
                "successful": processed.count(Bucket::Successful),
                "failed": processed.count(Bucket::Failed),
                "no_media": processed.count(Bucket::NoMedia),
            }))?,
            OutputFormat::Human => {
                if report.is_noop() {
                    println!("Processed set already matches the archive");
                } else {
                    println!(
                        "Unmarked {} item(s) with missing metadata",
                        report.not_found.len()
                    );
                    println!(
                        "Marked {} archived item(s) successful",
                        report.recovered.len()
                    );
                    if self.verbose {
                        for id in &report.not_found {
                            println!("  not found: {id}");
                        }
                        for id in &report.recovered {
                            println!("  recovered: {id}");
                        }
                    }
                }
                println!(
                    "\nProcessed: {} successful, {} failed, {} without media",
                    processed.count(Bucket::Successful),
                    processed.count(Bucket::Failed),
                    processed.count(Bucket::NoMedia)
                );
            }
        }
        Ok(())
    }
}
