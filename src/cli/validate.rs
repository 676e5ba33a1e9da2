//! Validation subcommand

use crate::archive::{ArchiveError, LocalArchive};
use crate::downloader::config::DEFAULT_BATCH_SIZE;
use crate::downloader::BatchRunner;
use crate::processed::Bucket;
use clap::Parser;
use serde::Serialize;
use tracing::{debug, warn};

use super::{print_json, Cli, CliError, OutputFormat};

/// Validate command: scan every archive directory in order
#[derive(Parser, Debug)]
pub struct ValidateCommand {
    /// List every problem instead of only the counts
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum ItemCheck {
    Valid { media: usize },
    Missing,
    Unparsable(String),
}

/// Result of a validation scan
#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    /// Directories scanned
    pub scanned: usize,
    /// Directories with a readable metadata document
    pub valid: usize,
    /// Media entries listed across valid documents
    pub media_entries: usize,
    /// Directories without a recognized metadata document
    pub missing: Vec<String>,
    /// Directories whose metadata cannot be parsed, with the reason
    pub unparsable: Vec<(String, String)>,
    /// Ids marked successful whose directory has no metadata
    pub stale_successful: Vec<String>,
}

impl ValidationReport {
    /// Number of problems found
    pub fn problem_count(&self) -> usize {
        self.missing.len() + self.unparsable.len() + self.stale_successful.len()
    }
}

fn check_item(archive: &LocalArchive, id: &str) -> ItemCheck {
    match archive.read_metadata(id) {
        Ok(document) => ItemCheck::Valid {
            media: document.media().map_or(0, <[_]>::len),
        },
        Err(ArchiveError::MetadataNotFound(_)) => ItemCheck::Missing,
        Err(e) => ItemCheck::Unparsable(e.to_string()),
    }
}

/// Scan `archive` sequentially, in directory-name order
pub async fn scan_archive(
    archive: &LocalArchive,
    successful: &[String],
) -> Result<ValidationReport, CliError> {
    let ids = archive.list_item_ids()?;
    let runner = BatchRunner::new(DEFAULT_BATCH_SIZE);

    let outcome = runner
        .run_sequential(
            &ids,
            |id| async move { (id.as_str(), check_item(archive, id)) },
            |progress| debug!("{}", progress.format_progress()),
        )
        .await;

    let mut report = ValidationReport {
        scanned: ids.len(),
        ..ValidationReport::default()
    };
    for (id, check) in outcome.results {
        match check {
            ItemCheck::Valid { media } => {
                report.valid += 1;
                report.media_entries += media;
            }
            ItemCheck::Missing => report.missing.push(id.to_string()),
            ItemCheck::Unparsable(reason) => {
                warn!(id = %id, reason = %reason, "Unparsable metadata");
                report.unparsable.push((id.to_string(), reason));
            }
        }
    }
    report.stale_successful = successful
        .iter()
        .filter(|id| !archive.exists_local_metadata(id))
        .cloned()
        .collect();
    Ok(report)
}

impl ValidateCommand {
    /// Execute the validation command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let archive = cli.archive();
        if !archive.root().is_dir() {
            return Err(CliError::InvalidArgument(format!(
                "{} is not a directory",
                archive.root().display()
            )));
        }

        let successful = cli.load_processed().ids(Bucket::Successful);
        let report = scan_archive(&archive, &successful).await?;

        match cli.output_format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Human => self.output_human(&report),
        }

        match report.problem_count() {
            0 => Ok(()),
            n => Err(CliError::ValidationFailed(n)),
        }
    }

    fn output_human(&self, report: &ValidationReport) {
        println!("Scanned {} archive item(s)", report.scanned);
        println!("  Valid metadata:       {}", report.valid);
        println!("  Media entries:        {}", report.media_entries);
        println!("  Missing metadata:     {}", report.missing.len());
        println!("  Unparsable metadata:  {}", report.unparsable.len());
        println!("  Stale successful ids: {}", report.stale_successful.len());

        if self.verbose {
            for id in &report.missing {
                println!("  - {id} (no metadata)");
            }
            for (id, reason) in &report.unparsable {
                println!("  - {id} ({reason})");
            }
            for id in &report.stale_successful {
                println!("  - {id} (marked successful, metadata missing)");
            }
        }
        if report.problem_count() > 0 {
            println!("\nRun `likes-archiver reconcile` to repair the processed set.");
        }
    }
}
