//! `errors` command: read and targeted edits of the error ledger

use crate::ledger::{ErrorKind, ErrorLedger, ErrorRecord};
use crate::processed::Bucket;
use clap::Args;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::{print_json, Cli, CliError, OutputFormat};

/// Errors subcommand
#[derive(Debug, Args)]
pub struct ErrorsCommand {
    #[command(subcommand)]
    action: ErrorsAction,
}

/// Errors actions
#[derive(Debug, clap::Subcommand)]
enum ErrorsAction {
    /// List recorded errors
    List {
        /// Only errors of this kind (e.g. media_404, rate_limit)
        #[arg(long)]
        kind: Option<ErrorKind>,

        /// Only errors recorded at least this many times
        #[arg(long, default_value_t = 0)]
        min_retries: u32,

        /// Show at most this many records
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show aggregate statistics
    Stats,

    /// Delete one record, or all of them
    Clear {
        /// Id whose record is deleted
        #[arg(required_unless_present = "all")]
        id: Option<String>,

        /// Delete every record
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },

    /// Make ids eligible for the next run with a fresh retry budget
    Retry {
        /// Ids to re-enable
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Serialize)]
struct ListedError<'a> {
    id: &'a str,
    #[serde(flatten)]
    record: &'a ErrorRecord,
}

impl ErrorsCommand {
    /// Execute the errors command
    pub async fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        match &self.action {
            ErrorsAction::List {
                kind,
                min_retries,
                limit,
            } => list(cli, *kind, *min_retries, *limit),
            ErrorsAction::Stats => stats(cli),
            ErrorsAction::Clear { id, all } => {
                let mut lock = cli.run_lock()?;
                let _guard = lock.try_guard()?;
                clear(cli, id.as_deref(), *all)
            }
            ErrorsAction::Retry { ids } => {
                let mut lock = cli.run_lock()?;
                let _guard = lock.try_guard()?;
                retry(cli, ids)
            }
        }
    }
}

fn select(
    ledger: &ErrorLedger,
    kind: Option<ErrorKind>,
    min_retries: u32,
) -> Vec<(&str, &ErrorRecord)> {
    let mut records = match kind {
        Some(kind) => ledger.errors_by_kind(kind),
        None => ledger.iter().collect(),
    };
    records.retain(|(_, record)| record.retry_count >= min_retries);
    records
}

fn list(
    cli: &Cli,
    kind: Option<ErrorKind>,
    min_retries: u32,
    limit: Option<usize>,
) -> Result<(), CliError> {
    let ledger = cli.load_ledger();
    let mut records = select(&ledger, kind, min_retries);
    let matched = records.len();
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    match cli.output_format {
        OutputFormat::Json => {
            let listed: Vec<_> = records
                .into_iter()
                .map(|(id, record)| ListedError { id, record })
                .collect();
            print_json(&listed)?;
        }
        OutputFormat::Human => {
            println!("{matched} error record(s)\n");
            for (id, record) in &records {
                println!(
                    "{} | {} | retries={} | {}",
                    id,
                    record.kind,
                    record.retry_count,
                    record.timestamp.to_rfc3339()
                );
                if let Some(message) = &record.details.message {
                    println!("    {message}");
                }
                if let Some(url) = &record.details.url {
                    println!("    url: {url}");
                }
            }
            if records.len() < matched {
                println!("\n... {} more", matched - records.len());
            }
        }
    }
    Ok(())
}

fn stats(cli: &Cli) -> Result<(), CliError> {
    let ledger = cli.load_ledger();
    let statistics = ledger.statistics();

    match cli.output_format {
        OutputFormat::Json => print_json(statistics)?,
        OutputFormat::Human => {
            println!("Total errors: {}", statistics.total_errors);
            if !statistics.by_type.is_empty() {
                println!("\nBy type:");
                for kind in ErrorKind::ALL {
                    let count = statistics.count_of(kind);
                    if count > 0 {
                        println!("  {:<22} {}", kind.as_str(), count);
                    }
                }
            }
            if !statistics.by_date.is_empty() {
                println!("\nBy date:");
                for (date, count) in &statistics.by_date {
                    println!("  {date}  {count}");
                }
            }
        }
    }
    Ok(())
}

fn clear(cli: &Cli, id: Option<&str>, all: bool) -> Result<(), CliError> {
    let mut ledger = cli.load_ledger();

    let removed = if all {
        ledger.clear_all()?
    } else if let Some(id) = id {
        usize::from(ledger.remove_error(id)?.is_some())
    } else {
        return Err(CliError::InvalidArgument(
            "give an id or --all".to_string(),
        ));
    };
    ledger.flush()?;
    info!(removed, "Cleared error records");

    match cli.output_format {
        OutputFormat::Json => print_json(&json!({ "removed": removed }))?,
        OutputFormat::Human => println!("Removed {removed} error record(s)"),
    }
    Ok(())
}

fn retry(cli: &Cli, ids: &[String]) -> Result<(), CliError> {
    let mut ledger = cli.load_ledger();
    let mut processed = cli.load_processed();
    ledger.set_batch_mode(true)?;

    let mut cleared = Vec::new();
    let mut skipped = Vec::new();
    for id in ids {
        let had_record = ledger.remove_error(id)?.is_some();
        let was_failed = processed.bucket_of(id) == Some(Bucket::Failed);
        if was_failed {
            processed.remove(id);
        }
        if had_record || was_failed {
            cleared.push(id.as_str());
        } else {
            skipped.push(id.as_str());
        }
    }

    ledger.set_batch_mode(false)?;
    processed.save()?;
    info!(cleared = cleared.len(), "Ids re-enabled for retry");

    match cli.output_format {
        OutputFormat::Json => print_json(&json!({ "cleared": cleared, "unknown": skipped }))?,
        OutputFormat::Human => {
            println!("{} id(s) will be retried on the next run", cleared.len());
            for id in &skipped {
                println!("  {id}: no error record and not marked failed");
            }
        }
    }
    Ok(())
}
