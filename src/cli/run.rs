//! `run` command implementation

use crate::downloader::config::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_FETCH_CONCURRENCY, DEFAULT_RETRY_WAIT_SECS,
    MAX_CONCURRENCY, MAX_FETCH_RETRIES, MAX_ITEM_RETRIES,
};
use crate::downloader::{RetryPolicy, RunConfig, RunExecutor, RunSummary};
use crate::export::read_export;
use crate::fetcher::{
    CommandMetadataFetcher, HttpMetadataFetcher, HttpTransfer, MetadataFetcher,
};
use crate::shutdown::SharedShutdown;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use super::{print_json, Cli, CliError, OutputFormat};

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

fn parse_batch_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("batch size must be at least 1".to_string()),
        Ok(value) => Ok(value),
        Err(_) => Err(format!("'{s}' is not a valid number")),
    }
}

/// Arguments for the `run` command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Export file listing liked posts (like.js, JSON array or one id per line)
    #[arg(long)]
    pub export: PathBuf,

    /// Simultaneous media transfers across all items (default: 4, max: 32)
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Simultaneous metadata fetches (default: 4, max: 32)
    #[arg(long, default_value_t = DEFAULT_FETCH_CONCURRENCY, value_parser = parse_concurrency)]
    pub fetch_concurrency: usize,

    /// Items per chunk; state is checkpointed after every chunk
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, value_parser = parse_batch_size)]
    pub batch_size: usize,

    /// Recorded failures after which an item is skipped
    #[arg(long, default_value_t = MAX_ITEM_RETRIES)]
    pub max_item_retries: u32,

    /// Re-attempts of a metadata fetch after a rate limit or network failure
    #[arg(long, default_value_t = MAX_FETCH_RETRIES)]
    pub fetch_retries: u32,

    /// Seconds to wait before each metadata fetch re-attempt
    #[arg(long, default_value_t = DEFAULT_RETRY_WAIT_SECS)]
    pub retry_wait_secs: u64,

    /// Re-attempt items previously marked failed
    #[arg(long, default_value_t = false)]
    pub retry_failed: bool,

    /// Fetch missing metadata from this URL template; `{id}` is replaced
    #[arg(long, conflicts_with = "metadata_command")]
    pub metadata_url: Option<String>,

    /// Fetch missing metadata by running this command; `{id}` is replaced.
    /// Must be the last option on the command line.
    #[arg(long, num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
    pub metadata_command: Option<Vec<String>>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Do not draw a progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

impl RunArgs {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            concurrency: self.concurrency,
            fetch_concurrency: self.fetch_concurrency,
            batch_size: self.batch_size,
            max_item_retries: self.max_item_retries,
            retry_policy: RetryPolicy::new(
                self.fetch_retries,
                Duration::from_secs(self.retry_wait_secs),
            ),
            retry_failed: self.retry_failed,
        }
    }

    fn metadata_fetcher(&self) -> Result<Option<Arc<dyn MetadataFetcher>>, CliError> {
        if let Some(template) = &self.metadata_url {
            let fetcher = HttpMetadataFetcher::new(template.clone())
                .map_err(CliError::InvalidArgument)?;
            return Ok(Some(Arc::new(fetcher)));
        }
        if let Some(command) = &self.metadata_command {
            let fetcher =
                CommandMetadataFetcher::new(command).map_err(CliError::InvalidArgument)?;
            return Ok(Some(Arc::new(fetcher)));
        }
        Ok(None)
    }

    /// Execute the run
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        if let Some(addr) = self.metrics_addr {
            crate::metrics::init_metrics(addr).map_err(CliError::ConfigurationError)?;
        }

        let ids = read_export(&self.export)?;
        let fetcher = self.metadata_fetcher()?;

        let mut lock = cli.run_lock()?;
        let _guard = lock.try_guard()?;

        let interactive = cli.output_format == OutputFormat::Human && !self.no_progress;
        let progress = create_progress_bar(ids.len(), interactive);

        let mut executor = RunExecutor::open(
            cli.archive(),
            &cli.state_dir,
            Arc::new(HttpTransfer::new()),
            self.run_config(),
        )
        .with_shutdown(shutdown)
        .with_progress({
            let progress = progress.clone();
            move |p| {
                progress.set_length(p.total as u64);
                progress.set_position(p.completed as u64);
            }
        });
        if let Some(fetcher) = fetcher {
            executor = executor.with_fetcher(fetcher);
        }

        info!(
            export = %self.export.display(),
            archive = %cli.archive_dir.display(),
            items = ids.len(),
            "Starting archive run"
        );
        let result = executor.run(&ids).await;
        progress.finish_and_clear();

        let summary = result?;
        match cli.output_format {
            OutputFormat::Json => print_json(&summary)?,
            OutputFormat::Human => output_human(&summary),
        }

        if summary.halted {
            let reason = summary
                .halt_reason
                .unwrap_or_else(|| "interrupted".to_string());
            error!(reason = %reason, "Run halted");
            return Err(CliError::RunHalted(reason));
        }
        Ok(())
    }
}

fn output_human(summary: &RunSummary) {
    println!("\n{}", summary.format_human());
    if summary.has_failures() {
        println!("\nFailures are recorded in the error ledger; see `likes-archiver errors list`.");
    }
}

fn create_progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("Archiving likes");
    pb
}
