//! Observability counters
//!
//! Recorded through the `metrics` facade, so they are no-ops unless a recorder
//! is installed. `run --metrics-addr` installs the Prometheus exporter.

use crate::ledger::ErrorKind;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

/// Install the Prometheus exporter on `addr`.
///
/// Idempotent: a second call is a no-op.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    if let Some(existing) = METRICS_INITIALIZED.get() {
        debug!(addr = %existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "transfers_completed_total",
        Unit::Count,
        "Media files downloaded successfully"
    );
    describe_counter!(
        "transfers_failed_total",
        Unit::Count,
        "Media transfers that failed"
    );
    describe_counter!(
        "errors_recorded_total",
        Unit::Count,
        "Failures written to the error ledger, by kind"
    );
    describe_counter!(
        "items_processed_total",
        Unit::Count,
        "Work items that reached an outcome, by outcome"
    );
    describe_counter!(
        "metadata_fetch_retries_total",
        Unit::Count,
        "Metadata fetch re-attempts after a transient failure"
    );
    describe_histogram!(
        "transfer_duration_seconds",
        Unit::Seconds,
        "Duration of media transfers"
    );

    let _ = METRICS_INITIALIZED.set(addr);
    info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}

/// Count a successful transfer
pub fn record_transfer_success(bytes: u64, elapsed: Duration) {
    counter!("transfers_completed_total").increment(1);
    counter!("transfer_bytes_total").increment(bytes);
    histogram!("transfer_duration_seconds").record(elapsed.as_secs_f64());
}

/// Count a failed transfer
pub fn record_transfer_failure(kind: ErrorKind) {
    counter!("transfers_failed_total", "kind" => kind.as_str()).increment(1);
}

/// Count a ledger write
pub fn record_error(kind: ErrorKind) {
    counter!("errors_recorded_total", "kind" => kind.as_str()).increment(1);
}

/// Count an item outcome
pub fn record_item(outcome: &'static str) {
    counter!("items_processed_total", "outcome" => outcome).increment(1);
}

/// Count a metadata fetch re-attempt
pub fn record_fetch_retry(attempt: u32, wait: Duration) {
    counter!("metadata_fetch_retries_total").increment(1);
    debug!(attempt, wait_secs = wait.as_secs(), "Metadata fetch retry recorded");
}
