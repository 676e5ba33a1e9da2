//! Download configuration constants

use std::time::Duration;

/// Default ceiling on simultaneous media transfers.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default ceiling on simultaneous metadata fetches.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Upper bound accepted for `--concurrency` and `--fetch-concurrency`.
pub const MAX_CONCURRENCY: usize = 32;

/// Default number of work items per chunk. State is checkpointed after
/// every chunk.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Recorded failures after which an item is no longer attempted.
pub const MAX_ITEM_RETRIES: u32 = 3;

/// Re-attempts of a metadata fetch after a transient failure.
pub const MAX_FETCH_RETRIES: u32 = 3;

/// Wait before re-attempting a transient metadata fetch failure.
pub const DEFAULT_RETRY_WAIT_SECS: u64 = 300;

/// [`DEFAULT_RETRY_WAIT_SECS`] as a duration
pub fn default_retry_wait() -> Duration {
    Duration::from_secs(DEFAULT_RETRY_WAIT_SECS)
}
