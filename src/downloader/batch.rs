//! Chunked batch runner
//!
//! Splits a worklist into contiguous chunks of `batch_size`, drives each chunk
//! through a processor, reports progress after every chunk and yields to the
//! scheduler between chunks. Results always come back in input order.
//!
//! A shutdown request is honored between chunks: the current chunk finishes,
//! no further chunk starts and the outcome is flagged `interrupted`.

use super::progress::{BatchProgress, ProgressClock};
use crate::shutdown::SharedShutdown;
use std::future::Future;
use tracing::{debug, info};

/// Results of a batch pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome<R> {
    /// Per-item results for every processed item, in input order
    pub results: Vec<R>,
    /// Whether the pass stopped early because shutdown was requested
    pub interrupted: bool,
}

/// Drives worklists chunk by chunk
#[derive(Debug, Clone)]
pub struct BatchRunner {
    batch_size: usize,
    shutdown: Option<SharedShutdown>,
}

impl BatchRunner {
    /// Runner with `batch_size` items per chunk (minimum 1)
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            shutdown: None,
        }
    }

    /// Stop between chunks once `shutdown` is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Items per chunk
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of chunks a worklist of `len` items splits into
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.batch_size)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Run `process_chunk(chunk_index, chunk)` for each chunk in order.
    ///
    /// `process_chunk` must return one result per item of its chunk, in
    /// order. `on_progress` is called after each chunk.
    pub async fn process_batch<'a, T, R, F, Fut, P>(
        &self,
        items: &'a [T],
        mut process_chunk: F,
        mut on_progress: P,
    ) -> BatchOutcome<R>
    where
        F: FnMut(usize, &'a [T]) -> Fut,
        Fut: Future<Output = Vec<R>>,
        P: FnMut(&BatchProgress),
    {
        let chunks = self.chunk_count(items.len());
        let clock = ProgressClock::start(items.len(), chunks);
        let mut results = Vec::with_capacity(items.len());
        let mut completed = 0usize;
        let mut interrupted = false;

        for (index, chunk) in items.chunks(self.batch_size).enumerate() {
            if self.shutdown_requested() {
                info!(
                    chunk = index + 1,
                    chunks,
                    remaining = items.len() - completed,
                    "Shutdown requested, not starting further chunks"
                );
                interrupted = true;
                break;
            }

            debug!(chunk = index + 1, chunks, size = chunk.len(), "Processing chunk");
            let chunk_results = process_chunk(index, chunk).await;
            completed += chunk.len();
            results.extend(chunk_results);

            on_progress(&clock.observe(index + 1, completed));
            tokio::task::yield_now().await;
        }

        BatchOutcome {
            results,
            interrupted,
        }
    }

    /// Process items one at a time in input order.
    pub async fn run_sequential<'a, T, R, F, Fut, P>(
        &self,
        items: &'a [T],
        process_item: F,
        on_progress: P,
    ) -> BatchOutcome<R>
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future<Output = R>,
        P: FnMut(&BatchProgress),
    {
        let process_item = &process_item;
        self.process_batch(
            items,
            |_, chunk| async move {
                let mut out = Vec::with_capacity(chunk.len());
                for item in chunk {
                    out.push(process_item(item).await);
                }
                out
            },
            on_progress,
        )
        .await
    }

    /// Process all items of a chunk concurrently, chunks one after another.
    pub async fn run_concurrent<'a, T, R, F, Fut, P>(
        &self,
        items: &'a [T],
        process_item: F,
        on_progress: P,
    ) -> BatchOutcome<R>
    where
        F: Fn(&'a T) -> Fut,
        Fut: Future<Output = R>,
        P: FnMut(&BatchProgress),
    {
        self.process_batch(
            items,
            |_, chunk| futures::future::join_all(chunk.iter().map(&process_item)),
            on_progress,
        )
        .await
    }
}
