//! Progress tracking for long-running batch passes.
//!
//! The batch runner reports a [`BatchProgress`] observation after each chunk;
//! the executor logs it as a `[PROGRESS]` line and the CLI mirrors it on an
//! indicatif bar.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Snapshot taken after a chunk completes.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    /// Items finished so far.
    pub completed: usize,
    /// Items in the whole worklist.
    pub total: usize,
    /// 1-based index of the chunk that just finished.
    pub chunk: usize,
    /// Number of chunks in the pass.
    pub chunks: usize,
    /// Time since the pass started.
    #[serde(skip)]
    pub elapsed: Duration,
}

impl BatchProgress {
    /// Completion percentage (0-100). An empty worklist is 100% complete.
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.total as f64) * 100.0
    }

    /// Items per second so far.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }

    /// Estimated time left at the current rate.
    pub fn estimate_remaining(&self) -> Option<Duration> {
        let rate = self.rate();
        let remaining = self.total.saturating_sub(self.completed);
        if rate > 0.0 && remaining > 0 {
            Some(Duration::from_secs_f64(remaining as f64 / rate))
        } else {
            None
        }
    }

    /// Human-readable progress string for logging.
    pub fn format_progress(&self) -> String {
        let mut parts = vec![
            format!("[PROGRESS] Processed {}/{} items", self.completed, self.total),
            format!("- {:.1}% complete", self.percentage()),
            format!("(chunk {}/{})", self.chunk, self.chunks),
        ];

        let rate = self.rate();
        if rate > 0.0 {
            parts.push(format!("at {rate:.1} items/sec"));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

/// Clock for one pass; produces [`BatchProgress`] snapshots.
#[derive(Debug, Clone)]
pub struct ProgressClock {
    start_time: Instant,
    total: usize,
    chunks: usize,
}

impl ProgressClock {
    /// Start timing a pass over `total` items split into `chunks` chunks.
    pub fn start(total: usize, chunks: usize) -> Self {
        Self {
            start_time: Instant::now(),
            total,
            chunks,
        }
    }

    /// Snapshot after `chunk` (1-based) with `completed` items done.
    pub fn observe(&self, chunk: usize, completed: usize) -> BatchProgress {
        BatchProgress {
            completed,
            total: self.total,
            chunk,
            chunks: self.chunks,
            elapsed: self.start_time.elapsed(),
        }
    }
}

/// Compact duration for progress and summary output.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
