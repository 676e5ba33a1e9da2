//! Run-level retry policy for metadata fetches
//!
//! Every metadata fetch is driven through a small state machine:
//!
//! ```text
//! Fetching ──ok──────────────────────────────▶ Succeeded
//!    │ transient, budget left
//!    ▼
//! AwaitingRetry ──wait elapsed──▶ Retrying ──(same edges as Fetching)
//!    │ shutdown during wait
//!    ▼
//! FailedTerminal ◀── permanent kind, budget exhausted, or auth error
//! ```
//!
//! Transient kinds (`rate_limit`, `network_error`) wait a fixed duration and
//! try again, up to `max_retries` re-attempts. `auth_error` halts the whole
//! run. Media transfers are never retried here.

use crate::fetcher::FetchFailure;
use crate::ledger::ErrorKind;
use crate::shutdown::SharedShutdown;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use super::config::{default_retry_wait, MAX_FETCH_RETRIES};

/// State of one fetch under the retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// First attempt in progress
    Fetching,
    /// Waiting before re-attempt number `attempt`
    AwaitingRetry {
        /// 1-based re-attempt number
        attempt: u32,
        /// Classification that caused the wait
        kind: ErrorKind,
    },
    /// Re-attempt number `attempt` in progress
    Retrying {
        /// 1-based re-attempt number
        attempt: u32,
    },
    /// Gave up
    FailedTerminal {
        /// Final classification
        kind: ErrorKind,
    },
    /// Fetch succeeded
    Succeeded,
}

impl RetryState {
    /// Whether the machine has stopped
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::FailedTerminal { .. } | RetryState::Succeeded)
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    Retry(Duration),
    /// Record the failure and move on to the next item
    GiveUp,
    /// Record the failure and stop the whole run
    Halt,
}

/// Escalation rules for metadata fetch failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Re-attempts allowed after transient failures
    pub max_retries: u32,
    /// Wait before each re-attempt
    pub wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_FETCH_RETRIES,
            wait: default_retry_wait(),
        }
    }
}

impl RetryPolicy {
    /// Policy with the given budget and wait
    pub fn new(max_retries: u32, wait: Duration) -> Self {
        Self { max_retries, wait }
    }

    /// Fresh state machine for one fetch
    pub fn start(&self) -> RetryMachine {
        RetryMachine {
            policy: *self,
            state: RetryState::Fetching,
            retries: 0,
        }
    }

    /// Drive `attempt` through the policy.
    ///
    /// Returns as soon as an attempt succeeds, the budget is spent, a
    /// permanent or fatal failure occurs, or shutdown interrupts a wait.
    pub async fn run<T, F, Fut>(
        &self,
        id: &str,
        shutdown: Option<&SharedShutdown>,
        mut attempt: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchFailure>>,
    {
        let mut machine = self.start();
        loop {
            let failure = match attempt().await {
                Ok(value) => {
                    machine.on_success();
                    return RetryOutcome::Succeeded {
                        value,
                        retries: machine.retries(),
                    };
                }
                Err(failure) => failure,
            };

            let kind = failure.kind();
            match machine.on_failure(kind) {
                RetryDecision::Retry(wait) => {
                    warn!(
                        id = %id,
                        kind = %kind,
                        attempt = machine.retries(),
                        max_retries = self.max_retries,
                        wait_secs = wait.as_secs(),
                        error = %failure,
                        "Transient metadata failure, waiting before retry"
                    );
                    crate::metrics::record_fetch_retry(machine.retries(), wait);

                    if let Some(shutdown) = shutdown {
                        if shutdown.is_shutdown_requested() {
                            machine.interrupt(kind);
                            return RetryOutcome::Interrupted { failure, kind };
                        }
                        tokio::select! {
                            _ = tokio::time::sleep(wait) => {},
                            _ = shutdown.wait_for_shutdown() => {
                                info!(id = %id, "Shutdown requested during retry wait");
                                machine.interrupt(kind);
                                return RetryOutcome::Interrupted { failure, kind };
                            }
                        }
                    } else {
                        tokio::time::sleep(wait).await;
                    }
                    machine.begin_retry();
                }
                RetryDecision::GiveUp => {
                    return RetryOutcome::Failed {
                        failure,
                        kind,
                        retries: machine.retries(),
                    };
                }
                RetryDecision::Halt => {
                    error!(id = %id, kind = %kind, error = %failure, "Fatal metadata failure");
                    return RetryOutcome::Halted { failure, kind };
                }
            }
        }
    }
}

/// State machine for one fetch
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
    retries: u32,
}

impl RetryMachine {
    /// Current state
    pub fn state(&self) -> &RetryState {
        &self.state
    }

    /// Re-attempts made so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Current attempt succeeded
    pub fn on_success(&mut self) {
        self.state = RetryState::Succeeded;
    }

    /// Current attempt failed with `kind`; decide what happens next
    pub fn on_failure(&mut self, kind: ErrorKind) -> RetryDecision {
        if kind.is_fatal() {
            self.state = RetryState::FailedTerminal { kind };
            return RetryDecision::Halt;
        }
        if kind.is_transient() && self.retries < self.policy.max_retries {
            self.retries += 1;
            self.state = RetryState::AwaitingRetry {
                attempt: self.retries,
                kind,
            };
            return RetryDecision::Retry(self.policy.wait);
        }
        self.state = RetryState::FailedTerminal { kind };
        RetryDecision::GiveUp
    }

    /// Wait finished; the next attempt starts
    pub fn begin_retry(&mut self) {
        if let RetryState::AwaitingRetry { attempt, .. } = self.state {
            self.state = RetryState::Retrying { attempt };
        }
    }

    fn interrupt(&mut self, kind: ErrorKind) {
        self.state = RetryState::FailedTerminal { kind };
    }
}

/// Result of driving a fetch through the policy
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded
    Succeeded {
        /// Fetched value
        value: T,
        /// Re-attempts it took
        retries: u32,
    },
    /// Permanent failure or transient budget exhausted
    Failed {
        /// Last failure
        failure: FetchFailure,
        /// Its classification
        kind: ErrorKind,
        /// Re-attempts made
        retries: u32,
    },
    /// Fatal failure; the run must stop
    Halted {
        /// The failure
        failure: FetchFailure,
        /// Its classification
        kind: ErrorKind,
    },
    /// Shutdown arrived while waiting to retry
    Interrupted {
        /// Last failure
        failure: FetchFailure,
        /// Its classification
        kind: ErrorKind,
    },
}
