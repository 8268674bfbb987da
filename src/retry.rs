//! The resilience executor: classification-driven retry around remote calls.
//!
//! Backoff follows a fixed ordered delay list indexed by failure count; a
//! server-specified wait (flood control) overrides the schedule entry for
//! that attempt, unless it exceeds twice the largest configured step, in
//! which case the call aborts immediately rather than pinning a worker.

use std::num::NonZeroU32;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{ErrorClass, RemoteError};

// ─── RetrySchedule ────────────────────────────────────────────────────────────

/// Ordered backoff delays. The number of attempts equals the schedule
/// length; an empty schedule means a single attempt with no retry.
#[derive(Clone, Debug)]
pub struct RetrySchedule {
    steps: Vec<Duration>,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_millis(200),
            Duration::from_millis(500),
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ])
    }
}

impl RetrySchedule {
    pub fn new(steps: Vec<Duration>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }

    /// Maximum number of attempts (schedule length).
    pub fn max_attempts(&self) -> u32 {
        self.steps.len() as u32
    }

    /// The largest configured step.
    pub fn max_step(&self) -> Duration {
        self.steps.iter().copied().max().unwrap_or(Duration::ZERO)
    }

    /// Longest server-specified wait we are willing to honor.
    pub fn flood_ceiling(&self) -> Duration {
        self.max_step() * 2
    }

    /// Decide whether to retry after the failure described by `ctx`, and
    /// with what delay.
    pub fn next_delay(&self, ctx: &RetryContext) -> ControlFlow<(), Duration> {
        let exhausted = ctx.fail_count.get() >= self.max_attempts();
        match ctx.last_class {
            ErrorClass::Transient => {
                if exhausted {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(self.steps[(ctx.fail_count.get() - 1) as usize])
                }
            }
            ErrorClass::RateLimited(wait) => {
                if wait > self.flood_ceiling() || exhausted {
                    ControlFlow::Break(())
                } else {
                    // The server's wait replaces the schedule entry for this attempt.
                    ControlFlow::Continue(wait)
                }
            }
            ErrorClass::Permanent | ErrorClass::Cancelled | ErrorClass::Unclassified => {
                ControlFlow::Break(())
            }
        }
    }
}

// ─── RetryContext ─────────────────────────────────────────────────────────────

/// Per-call retry state, created when a call first fails and discarded at
/// completion.
pub struct RetryContext {
    pub op:           &'static str,
    pub fail_count:   NonZeroU32,
    pub slept_so_far: Duration,
    pub last_class:   ErrorClass,
}

// ─── Executor ─────────────────────────────────────────────────────────────────

/// Invoke `call` with classification-driven retry.
///
/// Cancellation aborts immediately — before an attempt or mid-backoff —
/// and is reported as [`RemoteError::Cancelled`], logged as informational
/// rather than as a failure.
pub async fn invoke_with_retry<T, F, Fut>(
    schedule: &RetrySchedule,
    cancel:   &CancellationToken,
    op:       &'static str,
    mut call: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut fail_count   = 0u32;
    let mut slept_so_far = Duration::ZERO;
    loop {
        if cancel.is_cancelled() {
            info!(op, "cancelled before attempt");
            return Err(RemoteError::Cancelled);
        }

        let err = match call().await {
            Ok(v)  => return Ok(v),
            Err(e) => e,
        };
        fail_count += 1;

        let class = err.classify();
        match class {
            ErrorClass::Cancelled => {
                info!(op, "operation cancelled");
                return Err(err);
            }
            ErrorClass::Unclassified => {
                error!(op, error = %err, "unclassified remote error");
                return Err(err);
            }
            _ => {}
        }

        let ctx = RetryContext {
            op,
            fail_count: NonZeroU32::new(fail_count).unwrap(),
            slept_so_far,
            last_class: class,
        };
        match schedule.next_delay(&ctx) {
            ControlFlow::Continue(delay) => {
                match class {
                    ErrorClass::RateLimited(wait) => {
                        info!(op, wait_secs = wait.as_secs(), "server requested wait; sleeping before retry");
                    }
                    _ => {
                        debug!(op, attempt = fail_count, delay_ms = delay.as_millis() as u64,
                               "transient failure; backing off");
                    }
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(op, "cancelled during backoff");
                        return Err(RemoteError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                slept_so_far += delay;
            }
            ControlFlow::Break(()) => {
                match class {
                    ErrorClass::RateLimited(wait) if wait > schedule.flood_ceiling() => {
                        warn!(op, wait_secs = wait.as_secs(), "server wait exceeds ceiling; aborting");
                    }
                    ErrorClass::Transient | ErrorClass::RateLimited(_) => {
                        warn!(op, attempts = fail_count, error = %err, "retry schedule exhausted");
                    }
                    _ => {}
                }
                return Err(err);
            }
        }
    }
}
