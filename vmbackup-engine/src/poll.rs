//! Bounded polling for asynchronous remote state transitions.
//!
//! Every long-running platform operation (snapshot creation, clone
//! materialization, export) completes asynchronously: the request returns
//! immediately and the resource's status flips later. [`poll_until`] probes
//! the status until it reaches a target value, sleeping between probes with
//! exponential backoff, and gives up on timeout or cancellation.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{BackupError, Result};

/// Probes between `info!` progress events.
const PROGRESS_EVERY: u32 = 10;

/// Delay and deadline policy for [`poll_until`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second probe
    pub interval: Duration,
    /// Upper bound for the delay after backoff
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each probe (1.0 = fixed delay)
    pub backoff_factor: f64,
    /// Overall deadline. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(15),
            backoff_factor: 1.5,
            timeout: Some(Duration::from_secs(3600)),
        }
    }
}

impl PollPolicy {
    /// Fixed delay, no backoff.
    pub fn fixed(interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff_factor: 1.0,
            timeout,
        }
    }

    /// Saturates at `max_interval`, including for infinite or overflowing
    /// factors.
    fn next_delay(&self, current: Duration) -> Duration {
        let factor = self.backoff_factor.max(1.0);
        Duration::try_from_secs_f64(current.as_secs_f64() * factor)
            .map_or(self.max_interval, |next| next.min(self.max_interval))
    }
}

/// Outcome of a successful poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    /// Number of probe invocations, including the successful one
    pub attempts: u32,
    /// Time spent waiting
    pub elapsed: Duration,
}

/// Probe until it returns `target`.
///
/// The probe runs immediately and then once after every delay. A probe
/// error aborts the poll. The deadline is checked after each unsuccessful
/// probe, so a timed-out poll has always probed at least once. The last
/// sleep is shortened to end at the deadline.
pub async fn poll_until<T, F, Fut>(
    operation: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    target: T,
    mut probe: F,
) -> Result<PollStats>
where
    T: PartialEq + Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let mut delay = policy.interval;
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled { operation: operation.to_string() });
        }

        attempts += 1;
        let current = probe().await?;
        debug!(operation, attempt = attempts, current = ?current, target = ?target, "Polled");

        if current == target {
            return Ok(PollStats { attempts, elapsed: start.elapsed() });
        }

        let elapsed = start.elapsed();
        let mut sleep_for = delay;
        if let Some(timeout) = policy.timeout {
            if elapsed >= timeout {
                return Err(BackupError::Timeout {
                    operation: operation.to_string(),
                    elapsed,
                });
            }
            sleep_for = sleep_for.min(timeout - elapsed);
        }

        if attempts % PROGRESS_EVERY == 0 {
            info!(operation, attempts, elapsed_secs = elapsed.as_secs(), current = ?current, "Still waiting");
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(BackupError::Cancelled { operation: operation.to_string() });
            }
            _ = tokio::time::sleep(sleep_for) => {}
        }
        delay = policy.next_delay(delay);
    }
}
