//! Bounded retry and polling
//!
//! Every wait loop in the engine goes through [`poll_until`]: a fixed
//! interval, a bounded attempt count, and a typed terminal result. A
//! loop that exhausts its attempts reports [`PollOutcome::TimedOut`]
//! instead of falling through.

use std::future::Future;
use std::time::Duration;

/// Attempt bound and spacing for one polling loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Asynchronous account creation: checked every 15 seconds for up to
    /// 10 minutes.
    pub const fn account_creation() -> Self {
        Self::new(40, Duration::from_secs(15))
    }

    /// Resource removal waits (e.g. lock-table deletion).
    pub const fn removal() -> Self {
        Self::new(30, Duration::from_secs(5))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// One probe's verdict inside a polling loop.
#[derive(Debug)]
pub enum PollStep<T> {
    /// Terminal: the awaited state was reached.
    Ready(T),
    /// Terminal: the remote operation failed.
    Failed(String),
    /// Not terminal yet; sleep and probe again.
    Pending,
}

/// Terminal result of a polling loop.
#[derive(Debug)]
pub enum PollOutcome<T> {
    Success(T),
    Failed(String),
    TimedOut { attempts: u32 },
}

/// Probe until terminal or the attempt bound is exhausted.
///
/// Transport errors from the probe propagate immediately; they are not
/// retried here (the caller's stage policy owns that decision).
pub async fn poll_until<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut probe: F,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStep<T>, E>>,
{
    for attempt in 1..=policy.max_attempts {
        match probe().await? {
            PollStep::Ready(value) => return Ok(PollOutcome::Success(value)),
            PollStep::Failed(reason) => return Ok(PollOutcome::Failed(reason)),
            PollStep::Pending => {
                tracing::debug!(attempt, max = policy.max_attempts, "Poll pending");
                if attempt < policy.max_attempts && !policy.interval.is_zero() {
                    tokio::time::sleep(policy.interval).await;
                }
            }
        }
    }

    Ok(PollOutcome::TimedOut {
        attempts: policy.max_attempts,
    })
}
