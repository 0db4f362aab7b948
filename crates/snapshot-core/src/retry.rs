//! Retry configuration shared by the fetch and delivery stages. All retry
//! waits are awaited in place between attempts (no background timers) and
//! honor the invocation deadline imposed by the scheduler.

use std::time::Duration;

use tokio::time::Instant;

/// Bounded-retry configuration: how many total attempts a stage may make
/// and how long it waits between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A single attempt, no waiting.
    pub const fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Sleep `delay` before the next retry attempt. Returns false without
/// sleeping when the wait would cross `deadline`, so the caller can fail
/// fast with a cancelled classification instead of sleeping past its
/// budget.
pub async fn sleep_within(delay: Duration, deadline: Option<Instant>) -> bool {
    if let Some(deadline) = deadline {
        if Instant::now() + delay >= deadline {
            return false;
        }
    }
    tokio::time::sleep(delay).await;
    true
}
