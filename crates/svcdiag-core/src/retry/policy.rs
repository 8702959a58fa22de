//! Retry policy: decides backoff delays and when to give up.

use std::time::Duration;

/// How long to wait between two attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same wait after every failed attempt.
    Fixed { interval: Duration },

    /// `multiplier * 2^attempts`, capped at `max_wait`.
    Exponential {
        multiplier: Duration,
        max_wait: Duration,
    },
}

/// Retry policy for remote operations.
///
/// A policy without any stop condition retries forever; the named
/// constructors always set one.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub backoff: Backoff,

    /// Give up once this much time has elapsed since the first attempt.
    pub stop_max_delay: Option<Duration>,

    /// Give up after this many attempts.
    pub stop_max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn fixed(interval: Duration, max_delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed { interval },
            stop_max_delay: Some(max_delay),
            stop_max_attempts: None,
        }
    }

    pub fn exponential(multiplier: Duration, max_wait: Duration, max_delay: Duration) -> Self {
        Self {
            backoff: Backoff::Exponential {
                multiplier,
                max_wait,
            },
            stop_max_delay: Some(max_delay),
            stop_max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.stop_max_attempts = Some(attempts);
        self
    }

    /// Poll for eventual state convergence (broker registration).
    pub fn broker_poll() -> Self {
        Self::fixed(Duration::from_millis(1_000), Duration::from_millis(120_000))
    }

    /// Wait for a resource to become describable (topic creation).
    pub fn topic_wait() -> Self {
        Self::exponential(
            Duration::from_millis(1_000),
            Duration::from_millis(60_000),
            Duration::from_millis(300_000),
        )
    }

    /// Fetching one status snapshot for the bundle.
    pub fn snapshot() -> Self {
        Self::exponential(
            Duration::from_millis(1_000),
            Duration::from_millis(10_000),
            Duration::from_millis(60_000),
        )
        .with_max_attempts(3)
    }

    /// Waiting for tasks to be relaunched or to reach the running state.
    pub fn task_convergence() -> Self {
        Self::fixed(Duration::from_millis(5_000), Duration::from_millis(900_000))
    }

    /// Calculate delay before the next attempt.
    ///
    /// # Arguments
    /// * `attempts` - Number of attempts already made (1-indexed).
    ///
    /// Exponential example with multiplier=1s, max_wait=60s:
    /// - after attempt 1: 2s
    /// - after attempt 2: 4s
    /// - after attempt 5: 32s
    /// - after attempt 6: 60s (capped)
    pub fn next_delay(&self, attempts: u32) -> Duration {
        match &self.backoff {
            Backoff::Fixed { interval } => *interval,
            Backoff::Exponential {
                multiplier,
                max_wait,
            } => {
                let exp = 2f64.powi(attempts.min(63) as i32);
                let delay_secs = multiplier.as_secs_f64() * exp;
                if delay_secs >= max_wait.as_secs_f64() {
                    *max_wait
                } else {
                    Duration::from_secs_f64(delay_secs)
                }
            }
        }
    }

    /// Whether to give up after `attempts` attempts and `elapsed` time.
    pub fn should_stop(&self, attempts: u32, elapsed: Duration) -> bool {
        let by_attempts = self
            .stop_max_attempts
            .is_some_and(|max| attempts >= max);
        let by_delay = self.stop_max_delay.is_some_and(|max| elapsed >= max);
        by_attempts || by_delay
    }
}
