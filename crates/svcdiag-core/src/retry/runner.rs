//! Retrying wrapper: drives an async operation under a `RetryPolicy`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::RetryPolicy;
use crate::ports::Clock;

/// Why a retried operation finally gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Budget exhausted; carries the last error.
    #[error("gave up after {attempts} attempts in {elapsed:?}: {source}")]
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: E,
    },

    /// Budget exhausted while the operation kept returning rejected results.
    #[error("result still rejected after {attempts} attempts in {elapsed:?}")]
    StillRejected { attempts: u32, elapsed: Duration },

    /// The error was classified as not worth retrying.
    #[error("permanent failure on attempt {attempts}: {source}")]
    Permanent {
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::StillRejected { attempts, .. }
            | RetryError::Permanent { attempts, .. } => *attempts,
        }
    }

    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::Permanent { source, .. } => {
                Some(source)
            }
            RetryError::StillRejected { .. } => None,
        }
    }
}

/// Wraps operations with a policy and a clock.
///
/// # Example
/// ```ignore
/// let retrying = Retrying::new(RetryPolicy::broker_poll(), clock);
/// retrying.call_until(|| check_brokers(), |ok| !*ok).await?;
/// ```
#[derive(Clone)]
pub struct Retrying {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl Retrying {
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    /// Retry on every error until success or budget exhaustion.
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run(op, |_: &T| false, |_: &E| true).await
    }

    /// Retry while `retry_on_result` returns true for the produced value.
    pub async fn call_until<T, E, F, Fut, P>(
        &self,
        op: F,
        retry_on_result: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&T) -> bool,
    {
        self.run(op, retry_on_result, |_: &E| true).await
    }

    /// Retry only errors accepted by `retry_on_error`; others fail at once.
    pub async fn call_if<T, E, F, Fut, R>(
        &self,
        op: F,
        retry_on_error: R,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        self.run(op, |_: &T| false, retry_on_error).await
    }

    async fn run<T, E, F, Fut, P, R>(
        &self,
        mut op: F,
        retry_on_result: P,
        retry_on_error: R,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&T) -> bool,
        R: Fn(&E) -> bool,
    {
        let started = self.clock.now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let failure = match op().await {
                Ok(value) if !retry_on_result(&value) => return Ok(value),
                Ok(_) => None,
                Err(e) if !retry_on_error(&e) => {
                    return Err(RetryError::Permanent {
                        attempts,
                        source: e,
                    });
                }
                Err(e) => Some(e),
            };

            let elapsed = self.clock.now().saturating_duration_since(started);
            if self.policy.should_stop(attempts, elapsed) {
                return Err(match failure {
                    Some(source) => RetryError::Exhausted {
                        attempts,
                        elapsed,
                        source,
                    },
                    None => RetryError::StillRejected { attempts, elapsed },
                });
            }

            let delay = self.policy.next_delay(attempts);
            debug!(attempts, ?elapsed, ?delay, "retrying");
            self.clock.sleep(delay).await;
        }
    }
}
