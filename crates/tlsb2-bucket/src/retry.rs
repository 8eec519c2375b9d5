use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Bounded retry for network mutations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. `0` behaves as `1`.
    pub max_attempts: u32,
    /// Fixed pause between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// Every attempt failed; carries the last failure.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl RetryPolicy {
    /// A policy that tries once and never waits.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Run `attempt` until it succeeds or the attempt budget is spent.
    ///
    /// No delay follows the final failed attempt.
    pub async fn run<T, E, F, Fut>(&self, op: &str, mut attempt: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max = self.max_attempts.max(1);
        let mut n = 0;
        loop {
            n += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if n >= max => return Err(Exhausted { attempts: n, last: err }),
                Err(err) => {
                    warn!(op, attempt = n, max_attempts = max, error = %err, "attempt failed, retrying");
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }
    }
}
