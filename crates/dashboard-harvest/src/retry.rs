//! Bounded retry with a fixed delay schedule.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy: one initial attempt plus one retry per scheduled delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

/// The last error of an exhausted retry policy.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: usize,
    pub last_error: E,
}

impl RetryPolicy {
    /// A policy that waits `delays[i]` before attempt `i + 2`.
    pub fn with_schedule(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Build a schedule from millisecond delays.
    pub fn from_millis(delays: &[u64]) -> Self {
        Self::with_schedule(delays.iter().copied().map(Duration::from_millis).collect())
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Run `op` until it succeeds or the schedule is exhausted.
    ///
    /// `label` only appears in log output.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        let mut delays = self.delays.iter();
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => match delays.next() {
                    Some(delay) => {
                        warn!(
                            "{label}: attempt {attempt}/{} failed: {e}; retrying in {}ms",
                            self.max_attempts(),
                            delay.as_millis()
                        );
                        tokio::time::sleep(*delay).await;
                        attempt += 1;
                    }
                    None => {
                        return Err(RetryExhausted {
                            attempts: attempt,
                            last_error: e,
                        })
                    }
                },
            }
        }
    }
}
