//! Retry policies for the external boundaries.
//!
//! Each call site declares its own policy: page/PDF fetches use a fixed wait,
//! the summarization service uses exponential backoff with jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// How long to wait before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same wait after every failure.
    Fixed(Duration),
    /// `base * 2^attempt`.
    Exponential { base: Duration },
}

/// Bounded retry policy: a retry budget, a backoff shape and optional jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures tolerated before giving up (the first call is not a retry).
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Uniform random extra wait in `[0, jitter)`.
    pub jitter: Duration,
}

/// Returned by [`RetryPolicy::run`] once the budget is spent.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Retries performed before giving up.
    pub retries: u32,
    /// Error of the final attempt.
    pub last: E,
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, wait: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Fixed(wait),
            jitter: Duration::ZERO,
        }
    }

    pub fn exponential(max_retries: u32, base: Duration, jitter: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential { base },
            jitter,
        }
    }

    /// No retries, no waiting.
    pub fn none() -> Self {
        Self::fixed(0, Duration::ZERO)
    }

    /// Wait before retrying after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Fixed(wait) => wait,
            Backoff::Exponential { base } => {
                base.saturating_mul(2u32.saturating_pow(attempt.min(31)))
            }
        };
        base + self.jitter_sample()
    }

    fn jitter_sample(&self) -> Duration {
        let max_ms = self.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..max_ms))
    }

    /// Run `op` until it succeeds or `max_retries` retries have failed.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, Exhausted<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut retries = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retries < self.max_retries => {
                    retries += 1;
                    let wait = self.delay(retries);
                    warn!(
                        what,
                        retry = retries,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(last) => return Err(Exhausted { retries, last }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(3));
        assert_eq!(policy.delay(1), Duration::from_secs(3));
        assert_eq!(policy.delay(5), Duration::from_secs(3));
    }

    #[test]
    fn exponential_delay_doubles() {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(2), Duration::ZERO);
        let waits: Vec<u64> = (1..=6).map(|a| policy.delay(a).as_secs()).collect();
        assert_eq!(waits, vec![4, 8, 16, 32, 64, 128]);
    }

    #[test]
    fn jitter_stays_below_bound() {
        let policy =
            RetryPolicy::exponential(5, Duration::from_secs(2), Duration::from_secs(2));
        for _ in 0..50 {
            let wait = policy.delay(1);
            assert!(wait >= Duration::from_secs(4));
            assert!(wait < Duration::from_secs(6));
        }
    }

    #[tokio::test]
    async fn run_retries_until_success() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        let result = policy
            .run("flaky", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { if n < 3 { Err("boom") } else { Ok(n) } }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn run_gives_up_after_budget() {
        let calls = Cell::new(0);
        let policy = RetryPolicy::fixed(2, Duration::ZERO);

        let result: Result<(), _> = policy
            .run("always-fails", || {
                calls.set(calls.get() + 1);
                async { Err("down") }
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.retries, 2);
        assert_eq!(exhausted.last, "down");
        // First call plus two retries
        assert_eq!(calls.get(), 3);
    }
}
