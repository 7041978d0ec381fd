//! Retry policies.
//!
//! A [`RetryPolicy`] decides, after each failed invocation, whether the
//! dispatcher is allowed another attempt and how long to back off first.
//! Two implementations ship with the crate:
//!
//! - [`ExponentialBackoff`], an in-memory policy scoped to a single delivery;
//! - [`PersistentRetryPolicy`], which keeps its attempt accounting in an
//!   external [`CounterStore`] so a process restart does not grant a queue a
//!   fresh retry budget.

pub use persistent::{CounterStore, InMemoryCounterStore, PersistentRetryPolicy, StoreError};

mod persistent;

use std::time::Duration;

use crate::consumers::HandlerError;

/// The outcome of a retry decision: whether another attempt is allowed, and
/// how long to wait before making it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryDecision {
    pub allow: bool,
    pub delay: Duration,
}

/// Decides whether a failed delivery gets another attempt.
///
/// `attempt` is the 1-based count of failed invocations of the current
/// delivery so far: the first failure asks `decide(queue, 1)`.
#[async_trait::async_trait]
pub trait RetryPolicy: Send + Sync + 'static {
    async fn decide(&self, queue: &str, attempt: u32) -> RetryDecision;

    /// Fired after every failed attempt, before the backoff sleep.
    ///
    /// This is where persistent policies write their accounting. It must not
    /// fail the dispatch: implementations log their own errors and swallow
    /// them.
    async fn record_failure(
        &self,
        queue: &str,
        error: &HandlerError,
        delay: Duration,
        attempt: u32,
    ) {
        let _ = (queue, error, delay, attempt);
    }

    /// Fired after a delivery is processed successfully.
    ///
    /// The default is a no-op; see
    /// [`PersistentRetryPolicy::reset_on_success`] for the one policy that
    /// cares.
    async fn record_success(&self, queue: &str) {
        let _ = queue;
    }
}

/// `base^exponent` as a [`Duration`] in seconds, saturating instead of
/// overflowing for absurd configurations.
pub(crate) fn backoff_delay(base_secs: u32, exponent: u32) -> Duration {
    Duration::from_secs(u64::from(base_secs).saturating_pow(exponent))
}

/// In-memory exponential backoff, scoped to one delivery.
///
/// Allows up to `max_retries` failed attempts (default 3) and sleeps
/// `base^attempt` seconds between them (default base 2, i.e. 2s, 4s, 8s).
/// No jitter. Attempt accounting lives on the dispatch stack and resets with
/// every new delivery.
#[derive(Clone, Copy, Debug)]
pub struct ExponentialBackoff {
    max_retries: u32,
    base_secs: u32,
}

impl ExponentialBackoff {
    pub fn new(max_retries: u32, base_secs: u32) -> Self {
        Self {
            max_retries,
            base_secs,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

#[async_trait::async_trait]
impl RetryPolicy for ExponentialBackoff {
    async fn decide(&self, _queue: &str, attempt: u32) -> RetryDecision {
        RetryDecision {
            allow: attempt <= self.max_retries,
            delay: backoff_delay(self.base_secs, attempt),
        }
    }
}
