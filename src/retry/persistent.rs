//! Retry accounting that survives process restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::consumers::HandlerError;
use crate::retry::{backoff_delay, RetryDecision, RetryPolicy};

/// The distributed counter store backing [`PersistentRetryPolicy`].
///
/// The engine only ever issues point reads and atomic increments - the
/// increment MUST be atomic on the store side (think Redis `INCRBY`, not a
/// read-modify-write) so concurrent consumer processes sharing a key prefix
/// cannot lose updates.
#[async_trait::async_trait]
pub trait CounterStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    /// Atomically add `by` to the counter at `key`, returning the new value.
    /// Missing keys are treated as zero.
    async fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError>;
}

/// The counter store could not be reached or failed the operation.
///
/// Store outages never block message flow: the policy fails open and logs.
#[derive(Debug, thiserror::Error)]
#[error("the retry counter store is unavailable")]
pub struct StoreError(#[source] pub anyhow::Error);

/// A process-local [`CounterStore`].
///
/// Useful for tests and single-process deployments; it obviously does not
/// survive restarts, which is the whole point of the persistent policy - use
/// a store backed by Redis (or similar) in production.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, i64>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.counters.lock().await.get(key).copied())
    }

    async fn increment(&self, key: &str, by: i64) -> Result<i64, StoreError> {
        let mut counters = self.counters.lock().await;
        let value = counters.entry(key.to_owned()).or_insert(0);
        *value += by;
        Ok(*value)
    }
}

/// A retry policy whose attempt accounting lives in an external counter
/// store, keyed by `prefix + queue`.
///
/// Each decision reads the persisted failure count for the queue:
/// `remaining = max(0, max_retries - persisted)`, and the backoff exponent is
/// offset by the persisted count so delays keep growing across restarts
/// instead of starting over. Every failed attempt increments the counter by
/// one.
///
/// # Resetting on success
///
/// By default the counter is only ever incremented, never reset - a queue
/// that has burnt its budget stays exhausted until the counter is cleared
/// externally. Call [`reset_on_success`](Self::reset_on_success) to clear a
/// queue's counter whenever one of its deliveries completes successfully.
/// This is a deliberate choice point, not an oversight: which behaviour is
/// correct depends on whether the budget is meant to bound failures per
/// outage or per message lifetime.
///
/// # Store outages
///
/// Fail open: if the store cannot be read the decision is "retry allowed,
/// delay = base^attempt" and a warning is logged. Message flow never blocks
/// on the store.
pub struct PersistentRetryPolicy<S> {
    store: Arc<S>,
    key_prefix: String,
    max_retries: u32,
    base_secs: u32,
    reset_on_success: bool,
}

impl<S: CounterStore> PersistentRetryPolicy<S> {
    /// A policy over `store`, keying counters as `key_prefix + queue`.
    ///
    /// Defaults: 5 retries, base delay 2 seconds, no reset on success.
    pub fn new(store: Arc<S>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            max_retries: 5,
            base_secs: 2,
            reset_on_success: false,
        }
    }

    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn base_delay_secs(mut self, base_secs: u32) -> Self {
        self.base_secs = base_secs;
        self
    }

    /// Clear the queue's counter whenever a delivery completes successfully.
    #[must_use]
    pub fn reset_on_success(mut self, reset: bool) -> Self {
        self.reset_on_success = reset;
        self
    }

    fn key(&self, queue: &str) -> String {
        format!("{}{}", self.key_prefix, queue)
    }
}

#[async_trait::async_trait]
impl<S: CounterStore> RetryPolicy for PersistentRetryPolicy<S> {
    async fn decide(&self, queue: &str, attempt: u32) -> RetryDecision {
        match self.store.get(&self.key(queue)).await {
            Ok(persisted) => {
                let persisted = u32::try_from(persisted.unwrap_or(0).max(0)).unwrap_or(u32::MAX);
                let remaining = self.max_retries.saturating_sub(persisted);
                RetryDecision {
                    allow: attempt <= remaining,
                    // Offset the exponent so backoff keeps growing across
                    // restarts instead of resetting to the first step.
                    delay: backoff_delay(self.base_secs, attempt.saturating_add(persisted)),
                }
            }
            Err(e) => {
                tracing::warn!(
                    queue,
                    "retry counter store unreachable, failing open: {:#}",
                    e.0
                );
                RetryDecision {
                    allow: attempt <= self.max_retries,
                    delay: backoff_delay(self.base_secs, attempt),
                }
            }
        }
    }

    async fn record_failure(
        &self,
        queue: &str,
        _error: &HandlerError,
        _delay: Duration,
        _attempt: u32,
    ) {
        if let Err(e) = self.store.increment(&self.key(queue), 1).await {
            tracing::warn!(queue, "failed to persist retry counter: {:#}", e.0);
        }
    }

    async fn record_success(&self, queue: &str) {
        if !self.reset_on_success {
            return;
        }
        let key = self.key(queue);
        // The narrow store interface has no delete, so resetting is an
        // increment by the negated current value.
        match self.store.get(&key).await {
            Ok(Some(current)) if current != 0 => {
                if let Err(e) = self.store.increment(&key, -current).await {
                    tracing::warn!(queue, "failed to reset retry counter: {:#}", e.0);
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(queue, "failed to read retry counter for reset: {:#}", e.0);
            }
        }
    }
}
