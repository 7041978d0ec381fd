use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A counting admission gate bounding in-flight deliveries for one consumer.
///
/// Sized to the consumer's QoS: a delivery may begin processing only while
/// fewer than `limit` deliveries are received-but-not-yet-settled. The broker
/// transport is expected to stop delivering once its own prefetch window is
/// exhausted - this gate is the application-level mirror of that window,
/// capping handler concurrency rather than throttling the network.
#[derive(Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyGate {
    pub fn new(limit: u16) -> Self {
        let limit = usize::from(limit);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait until a processing slot is free and claim it.
    ///
    /// The slot is released when the returned permit is dropped - after the
    /// delivery's broker disposition has been emitted.
    pub async fn admit(&self) -> Result<AdmissionPermit, anyhow::Error> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("the concurrency gate was closed"))?;
        Ok(AdmissionPermit { _permit: permit })
    }

    /// Deliveries currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// A claimed processing slot; dropping it re-opens the gate for the next
/// delivery.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}
