//! A collection of fallback resolvers.

use crate::consumers::{ConsumerState, DispatchFailure, FallbackResolver, MessageHeader};

/// Acknowledge a delivery whose retries are exhausted, consuming it.
///
/// The default resolver. Without a dead-letter target this discards the
/// message - a documented trade-off that keeps poison messages from cycling
/// through the queue forever.
pub struct AckOnExhaustion;

#[async_trait::async_trait]
impl FallbackResolver for AckOnExhaustion {
    async fn resolve(&self, header: &MessageHeader, error: &DispatchFailure) -> ConsumerState {
        tracing::warn!(
            queue = %header.queue,
            message_id = %header.id,
            "giving up on message, acknowledging: {:#}",
            error
        );
        ConsumerState::Ack
    }
}

/// Reject without requeue, letting the broker dead-letter the message if the
/// queue has a dead-letter target (and drop it otherwise).
pub struct DeadLetterOnExhaustion;

#[async_trait::async_trait]
impl FallbackResolver for DeadLetterOnExhaustion {
    async fn resolve(&self, _header: &MessageHeader, _error: &DispatchFailure) -> ConsumerState {
        ConsumerState::NackDiscard
    }
}

/// Hand the message back to the queue for redelivery.
///
/// Subject to the consumer's `requeue_on_failure` option: when that is off,
/// the dispatcher demotes the requeue to a discard.
pub struct RequeueOnExhaustion;

#[async_trait::async_trait]
impl FallbackResolver for RequeueOnExhaustion {
    async fn resolve(&self, _header: &MessageHeader, _error: &DispatchFailure) -> ConsumerState {
        ConsumerState::NackRequeue
    }
}
