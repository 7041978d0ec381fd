use crate::consumers::{DispatchFailure, MessageHeader};

/// The terminal disposition of a delivery - the sole vocabulary fallback
/// resolution may speak.
///
/// This is the single point where "should the broker see this message as
/// processed" is decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    /// Positively acknowledge: the broker removes the message from the queue.
    Ack,
    /// Reject and requeue: the message becomes immediately available again.
    ///
    /// Only honoured when the consumer's `requeue_on_failure` option is set;
    /// demoted to [`NackDiscard`](Self::NackDiscard) otherwise, to break
    /// infinite requeue cycles.
    NackRequeue,
    /// Reject without requeue: the broker dead-letters the message if the
    /// queue has a dead-letter target configured, and drops it otherwise.
    NackDiscard,
}

/// Decides the terminal disposition of a delivery once retries are exhausted
/// (or the failure was never retryable to begin with).
///
/// # Use case
///
/// The dispatcher guarantees every delivery ends in exactly one broker
/// disposition. When processing cannot succeed, something has to pick which
/// one - that is the fallback resolver. It is consulted only after every
/// middleware's `on_fallback` declined to claim the decision.
///
/// # Plug and play implementations
///
/// Ready-to-go resolvers live in the [`hooks::fallback`] module -
/// [`AckOnExhaustion`] (the default), [`DeadLetterOnExhaustion`] and
/// [`RequeueOnExhaustion`].
///
/// # A word on the default
///
/// The default, [`AckOnExhaustion`], acknowledges messages even on
/// unrecoverable errors: without a dead-letter target this silently discards
/// them. That is a deliberate safety valve against indefinite requeue loops,
/// not an accident - configure a dead-letter exchange or a stricter resolver
/// when losing messages is worse than redelivering them.
///
/// [`hooks::fallback`]: crate::consumers::hooks::fallback
/// [`AckOnExhaustion`]: crate::consumers::hooks::fallback::AckOnExhaustion
/// [`DeadLetterOnExhaustion`]: crate::consumers::hooks::fallback::DeadLetterOnExhaustion
/// [`RequeueOnExhaustion`]: crate::consumers::hooks::fallback::RequeueOnExhaustion
#[async_trait::async_trait]
pub trait FallbackResolver: Send + Sync + 'static {
    async fn resolve(&self, header: &MessageHeader, error: &DispatchFailure) -> ConsumerState;
}
