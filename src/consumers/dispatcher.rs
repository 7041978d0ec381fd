use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::consumers::{
    ConsumerOptions, ConsumerState, DispatchFailure, ErrorType, FallbackResolver, Handler,
    MessageHeader, Next, ProcessingMiddleware,
};
use crate::retry::RetryPolicy;
use crate::serialization::MessageSerializer;
use crate::transport::{Delivery, Transport};

/// The per-delivery orchestrator: deserialize, run the middleware chain under
/// the retry policy, resolve the fallback on exhaustion, emit the broker
/// disposition.
///
/// Users of the crate are never exposed to `Dispatcher` directly - it's an
/// implementation detail assembled by the consumer-group builders.
pub(super) struct Dispatcher<C, T, S, Tr>
where
    C: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub(super) transport: Arc<Tr>,
    pub(super) serializer: Arc<S>,
    pub(super) context: Arc<C>,
    pub(super) handler: Arc<dyn Handler<C, T>>,
    pub(super) middleware_chain: Vec<Arc<dyn ProcessingMiddleware<C, T>>>,
    pub(super) retry_policy: Arc<dyn RetryPolicy>,
    pub(super) fallback_resolver: Arc<dyn FallbackResolver>,
    pub(super) options: ConsumerOptions,
}

impl<C, T, S, Tr> Dispatcher<C, T, S, Tr>
where
    C: Send + Sync + 'static,
    T: DeserializeOwned + Send + Sync + 'static,
    S: MessageSerializer,
    Tr: Transport,
{
    /// Process one delivery end to end.
    ///
    /// Every code path below terminates in exactly one `finalize` call: a
    /// delivery is never left undecided and never settled twice.
    #[tracing::instrument(
        name = "dispatch_message",
        skip_all,
        fields(queue = %self.options.queue, delivery_tag = delivery.delivery_tag),
        level = tracing::Level::DEBUG
    )]
    pub(super) async fn dispatch(&self, delivery: Delivery, cancellation: CancellationToken) {
        let mut header = MessageHeader::from_delivery(&self.options.queue, &delivery);

        // Poison messages are not retried: a payload that does not parse now
        // will not parse on the next attempt either.
        let message: T = match self.serializer.deserialize(&delivery.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    queue = %header.queue,
                    message_id = %header.id,
                    "failed to deserialize incoming message, routing to fallback: {:#}",
                    e
                );
                let failure = DispatchFailure::Deserialization(e);
                let state = self.resolve_fallback(&header, None, &failure).await;
                self.finalize(&header, state).await;
                return;
            }
        };

        // Invocation loop. `attempt` counts failed invocations so far;
        // attempts of one delivery are strictly sequential.
        let mut attempt: u32 = 0;
        let last_error = loop {
            header.retry_count = attempt;

            let outcome = {
                let next = Next {
                    handler: self.handler.as_ref(),
                    next_middleware: &self.middleware_chain,
                };
                let incoming = crate::consumers::Incoming {
                    context: self.context.clone(),
                    header: &header,
                    message: &message,
                    cancellation: cancellation.child_token(),
                };
                next.run(incoming).await
            };

            let error = match outcome {
                Ok(()) => {
                    self.retry_policy.record_success(&header.queue).await;
                    self.finalize(&header, ConsumerState::Ack).await;
                    return;
                }
                Err(error) => error,
            };

            attempt += 1;
            // Failure observers run innermost-first; they cannot affect the
            // outcome and their own failures stay on their side of the fence.
            for middleware in self.middleware_chain.iter().rev() {
                middleware.on_failure(&header, &error, attempt, &message).await;
            }

            if error.error_type == ErrorType::Fatal {
                break error;
            }

            let decision = self.retry_policy.decide(&header.queue, attempt).await;
            self.retry_policy
                .record_failure(&header.queue, &error, decision.delay, attempt)
                .await;

            if !decision.allow {
                break error;
            }

            tracing::debug!(
                queue = %header.queue,
                message_id = %header.id,
                attempt,
                delay_ms = decision.delay.as_millis() as u64,
                "retrying message after backoff"
            );

            // Suspend rather than hold the worker: the admission slot stays
            // claimed (the delivery is still unacknowledged) but the runtime
            // thread is free.
            let cancelled = tokio::select! {
                biased;
                _ = cancellation.cancelled() => true,
                _ = tokio::time::sleep(decision.delay) => false,
            };
            if cancelled {
                // Shutdown while waiting out the backoff. No disposition has
                // been emitted yet on this path, so a single requeueing nack
                // hands the message back without double-settling.
                tracing::info!(
                    queue = %header.queue,
                    message_id = %header.id,
                    "shutdown during retry backoff, returning message to the queue"
                );
                self.settle(&header, true, /* requeue */ true).await;
                return;
            }
        };

        // Exhausted (or fatal): let the chain, then the resolver, decide.
        let failure = DispatchFailure::Handler {
            error: last_error,
            attempts: attempt,
        };
        let state = self.resolve_fallback(&header, Some(&message), &failure).await;
        self.finalize(&header, state).await;
    }

    /// Walk the middleware chain innermost-first; the first middleware to
    /// claim the fallback wins, the registered resolver is the backstop.
    async fn resolve_fallback(
        &self,
        header: &MessageHeader,
        message: Option<&T>,
        failure: &DispatchFailure,
    ) -> ConsumerState {
        for middleware in self.middleware_chain.iter().rev() {
            if let Some(state) = middleware.on_fallback(header, message, failure).await {
                return state;
            }
        }
        self.fallback_resolver.resolve(header, failure).await
    }

    /// Map the terminal [`ConsumerState`] onto a broker action and emit it.
    async fn finalize(&self, header: &MessageHeader, state: ConsumerState) {
        match state {
            ConsumerState::Ack => self.settle(header, false, false).await,
            ConsumerState::NackRequeue => {
                if self.options.requeue_on_failure {
                    self.settle(header, true, true).await
                } else {
                    // Demoted to a discard: unconditional requeueing of a
                    // message that keeps failing is an infinite cycle.
                    self.settle(header, true, false).await
                }
            }
            ConsumerState::NackDiscard => self.settle(header, true, false).await,
        }
    }

    async fn settle(&self, header: &MessageHeader, negatively: bool, requeue: bool) {
        let result = if negatively {
            self.transport.nack(header.delivery_tag, requeue).await
        } else {
            self.transport.ack(header.delivery_tag).await
        };
        if let Err(e) = result {
            tracing::error!(
                queue = %header.queue,
                delivery_tag = header.delivery_tag,
                "failed to settle delivery with the broker: {:#}",
                e
            );
        }
    }
}
