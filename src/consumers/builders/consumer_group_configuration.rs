use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::consumers::builders::consumer_group::ConsumerGroupBuilder;
use crate::consumers::builders::message_handler::MessageHandler;
use crate::consumers::hooks::fallback::AckOnExhaustion;
use crate::consumers::FallbackResolver;
use crate::retry::{ExponentialBackoff, RetryPolicy};
use crate::serialization::{JsonSerializer, MessageSerializer};
use crate::transport::Transport;

/// Group-level configuration values for a [`ConsumerGroup`](super::ConsumerGroup).
///
/// Use [`ConsumerGroupConfigurationBuilder`] to build an instance of
/// `ConsumerGroupConfiguration`.
pub(super) struct ConsumerGroupConfiguration<Context, Tr, S>
where
    Context: Send + Sync + 'static,
{
    pub(super) transport: Arc<Tr>,
    pub(super) context: Arc<Context>,
    pub(super) serializer: Arc<S>,
    pub(super) queue_name_prefix: Option<String>,
    pub(super) retry_policy: Arc<dyn RetryPolicy>,
    pub(super) fallback_resolver: Arc<dyn FallbackResolver>,
    pub(super) exit_after: Option<usize>,
}

/// A builder for group-level configuration of a [`ConsumerGroup`](super::ConsumerGroup).
///
/// Use [`ConsumerGroup::builder`](super::ConsumerGroup::builder) as entrypoint.
pub struct ConsumerGroupConfigurationBuilder<Context, Tr, S = JsonSerializer>(
    ConsumerGroupConfiguration<Context, Tr, S>,
)
where
    Context: Send + Sync + 'static;

impl<Context, Tr> ConsumerGroupConfigurationBuilder<Context, Tr, JsonSerializer>
where
    Context: Send + Sync + 'static,
    Tr: Transport,
{
    pub(super) fn new(transport: Arc<Tr>, context: Arc<Context>) -> Self {
        Self(ConsumerGroupConfiguration {
            transport,
            context,
            serializer: Arc::new(JsonSerializer),
            queue_name_prefix: None,
            // A small, bounded budget with exponential spacing.
            retry_policy: Arc::new(ExponentialBackoff::default()),
            // We default to acknowledging exhausted messages.
            // It minimises surprising behaviour/phenomena in production:
            // without a dead-letter setup, discarding and acking are
            // equivalent, while requeueing can loop forever.
            fallback_resolver: Arc::new(AckOnExhaustion),
            // By default, the consumer group will continue to consume
            // messages indefinitely.
            exit_after: None,
        })
    }
}

impl<Context, Tr, S> ConsumerGroupConfigurationBuilder<Context, Tr, S>
where
    Context: Send + Sync + 'static,
    Tr: Transport,
    S: MessageSerializer,
{
    /// Add a prefix to the name of queues used by message handlers in the group.
    ///
    /// E.g. `test` as prefix will give you `test_X` queue names.
    #[must_use]
    pub fn queue_name_prefix<T: Into<String>>(mut self, prefix: T) -> Self {
        self.0.queue_name_prefix = Some(prefix.into());
        self
    }

    /// Replace the serializer used to decode incoming message payloads.
    ///
    /// All handlers in the group share one serializer. If not configured,
    /// payloads are decoded as JSON via [`JsonSerializer`].
    #[must_use]
    pub fn with_serializer<S2: MessageSerializer>(
        self,
        serializer: S2,
    ) -> ConsumerGroupConfigurationBuilder<Context, Tr, S2> {
        let ConsumerGroupConfiguration {
            transport,
            context,
            serializer: _,
            queue_name_prefix,
            retry_policy,
            fallback_resolver,
            exit_after,
        } = self.0;
        ConsumerGroupConfigurationBuilder(ConsumerGroupConfiguration {
            transport,
            context,
            serializer: Arc::new(serializer),
            queue_name_prefix,
            retry_policy,
            fallback_resolver,
            exit_after,
        })
    }

    /// The retry policy decides, after each failed processing attempt, whether
    /// another attempt is allowed and how long to wait before it.
    ///
    /// If not configured, the group uses [`ExponentialBackoff`]'s defaults.
    /// The group-level policy can be overridden for a specific handler via
    /// [`MessageHandlerBuilder::retry_policy`].
    ///
    /// Check out [`RetryPolicy`]'s documentation for more details.
    ///
    /// [`MessageHandlerBuilder::retry_policy`]: super::MessageHandlerBuilder::retry_policy
    #[must_use]
    pub fn retry_policy<P: RetryPolicy>(self, policy: P) -> Self {
        self.dyn_retry_policy(Arc::new(policy))
    }

    /// A version of [`ConsumerGroupConfigurationBuilder::retry_policy`] for
    /// already Arc-ed policies.
    ///
    /// Useful for sharing one stateful policy across groups.
    #[must_use]
    pub fn dyn_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.0.retry_policy = policy;
        self
    }

    /// The fallback resolver decides the final broker disposition of a message
    /// whose retry budget is exhausted (or that failed to deserialize).
    ///
    /// If not configured, exhausted messages are acknowledged (see
    /// [`AckOnExhaustion`]). The group-level resolver can be overridden for a
    /// specific handler via [`MessageHandlerBuilder::fallback_resolver`].
    ///
    /// Check out [`FallbackResolver`]'s documentation for more details.
    ///
    /// [`MessageHandlerBuilder::fallback_resolver`]: super::MessageHandlerBuilder::fallback_resolver
    #[must_use]
    pub fn fallback_resolver<F: FallbackResolver>(self, resolver: F) -> Self {
        self.dyn_fallback_resolver(Arc::new(resolver))
    }

    /// A version of [`ConsumerGroupConfigurationBuilder::fallback_resolver`]
    /// for already Arc-ed resolvers.
    #[must_use]
    pub fn dyn_fallback_resolver(mut self, resolver: Arc<dyn FallbackResolver>) -> Self {
        self.0.fallback_resolver = resolver;
        self
    }

    /// By default, a [`ConsumerGroup`] keeps running indefinitely, consuming
    /// messages as soon as they are available in the queues bound by its
    /// [`MessageHandler`]s.
    ///
    /// With `exit_after` you can configure the [`MessageHandler`]s in a
    /// [`ConsumerGroup`] to stop consuming messages as soon as they have
    /// started processing `max_n_messages`.
    ///
    /// This is mostly useful for testing purposes: it allows you to know, when
    /// the group has exited, that a certain number of messages have been
    /// processed and you can start performing your assertions around the
    /// side-effects produced by said processing.
    ///
    /// [`ConsumerGroup`]: super::ConsumerGroup
    /// [`MessageHandler`]: super::MessageHandler
    #[must_use]
    pub fn exit_after(mut self, max_n_messages: usize) -> Self {
        self.0.exit_after = Some(max_n_messages);
        self
    }

    /// Finalise the group-level configuration and register the first
    /// [`MessageHandler`].
    ///
    /// Further handlers are added on the returned [`ConsumerGroupBuilder`];
    /// handlers with different message types can live in the same group, and
    /// the group-level configuration applies to all of them.
    ///
    /// [`MessageHandler`]: super::MessageHandler
    pub fn message_handler<Message>(
        self,
        message_handler: MessageHandler<Context, Message>,
    ) -> ConsumerGroupBuilder<Context, Tr, S>
    where
        Message: DeserializeOwned + Send + Sync + 'static,
    {
        ConsumerGroupBuilder {
            group_configuration: self.0,
            consumers: vec![],
        }
        .message_handler(message_handler)
    }
}
