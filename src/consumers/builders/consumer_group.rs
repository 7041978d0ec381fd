use std::sync::Arc;

use futures_util::{future::try_join_all, stream::FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;
use shutdown_handler::ShutdownHandler;

use crate::consumers::builders::consumer_group_configuration::{
    ConsumerGroupConfiguration, ConsumerGroupConfigurationBuilder,
};
use crate::consumers::builders::message_handler::MessageHandler;
use crate::consumers::consumer::{Consumer, GroupConsumer};
use crate::consumers::dispatcher::Dispatcher;
use crate::consumers::ConcurrencyGate;
use crate::serialization::{JsonSerializer, MessageSerializer};
use crate::transport::Transport;

/// A collection of queue consumers sharing the same context and transport.
///
/// `ConsumerGroup` is the main entrypoint if you want to pull and process
/// messages from queues.
///
/// # How do I build a `ConsumerGroup`?
///
/// `ConsumerGroup` provides a fluent API to add configuration step-by-step,
/// known as "builder pattern" in Rust.
/// The starting point is [`ConsumerGroup::builder`].
///
/// Once you are done with group-level configuration, you can start adding
/// message handlers using
/// [`ConsumerGroupConfigurationBuilder::message_handler`].
///
/// # Layered configuration
///
/// `ConsumerGroup` supports a layered approach to configuring message
/// handlers.
///
/// Certain types of configuration values can only be added at the group level
/// (e.g. transport, context, queue name prefix, serializer) while others can
/// be set both at the group and message handler level (e.g. retry policy,
/// fallback resolver).
///
/// Check out the builder methods for an in-depth explanation for each
/// configuration option.
pub struct ConsumerGroup {
    consumers: Vec<Box<dyn GroupConsumer>>,
}

impl ConsumerGroup {
    /// Start building a [`ConsumerGroup`].
    ///
    /// You will need a transport and a context.
    ///
    /// # Context
    ///
    /// In message handlers you will often need to use resources with a
    /// significant initialisation cost - e.g. a HTTP client, a database
    /// connection, etc.
    /// Instead of creating a new instance of these expensive resources every
    /// single time you handle a message, you can put those resources in the
    /// _context_.
    ///
    /// The context is created once, before the consumer group is built, and
    /// each message handler gets a shared reference (&) to the context
    /// together with the incoming message.
    ///
    /// ## Implementation Notes
    ///
    /// The context is wrapped in an `Arc` by `ConsumerGroup` - if your context
    /// is already behind an `Arc` pointer, it won't be "double-wrapped".
    pub fn builder<Context, Tr>(
        transport: Arc<Tr>,
        context: impl Into<Arc<Context>>,
    ) -> ConsumerGroupConfigurationBuilder<Context, Tr, JsonSerializer>
    where
        Context: Send + Sync + 'static,
        Tr: Transport,
    {
        ConsumerGroupConfigurationBuilder::new(transport, context.into())
    }

    /// You can call `run_until_stopped` to start consuming messages from the
    /// queues you bound. As the name implies, `run_until_stopped` returns
    /// control to the caller only if:
    /// - one of the message handlers crashes (e.g. the delivery stream ends);
    /// - the application is stopped via SIGTERM.
    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        self.run_until_shutdown(ShutdownHandler::sigterm()?).await
    }

    /// You can call `run_until_shutdown` to start consuming messages from the
    /// queues you bound. As the name implies, `run_until_shutdown` returns
    /// control to the caller only if:
    /// - one of the message handlers crashes (e.g. the delivery stream ends);
    /// - the application is stopped via the shutdown handler.
    #[tracing::instrument(skip_all, name = "consumer_group_run")]
    pub async fn run_until_shutdown(
        self,
        shutdown: Arc<ShutdownHandler>,
    ) -> Result<(), anyhow::Error> {
        let mut consumers = FuturesUnordered::from_iter(
            self.consumers
                .into_iter()
                .map(|c| {
                    let shutdown = shutdown.clone();
                    async move {
                        c.run_until_shutdown(Box::pin(async move {
                            shutdown.wait_for_signal().await
                        }))
                        .await
                    }
                })
                .map(tokio::spawn),
        );

        // One failing consumer takes the whole group down: trigger the
        // shutdown so the siblings stop too, then wait for all of them.
        while let Some(res) = consumers.next().await {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Consumer failed: {}", e),
                Err(e) => tracing::error!("Consumer task panicked: {}", e),
            }
            shutdown.shutdown();
        }
        Ok(())
    }
}

/// A builder to register message handlers once the group-level configuration
/// of a [`ConsumerGroup`] has been finalised.
///
/// Use [`ConsumerGroup::builder`] as entrypoint.
pub struct ConsumerGroupBuilder<Context, Tr, S = JsonSerializer>
where
    Context: Send + Sync + 'static,
{
    pub(super) group_configuration: ConsumerGroupConfiguration<Context, Tr, S>,
    pub(super) consumers: Vec<Box<dyn GroupConsumer>>,
}

impl<Context, Tr, S> ConsumerGroupBuilder<Context, Tr, S>
where
    Context: Send + Sync + 'static,
    Tr: Transport,
    S: MessageSerializer,
{
    /// Add another [`MessageHandler`] to the [`ConsumerGroup`].
    ///
    /// Check out [`MessageHandler::builder`] to build out a handler.
    ///
    /// Handlers in the same group can consume different message types: the
    /// message type is fixed per handler, not per group.
    #[must_use]
    pub fn message_handler<Message>(
        mut self,
        message_handler: MessageHandler<Context, Message>,
    ) -> Self
    where
        Message: DeserializeOwned + Send + Sync + 'static,
    {
        let group = &self.group_configuration;

        let MessageHandler {
            mut options,
            middleware_chain,
            retry_policy,
            fallback_resolver,
            handler,
        } = message_handler;

        // Add the group prefix to the queue name, if specified.
        if let Some(prefix) = group.queue_name_prefix.as_ref() {
            options.queue = format!("{0}_{1}", prefix, options.queue);
        }

        // Use the handler-level retry policy and fallback resolver, if
        // provided. Rely on the group-level ones otherwise.
        let retry_policy = retry_policy.unwrap_or_else(|| group.retry_policy.clone());
        let fallback_resolver =
            fallback_resolver.unwrap_or_else(|| group.fallback_resolver.clone());

        let gate = ConcurrencyGate::new(options.qos);
        let dispatcher = Arc::new(Dispatcher {
            transport: group.transport.clone(),
            serializer: group.serializer.clone(),
            context: group.context.clone(),
            handler,
            middleware_chain,
            retry_policy,
            fallback_resolver,
            options,
        });

        self.consumers.push(Box::new(Consumer {
            dispatcher,
            gate,
            exit_after: group.exit_after,
        }));
        self
    }

    /// Once you have added all your [`MessageHandler`]s to the
    /// [`ConsumerGroup`], you can finalise the group by calling `build`.
    ///
    /// When you `.await` `build`, consumer options are validated and, for
    /// handlers with auto-declare enabled, the queue topology is set up with
    /// the transport.
    ///
    /// `build` does NOT trigger consumption of messages!
    /// Check out [`ConsumerGroup::run_until_stopped`].
    pub async fn build(self) -> Result<ConsumerGroup, anyhow::Error> {
        let Self { consumers, .. } = self;

        try_join_all(consumers.iter().map(|c| c.prepare())).await?;

        Ok(ConsumerGroup { consumers })
    }
}
