use std::sync::Arc;

use crate::consumers::{
    handler::{AsyncClosure, ClosureHandler},
    ConsumerOptions, FallbackResolver, Handler, ProcessingMiddleware,
};
use crate::retry::RetryPolicy;

/// A handler processing messages from one queue.
///
/// Use [`MessageHandler::builder`] to start composing a `MessageHandler`
/// using a fluent builder API.
///
/// # `MessageHandler` vs `ConsumerGroup`
///
/// A `MessageHandler` is always part of a [`ConsumerGroup`] - it relies on
/// its context and inherits its group-level configuration.
///
/// It is possible to override some group-level configuration for a specific
/// message handler (see [`MessageHandlerBuilder::retry_policy`] and
/// [`MessageHandlerBuilder::fallback_resolver`]).
///
/// [`ConsumerGroup`]: super::ConsumerGroup
pub struct MessageHandler<Context, Message>
where
    Context: Send + Sync + 'static,
    Message: Send + Sync + 'static,
{
    pub(in crate::consumers) options: ConsumerOptions,
    pub(in crate::consumers) middleware_chain:
        Vec<Arc<dyn ProcessingMiddleware<Context, Message>>>,
    pub(in crate::consumers) retry_policy: Option<Arc<dyn RetryPolicy>>,
    pub(in crate::consumers) fallback_resolver: Option<Arc<dyn FallbackResolver>>,
    pub(in crate::consumers) handler: Arc<dyn Handler<Context, Message>>,
}

impl<Context, Message> MessageHandler<Context, Message>
where
    Context: Send + Sync + 'static,
    Message: Send + Sync + 'static,
{
    /// Start building a [`MessageHandler`].
    ///
    /// You need to provide the [`ConsumerOptions`] of the queue you want to
    /// consume messages from; they are validated when the group is built.
    pub fn builder(options: ConsumerOptions) -> MessageHandlerBuilder<Context, Message> {
        MessageHandlerBuilder::new(options)
    }
}

/// A builder to compose a [`MessageHandler`] with a fluent API.
///
/// Use [`MessageHandler::builder`] as entrypoint.
pub struct MessageHandlerBuilder<Context, Message>
where
    Context: Send + Sync + 'static,
    Message: Send + Sync + 'static,
{
    options: ConsumerOptions,
    middleware_chain: Vec<Arc<dyn ProcessingMiddleware<Context, Message>>>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    fallback_resolver: Option<Arc<dyn FallbackResolver>>,
}

impl<Context, Message> MessageHandlerBuilder<Context, Message>
where
    Context: Send + Sync + 'static,
    Message: Send + Sync + 'static,
{
    fn new(options: ConsumerOptions) -> Self {
        Self {
            options,
            middleware_chain: vec![],
            retry_policy: None,
            fallback_resolver: None,
        }
    }

    /// You can add processing middleware to inject logic before and after the
    /// handler logic.
    ///
    /// Middlewares are executed in the order they are registered: the first
    /// registered middleware executes first on the way in and last on the way
    /// out.
    ///
    /// Check out [`ProcessingMiddleware`]'s documentation for more details.
    #[must_use]
    pub fn with_processing_middleware<M: ProcessingMiddleware<Context, Message>>(
        self,
        middleware: M,
    ) -> Self {
        self.with_dyn_processing_middleware(Arc::new(middleware))
    }

    /// Append dynamic processing middleware logic, see
    /// [`MessageHandlerBuilder::with_processing_middleware`].
    #[must_use]
    pub fn with_dyn_processing_middleware(
        mut self,
        middleware: Arc<dyn ProcessingMiddleware<Context, Message>>,
    ) -> Self {
        self.middleware_chain.push(middleware);
        self
    }

    /// Append multiple dynamic processing middlewares, see
    /// [`MessageHandlerBuilder::with_processing_middleware`].
    #[must_use]
    pub fn with_processing_middlewares<I>(mut self, middlewares: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn ProcessingMiddleware<Context, Message>>>,
    {
        self.middleware_chain.extend(middlewares);
        self
    }

    /// Override the group-level retry policy for this handler.
    ///
    /// Check out [`RetryPolicy`]'s documentation for more details.
    #[must_use]
    pub fn retry_policy<P: RetryPolicy>(self, policy: P) -> Self {
        self.dyn_retry_policy(Arc::new(policy))
    }

    /// A version of [`MessageHandlerBuilder::retry_policy`] for already
    /// Arc-ed policies. Useful for sharing one policy across handlers.
    #[must_use]
    pub fn dyn_retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Override the group-level fallback resolver for this handler.
    ///
    /// Check out [`FallbackResolver`]'s documentation for more details.
    #[must_use]
    pub fn fallback_resolver<F: FallbackResolver>(self, resolver: F) -> Self {
        self.dyn_fallback_resolver(Arc::new(resolver))
    }

    /// A version of [`MessageHandlerBuilder::fallback_resolver`] for already
    /// Arc-ed resolvers.
    #[must_use]
    pub fn dyn_fallback_resolver(mut self, resolver: Arc<dyn FallbackResolver>) -> Self {
        self.fallback_resolver = Some(resolver);
        self
    }

    /// The handler function used to process incoming messages.
    ///
    /// Passing in the handler function finalises the `MessageHandler`
    /// construction - you will not be able to register additional middlewares
    /// after having specified the handler.
    ///
    /// # Scope
    ///
    /// The function does not get access to the underlying broker transport.
    /// The engine takes care of acking/nacking the message according to the
    /// outcome of processing (check out [`HandlerError`] for more details).
    ///
    /// [`HandlerError`]: crate::consumers::HandlerError
    pub fn handler<H>(self, handler: H) -> MessageHandler<Context, Message>
    where
        H: for<'a> AsyncClosure<'a, Context, Message>,
    {
        self.raw_handler(ClosureHandler(handler))
    }

    /// The raw handler used to process incoming messages. Prefer `handler` if
    /// you only want to register a function handler. This method is provided
    /// for more complex implementation requirements.
    ///
    /// Check out [`Handler`]'s documentation for more details.
    pub fn raw_handler<H: Handler<Context, Message>>(
        self,
        handler: H,
    ) -> MessageHandler<Context, Message> {
        self.raw_arc_handler(Arc::new(handler))
    }

    /// The raw `Arc<handler>` used to process incoming messages. Prefer
    /// `handler` if you only want to register a function handler.
    pub fn raw_arc_handler(
        self,
        handler: Arc<dyn Handler<Context, Message>>,
    ) -> MessageHandler<Context, Message> {
        let Self {
            options,
            middleware_chain,
            retry_policy,
            fallback_resolver,
        } = self;
        MessageHandler {
            options,
            middleware_chain,
            retry_policy,
            fallback_resolver,
            handler,
        }
    }
}
