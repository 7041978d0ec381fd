//! The `Handler` trait is heavily inspired by `tide`'s approach to endpoint handlers.
use std::future::Future;

use crate::consumers::{error::HandlerError, Incoming};

/// Implementers of the `Handler` trait can be used in [`MessageHandler`]s to
/// process messages retrieved from a queue.
///
/// # Scope
///
/// `handle` does not get access to the underlying broker transport.
/// The engine takes care of acking/nacking the message according to the
/// outcome of processing (check out [`HandlerError`] for more details).
/// This decouples the low-level interactions with the message broker and the
/// retry logic from the actual business logic associated with the processing
/// of a message.
///
/// # Implementers
///
/// While you can implement `Handler` for a struct or enum, 99% of the time
/// you will be relying on the provided implementation for async functions
/// with a matching signature. See [`AsyncClosure`] for more details.
///
/// [`MessageHandler`]: crate::consumers::MessageHandler
#[async_trait::async_trait]
pub trait Handler<Context, Message>: Send + Sync + 'static {
    async fn handle(&self, incoming: Incoming<'_, Context, Message>) -> Result<(), HandlerError>;
}

/// Implement the [`Handler`] trait for all Boxed handlers.
///
/// E.g. `Box<dyn Handler<Context, Message>>`.
#[async_trait::async_trait]
impl<Context, Message, H> Handler<Context, Message> for Box<H>
where
    Context: Send + Sync + 'static,
    Message: Send + Sync + 'static,
    H: Handler<Context, Message> + ?Sized,
{
    async fn handle(&self, incoming: Incoming<'_, Context, Message>) -> Result<(), HandlerError> {
        H::handle(self, incoming).await
    }
}

/// `AsyncClosure` is implemented for all functions of the form:
/// ```ignore
/// async fn(incoming: Incoming<'_, Context, Message>) -> impl Into<HandlerError>;
/// ```
///
/// When combined with the [`ClosureHandler`] type, you get a [`Handler`] that
/// can be registered on a consumer group. `MessageHandlerBuilder::handler`
/// will automatically perform this wrapping for you.
pub trait AsyncClosure<'a, Context, Message>: Send + Sync + 'static {
    type Output: Future<Output = Result<(), Self::Err>> + Send + 'a;
    type Err: Into<HandlerError> + 'static;
    fn call(&'a self, incoming: Incoming<'a, Context, Message>) -> Self::Output;
}

/// Implement `AsyncClosure` for all functions that match the required signature.
impl<'a, F, Fut, Err, Context, Message> AsyncClosure<'a, Context, Message> for F
where
    Context: 'static,
    Message: 'static,
    F: Send + Sync + 'static,
    F: Fn(Incoming<'a, Context, Message>) -> Fut,
    Fut: Future<Output = Result<(), Err>> + Send + 'a,
    Err: Into<HandlerError> + 'static,
{
    type Err = Err;
    type Output = Fut;

    fn call(&'a self, incoming: Incoming<'a, Context, Message>) -> Self::Output {
        // `self`, in this case, is a function, which we are calling on its
        // argument using parenthesis notation - self(_)
        (self)(incoming)
    }
}

/// Wrapper type to turn an [`AsyncClosure`] into a [`Handler`].
pub struct ClosureHandler<H>(pub H);

/// Implement the [`Handler`] trait for all [`ClosureHandler`]s that match the
/// expected signature.
///
/// Handlers are not required to return a [`HandlerError`] directly - it is
/// enough for them to return an error type that can be converted into one.
#[async_trait::async_trait]
impl<Context, Message, F> Handler<Context, Message> for ClosureHandler<F>
where
    Context: Send + Sync + 'static,
    Message: Send + Sync + 'static,
    F: for<'a> AsyncClosure<'a, Context, Message>,
{
    async fn handle(&self, incoming: Incoming<'_, Context, Message>) -> Result<(), HandlerError> {
        self.0.call(incoming).await.map_err(|e| e.into())
    }
}
