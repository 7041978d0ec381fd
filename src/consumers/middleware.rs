//! Middleware types are heavily inspired by `tide`'s approach to middleware.
use std::future::Future;
use std::sync::Arc;

use crate::consumers::{
    ConsumerState, DispatchFailure, Handler, HandlerError, Incoming, MessageHeader,
};

/// Middlewares to execute logic before and after the message handler function.
///
/// # Use case
///
/// The main purpose of processing middlewares is to extract and centralise
/// common non-business logic that might impact the outcome of the processing.
///
/// Before the handler is executed, a processing middleware can:
///
/// - Inspect the incoming header and message;
/// - Skip the execution of the handler entirely by not invoking `next`
///   (e.g. an authorization middleware when auth fails) - this is the only
///   way to abort processing without returning an error.
///
/// After the handler has been executed, a middleware can:
///
/// - Perform actions based on the handler's outcome (e.g. log errors);
/// - Modify the handler's outcome (e.g. change error severity).
///
/// # Ordering
///
/// The chain is fixed at registration time. The first registered middleware
/// is outermost: it runs first on the way in and last on the way out. The
/// failure and fallback phases ([`on_failure`](Self::on_failure) and
/// [`on_fallback`](Self::on_fallback)) run innermost-first.
///
/// The sky is the limit, but beware that abusing middlewares to perform
/// application logic is often a one-way ticket to mysterious bugs that are
/// difficult to troubleshoot.
#[async_trait::async_trait]
pub trait ProcessingMiddleware<Context, Message: Sync>: 'static + Send + Sync {
    /// Asynchronously handle the message, `next` being the remainder of the
    /// chain. `next` may be invoked at most once; omitting the call
    /// short-circuits the chain and counts as successful processing.
    async fn handle<'a>(
        &'a self,
        incoming: Incoming<'a, Context, Message>,
        next: Next<'a, Context, Message>,
    ) -> Result<(), HandlerError>;

    /// Observer fired after a failed invocation, once per failed attempt.
    ///
    /// `attempt` is the 1-based count of failures so far. Implementations
    /// must handle their own errors - nothing returned here can affect the
    /// dispatch outcome.
    async fn on_failure<'a>(
        &'a self,
        header: &MessageHeader,
        error: &HandlerError,
        attempt: u32,
        message: &Message,
    ) {
        let _ = (header, error, attempt, message);
    }

    /// Consulted once retries are exhausted, innermost middleware first.
    ///
    /// Returning `Some(state)` claims the terminal disposition for this
    /// delivery; `None` defers to the next middleware out, and ultimately to
    /// the registered [`FallbackResolver`](crate::consumers::FallbackResolver).
    ///
    /// `message` is `None` when the payload never deserialized.
    async fn on_fallback<'a>(
        &'a self,
        header: &MessageHeader,
        message: Option<&Message>,
        error: &DispatchFailure,
    ) -> Option<ConsumerState> {
        let _ = (header, message, error);
        None
    }
}

#[async_trait::async_trait]
impl<Context, Message, F, Fut> ProcessingMiddleware<Context, Message> for F
where
    Context: Send + Sync + 'static,
    Message: Send + Sync + 'static,
    F: Send
        + Sync
        + 'static
        + for<'a> Fn(Incoming<'a, Context, Message>, Next<'a, Context, Message>) -> Fut,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle<'b>(
        &'b self,
        incoming: Incoming<'b, Context, Message>,
        next: Next<'b, Context, Message>,
    ) -> Result<(), HandlerError> {
        (self)(incoming, next).await
    }
}

/// The remainder of the processing middleware chain, including the final
/// message handler.
#[allow(missing_debug_implementations)]
pub struct Next<'a, Context, Message: Sync> {
    pub(super) handler: &'a dyn Handler<Context, Message>,
    /// The remainder of the processing middleware chain.
    pub(super) next_middleware: &'a [Arc<dyn ProcessingMiddleware<Context, Message>>],
}

impl<'a, Context: 'static, Message: Sync + 'static> Next<'a, Context, Message> {
    /// Asynchronously execute the remaining middleware chain.
    pub async fn run(
        mut self,
        incoming: Incoming<'_, Context, Message>,
    ) -> Result<(), HandlerError> {
        // If there is at least one processing middleware in the chain, get a
        // reference to it and store the remaining ones in `next_middleware`.
        // Then call the middleware passing `self` in the handler, recursively.
        if let Some((current, next)) = self.next_middleware.split_first() {
            self.next_middleware = next;
            current.handle(incoming, self).await
        } else {
            // We have executed all processing middlewares (or simply there
            // were none) and it's now the turn of the message handler itself.
            self.handler.handle(incoming).await
        }
    }
}
