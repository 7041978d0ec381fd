use std::fmt;

use crate::serialization::SerializationError;

/// The error type returned by message handlers.
#[derive(Debug)]
pub struct HandlerError {
    /// The underlying error returned by the message handler.
    pub inner_error: anyhow::Error,
    /// `error_type` distinguishes two classes of errors:
    /// - transient errors; message processing might succeed if retried after a short delay
    /// - fatal errors; no matter how many times you retry, processing will never succeed
    ///
    /// Check out [`ErrorType`]'s documentation for more details.
    pub error_type: ErrorType,
}

impl HandlerError {
    /// A retryable failure - the retry policy decides what happens next.
    pub fn transient(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner_error: error.into(),
            error_type: ErrorType::Transient,
        }
    }

    /// An unrecoverable failure - routed straight to the fallback resolver,
    /// skipping the retry loop.
    pub fn fatal(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner_error: error.into(),
            error_type: ErrorType::Fatal,
        }
    }
}

impl std::error::Error for HandlerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner_error.as_ref())
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handling of a message failed due to a {} issue.\n{}",
            self.error_type, self.inner_error
        )
    }
}

/// Handlers returning a bare `anyhow::Error` fail transiently - the retry
/// policy gets a say before the message is given up on.
impl From<anyhow::Error> for HandlerError {
    fn from(error: anyhow::Error) -> Self {
        Self::transient(error)
    }
}

/// Types of failure when handling a message.
/// Used by the engine to drive retries, fallbacks and broker dispositions.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorType {
    /// Message processing might succeed if retried after a short delay.
    ///
    /// E.g. the message handler timed out calling an API it needs to fulfil
    /// the message processing requirements.
    Transient,
    /// Message processing will never succeed, no matter how many times you
    /// retry or how long you wait.
    ///
    /// The message goes straight to fallback resolution.
    Fatal,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// The terminal failure handed to fallback resolution once a delivery cannot
/// be processed.
#[derive(Debug, thiserror::Error)]
pub enum DispatchFailure {
    /// The payload never deserialized into the handler's message type.
    ///
    /// Poison messages are not retried - parsing is deterministic, so another
    /// attempt cannot change the outcome.
    #[error("the message payload could not be deserialized")]
    Deserialization(#[source] SerializationError),
    /// The handler (or a middleware) failed and the retry budget is spent -
    /// or the error was fatal to begin with.
    #[error("message processing failed after {attempts} attempt(s)")]
    Handler {
        #[source]
        error: HandlerError,
        attempts: u32,
    },
}
