use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::consumers::MessageHeader;

/// A dequeued, deserialized message enriched with auxiliary data, ready for
/// processing.
///
/// `Incoming` is the input type of message handler functions (check out
/// [`Handler`](crate::consumers::Handler)'s docs for more details).
pub struct Incoming<'d, C, T> {
    /// `context` is a set of resources that are required to process the
    /// message and outlive the lifecycle of the message itself - e.g. an HTTP
    /// client for a third-party API, a db connection pool, etc.
    ///
    /// The context is behind an `Arc` pointer: message handling runs as tasks
    /// on a multi-threaded runtime, so the shared reference must be able to
    /// cross thread boundaries without each message paying for its own copy.
    pub context: Arc<C>,
    /// The broker-facing metadata of this delivery, including the current
    /// `retry_count`.
    pub header: &'d MessageHeader,
    /// The deserialized message payload.
    pub message: &'d T,
    /// Cancellation scope for this invocation.
    ///
    /// The token is handed in explicitly and lives exactly as long as the
    /// delivery - it is never parked on a long-lived object. Long-running
    /// handlers should check it at their own suspension points; it fires when
    /// the consumer is shutting down.
    pub cancellation: CancellationToken,
}
