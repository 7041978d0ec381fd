//! The seam between the engine and the message broker.
//!
//! `portage` never opens connections or channels itself: everything it needs
//! from the broker is captured by the [`Transport`] trait - declare a queue,
//! start a delivery stream, settle a delivery, publish an envelope.
//! Production deployments implement it on top of their AMQP (or other) client;
//! tests implement it in-process.

use std::collections::HashMap;

use futures_util::stream::BoxStream;

/// A stream of deliveries for one queue, as produced by [`Transport::consume`].
///
/// The stream ends when the broker-side consumer is cancelled or the
/// connection is lost.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, TransportError>>;

/// Errors surfaced by a [`Transport`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection (or channel) to the broker was lost.
    #[error("the connection to the message broker was lost")]
    ConnectionLost(#[source] anyhow::Error),
    /// The broker refused or failed the requested operation.
    #[error("the message broker failed the requested operation")]
    OperationFailed(#[source] anyhow::Error),
}

/// Message properties travelling alongside the payload.
///
/// `expiration` is the per-message TTL in milliseconds, rendered as a string
/// on the wire (AMQP convention). `headers` carries arbitrary string-keyed
/// properties; the engine imposes no schema on them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageProperties {
    pub content_type: Option<String>,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub expiration: Option<String>,
    pub headers: HashMap<String, String>,
}

/// One message handed over by the transport for processing.
#[derive(Clone, Debug)]
pub struct Delivery {
    /// Broker-assigned tag used to ack/nack this specific delivery.
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    /// True if the broker already delivered this message before.
    pub redelivered: bool,
    pub properties: MessageProperties,
    pub payload: Vec<u8>,
}

/// The kind of exchange a queue is bound to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
    Headers,
}

/// A binding between a queue and an exchange, declared together with the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeBinding {
    pub exchange: String,
    pub kind: ExchangeKind,
    pub routing_key: String,
}

/// Everything the transport needs to declare a queue and its topology.
///
/// Built from [`ConsumerOptions`](crate::consumers::ConsumerOptions) by the
/// consumer machinery; transports map it onto their broker's declare/bind
/// primitives (e.g. `x-dead-letter-exchange` and `x-message-ttl` arguments
/// for AMQP).
#[derive(Clone, Debug, Default)]
pub struct QueueDeclaration {
    pub queue: String,
    pub durable: bool,
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_routing_key: Option<String>,
    /// Queue-level message TTL, in milliseconds.
    pub message_expiration: Option<String>,
    pub binding: Option<ExchangeBinding>,
}

/// The broker transport consumed by the engine.
///
/// # Scope
///
/// Implementations own the connection/channel lifecycle, prefetch
/// negotiation and the wire protocol. The engine only calls the five
/// operations below and maps processing outcomes onto `ack`/`nack`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Declare a queue (and its binding/dead-letter topology, if any).
    ///
    /// Must be idempotent: consumers call it on every start-up when
    /// auto-declare is enabled.
    async fn declare_queue(&self, declaration: &QueueDeclaration) -> Result<(), TransportError>;

    /// Start consuming from `queue`, identifying the consumer as
    /// `consumer_tag` towards the broker.
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, TransportError>;

    /// Positively acknowledge a delivery.
    async fn ack(&self, delivery_tag: u64) -> Result<(), TransportError>;

    /// Negatively acknowledge a delivery. With `requeue` the message becomes
    /// immediately available again; without it the broker dead-letters the
    /// message if the queue has a dead-letter target, and drops it otherwise.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), TransportError>;

    /// Publish a payload to `exchange` with `routing_key`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Vec<u8>,
        properties: MessageProperties,
    ) -> Result<(), TransportError>;
}
