use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::publishers::MessageEnvelope;
use crate::serialization::{JsonSerializer, MessageSerializer, SerializationError};
use crate::transport::{Transport, TransportError};

/// A high-level interface to publish messages.
///
/// `Publisher` serializes the message body, stamps the standard properties
/// (content type, a fresh message id, the configured expiration) and hands the
/// envelope to the transport.
///
/// Publishing is fire-and-forget from the engine's point of view: there is no
/// retry loop on this side. Errors propagate to the caller as
/// [`PublishError`].
///
/// # How do I build a `Publisher`?
///
/// `Publisher` provides a fluent API to add configuration step-by-step, known
/// as "builder pattern" in Rust.
/// The starting point is [`Publisher::builder`].
pub struct Publisher<Tr, S = JsonSerializer> {
    transport: Arc<Tr>,
    serializer: Arc<S>,
    /// Default per-message time-to-live, in milliseconds, applied to outgoing
    /// messages that do not carry their own.
    default_expiration: Option<String>,
}

impl<Tr: Transport> Publisher<Tr, JsonSerializer> {
    /// Start building a [`Publisher`].
    ///
    /// You will need a transport.
    pub fn builder(transport: Arc<Tr>) -> PublisherBuilder<Tr, JsonSerializer> {
        PublisherBuilder::new(transport)
    }
}

impl<Tr, S> Publisher<Tr, S>
where
    Tr: Transport,
    S: MessageSerializer,
{
    /// Serialize `message` and publish it to `exchange` with `routing_key`.
    pub async fn publish<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &T,
    ) -> Result<(), PublishError> {
        self.publish_with(exchange, routing_key, message, |envelope| envelope)
            .await
    }

    /// Like [`Publisher::publish`], with a chance to customise the envelope
    /// before it goes out - e.g. to set a correlation id or extra headers.
    ///
    /// The configure callback runs before the standard properties are
    /// stamped, so anything it sets explicitly wins over the defaults.
    pub async fn publish_with<T: Serialize>(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &T,
        configure: impl FnOnce(MessageEnvelope) -> MessageEnvelope,
    ) -> Result<(), PublishError> {
        let payload = self
            .serializer
            .serialize(message)
            .map_err(PublishError::Serialization)?;
        let envelope = configure(
            MessageEnvelope::default()
                .with_payload(payload)
                .with_exchange(exchange)
                .with_routing_key(routing_key),
        );
        self.publish_envelope(envelope).await
    }

    /// Publish a pre-assembled [`MessageEnvelope`].
    pub async fn publish_envelope(&self, envelope: MessageEnvelope) -> Result<(), PublishError> {
        let envelope = self.stamp_properties(envelope);
        self.transport
            .publish(
                &envelope.exchange,
                &envelope.routing_key,
                envelope.payload,
                envelope.properties,
            )
            .await
            .map_err(PublishError::Transport)
    }

    /// Fill in the standard properties, without overriding anything the
    /// caller already set.
    fn stamp_properties(&self, mut envelope: MessageEnvelope) -> MessageEnvelope {
        let props = &mut envelope.properties;
        if props.content_type.is_none() {
            props.content_type = Some(self.serializer.content_type().to_owned());
        }
        if props.message_id.is_none() {
            props.message_id = Some(Uuid::new_v4().to_string());
        }
        if props.expiration.is_none() {
            props.expiration = self.default_expiration.clone();
        }
        envelope
    }
}

/// Error returned when trying to publish a message using [`Publisher`].
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize the outgoing message")]
    Serialization(#[source] SerializationError),
    #[error("Generic error encountered when interacting with the message broker")]
    Transport(#[source] TransportError),
}

/// A builder for [`Publisher`].
///
/// Use [`Publisher::builder`] as entrypoint.
pub struct PublisherBuilder<Tr, S = JsonSerializer> {
    transport: Arc<Tr>,
    serializer: Arc<S>,
    default_expiration: Option<String>,
}

impl<Tr: Transport> PublisherBuilder<Tr, JsonSerializer> {
    fn new(transport: Arc<Tr>) -> Self {
        Self {
            transport,
            serializer: Arc::new(JsonSerializer),
            default_expiration: None,
        }
    }
}

impl<Tr, S> PublisherBuilder<Tr, S>
where
    Tr: Transport,
    S: MessageSerializer,
{
    /// Replace the serializer used to encode outgoing message payloads.
    /// If not configured, payloads are encoded as JSON via [`JsonSerializer`].
    #[must_use]
    pub fn with_serializer<S2: MessageSerializer>(
        self,
        serializer: S2,
    ) -> PublisherBuilder<Tr, S2> {
        PublisherBuilder {
            transport: self.transport,
            serializer: Arc::new(serializer),
            default_expiration: self.default_expiration,
        }
    }

    /// Default per-message time-to-live, in milliseconds, applied to outgoing
    /// messages that do not carry their own expiration.
    #[must_use]
    pub fn default_expiration_ms(mut self, milliseconds: u64) -> Self {
        self.default_expiration = Some(milliseconds.to_string());
        self
    }

    /// Finalise the builder and get an instance of [`Publisher`].
    pub fn build(self) -> Publisher<Tr, S> {
        Publisher {
            transport: self.transport,
            serializer: self.serializer,
            default_expiration: self.default_expiration,
        }
    }
}
