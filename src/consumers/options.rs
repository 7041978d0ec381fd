use crate::transport::{ExchangeBinding, ExchangeKind, QueueDeclaration};

/// Per-queue consumer configuration, set once at registration and read-only
/// from then on.
///
/// An explicit value struct rather than scattered knobs: cloning deep-copies
/// every field, so options tweaked for one registration can never leak into
/// another.
#[derive(Clone, Debug)]
pub struct ConsumerOptions {
    /// The queue to consume from. Must be non-empty.
    pub queue: String,
    /// Maximum number of unacknowledged deliveries processed concurrently.
    pub qos: u16,
    /// Exchange rejected messages are dead-lettered to, if any. The broker's
    /// own dead-lettering does the redelivery - the engine never publishes a
    /// duplicate copy itself.
    pub dead_letter_exchange: Option<String>,
    pub dead_letter_routing_key: Option<String>,
    /// Whether a fallback decision of "requeue" is honoured. When false the
    /// delivery is discarded instead, which breaks otherwise-infinite
    /// requeue cycles.
    pub requeue_on_failure: bool,
    /// Queue-level message TTL in milliseconds.
    pub expiration: Option<String>,
    /// Declare the queue (and its binding) with the transport on start-up.
    pub auto_declare: bool,
    /// Exchange to bind the queue to on declaration, if any.
    pub bind_exchange: Option<String>,
    pub exchange_kind: ExchangeKind,
    pub bind_routing_key: Option<String>,
}

impl ConsumerOptions {
    /// Options for `queue` with the defaults: QoS 100, no dead-letter
    /// target, no requeue on failure, auto-declare on.
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            qos: 100,
            dead_letter_exchange: None,
            dead_letter_routing_key: None,
            requeue_on_failure: false,
            expiration: None,
            auto_declare: true,
            bind_exchange: None,
            exchange_kind: ExchangeKind::Direct,
            bind_routing_key: None,
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: u16) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_dead_letter(
        mut self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self.dead_letter_routing_key = Some(routing_key.into());
        self
    }

    #[must_use]
    pub fn with_requeue_on_failure(mut self, requeue: bool) -> Self {
        self.requeue_on_failure = requeue;
        self
    }

    #[must_use]
    pub fn with_binding(
        mut self,
        exchange: impl Into<String>,
        kind: ExchangeKind,
        routing_key: impl Into<String>,
    ) -> Self {
        self.bind_exchange = Some(exchange.into());
        self.exchange_kind = kind;
        self.bind_routing_key = Some(routing_key.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), OptionsValidationError> {
        if self.queue.trim().is_empty() {
            return Err(OptionsValidationError::EmptyQueueName);
        }
        if self.qos == 0 {
            return Err(OptionsValidationError::ZeroQos);
        }
        Ok(())
    }

    pub(crate) fn to_declaration(&self) -> QueueDeclaration {
        QueueDeclaration {
            queue: self.queue.clone(),
            durable: true,
            dead_letter_exchange: self.dead_letter_exchange.clone(),
            dead_letter_routing_key: self.dead_letter_routing_key.clone(),
            message_expiration: self.expiration.clone(),
            binding: self.bind_exchange.as_ref().map(|exchange| ExchangeBinding {
                exchange: exchange.clone(),
                kind: self.exchange_kind.clone(),
                routing_key: self.bind_routing_key.clone().unwrap_or_default(),
            }),
        }
    }
}

/// Rejected consumer options, reported when the group is built.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OptionsValidationError {
    #[error("the queue name must not be empty")]
    EmptyQueueName,
    #[error("qos must admit at least one in-flight delivery")]
    ZeroQos,
}
