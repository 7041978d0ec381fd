use crate::transport::MessageProperties;

/// A message to be published via [`Publisher`](super::Publisher).
///
/// Most callers never build one by hand: [`Publisher::publish`] assembles the
/// envelope from a serializable value. Use [`Publisher::publish_envelope`]
/// when you need full control over the raw payload and properties.
///
/// [`Publisher::publish`]: super::Publisher::publish
/// [`Publisher::publish_envelope`]: super::Publisher::publish_envelope
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageEnvelope {
    /// The body of the message - as a sequence of bytes.
    pub payload: Vec<u8>,
    /// The name of the exchange we are publishing the message to.
    pub exchange: String,
    /// The routing key used by exchange listeners to determine if they are
    /// interested or not in the message.
    pub routing_key: String,
    /// Properties attached to the message.
    pub properties: MessageProperties,
}

impl MessageEnvelope {
    pub fn with_payload(mut self, value: Vec<u8>) -> Self {
        self.payload = value;
        self
    }

    pub fn with_exchange(mut self, value: impl Into<String>) -> Self {
        self.exchange = value.into();
        self
    }

    pub fn with_routing_key(mut self, value: impl Into<String>) -> Self {
        self.routing_key = value.into();
        self
    }

    fn props(mut self, f: impl FnOnce(&mut MessageProperties)) -> Self {
        f(&mut self.properties);
        self
    }

    pub fn with_content_type(self, value: impl Into<String>) -> Self {
        self.props(|p| p.content_type = Some(value.into()))
    }

    pub fn with_message_id(self, value: impl Into<String>) -> Self {
        self.props(|p| p.message_id = Some(value.into()))
    }

    pub fn with_correlation_id(self, value: impl Into<String>) -> Self {
        self.props(|p| p.correlation_id = Some(value.into()))
    }

    /// Per-message time-to-live, in milliseconds, as the broker expects it on
    /// the wire.
    pub fn with_expiration(self, value: impl Into<String>) -> Self {
        self.props(|p| p.expiration = Some(value.into()))
    }

    pub fn with_header(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props(|p| {
            p.headers.insert(key.into(), value.into());
        })
    }
}
