//! Payload (de)serialization.
//!
//! The engine treats message bodies as opaque bytes until the moment a typed
//! handler needs them. [`MessageSerializer`] is the seam: the default is JSON
//! via [`JsonSerializer`], and a custom implementation can be plugged in at
//! the consumer-group (or publisher) level.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Failure to convert between a typed message and its wire representation.
///
/// Deserialization failures are never retried by the dispatcher: a payload
/// that does not parse now will not parse on the next attempt either.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("failed to serialize the outgoing message payload")]
    Serialize(#[source] anyhow::Error),
    #[error("failed to deserialize the incoming message payload")]
    Deserialize(#[source] anyhow::Error),
}

/// Converts typed messages to and from raw payload bytes.
pub trait MessageSerializer: Send + Sync + 'static {
    /// The content type stamped on published messages (e.g. `application/json`).
    fn content_type(&self) -> &str;

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerializationError>;

    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, SerializationError>;
}

/// The default serializer: JSON via `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl MessageSerializer for JsonSerializer {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        serde_json::to_vec(value).map_err(|e| SerializationError::Serialize(e.into()))
    }

    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, SerializationError> {
        serde_json::from_slice(payload).map_err(|e| SerializationError::Deserialize(e.into()))
    }
}
