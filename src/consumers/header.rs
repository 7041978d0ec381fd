use std::collections::HashMap;

use uuid::Uuid;

use crate::transport::Delivery;

/// The broker-facing metadata of one delivery, as seen by handlers,
/// middlewares and fallback resolvers.
///
/// A header is owned by the dispatch of a single delivery. Every field is
/// fixed for the lifetime of the delivery except `retry_count`, which the
/// dispatcher increments before each re-invocation.
#[derive(Clone, Debug)]
pub struct MessageHeader {
    /// The message id stamped by the publisher, or a fresh v4 uuid if the
    /// delivery arrived without one.
    pub id: String,
    /// The queue this delivery was consumed from.
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
    pub delivery_tag: u64,
    /// True if the broker already delivered this message before.
    pub redelivered: bool,
    /// Failed invocations of this delivery so far; 0 on the first attempt.
    pub retry_count: u32,
    /// Per-message TTL in milliseconds, as published.
    pub expiration: Option<String>,
    /// Arbitrary string-keyed properties carried alongside the payload.
    pub properties: HashMap<String, String>,
}

impl MessageHeader {
    pub(crate) fn from_delivery(queue: &str, delivery: &Delivery) -> Self {
        Self {
            id: delivery
                .properties
                .message_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            queue: queue.to_owned(),
            exchange: delivery.exchange.clone(),
            routing_key: delivery.routing_key.clone(),
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            retry_count: 0,
            expiration: delivery.properties.expiration.clone(),
            properties: delivery.properties.headers.clone(),
        }
    }
}
