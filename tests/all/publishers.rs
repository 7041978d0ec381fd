use std::sync::Arc;

use portage::publishers::{MessageEnvelope, Publisher};

use crate::helpers::{TestMessage, TestTransport};

#[tokio::test]
async fn publish_stamps_content_type_and_a_fresh_message_id() {
    // Arrange
    let transport = Arc::new(TestTransport::new());
    let publisher = Publisher::builder(transport.clone()).build();
    let message = TestMessage::new("hello");

    // Act
    publisher
        .publish("orders", "order.placed", &message)
        .await
        .unwrap();

    // Assert
    let published = transport.published();
    assert_eq!(published.len(), 1);
    let out = &published[0];
    assert_eq!(out.exchange, "orders");
    assert_eq!(out.routing_key, "order.placed");
    assert_eq!(
        serde_json::from_slice::<TestMessage>(&out.payload).unwrap(),
        message
    );
    assert_eq!(out.properties.content_type.as_deref(), Some("application/json"));
    assert!(out.properties.message_id.is_some());
    assert!(out.properties.expiration.is_none());
}

#[tokio::test]
async fn the_configure_callback_wins_over_the_stamped_defaults() {
    // Arrange
    let transport = Arc::new(TestTransport::new());
    let publisher = Publisher::builder(transport.clone())
        .default_expiration_ms(60_000)
        .build();

    // Act
    publisher
        .publish_with("orders", "order.placed", &TestMessage::new("hello"), |e| {
            e.with_message_id("fixed-id")
                .with_correlation_id("corr-7")
                .with_expiration("1000")
        })
        .await
        .unwrap();

    // Assert
    let out = &transport.published()[0];
    assert_eq!(out.properties.message_id.as_deref(), Some("fixed-id"));
    assert_eq!(out.properties.correlation_id.as_deref(), Some("corr-7"));
    assert_eq!(out.properties.expiration.as_deref(), Some("1000"));
}

#[tokio::test]
async fn the_default_expiration_applies_when_the_envelope_has_none() {
    // Arrange
    let transport = Arc::new(TestTransport::new());
    let publisher = Publisher::builder(transport.clone())
        .default_expiration_ms(60_000)
        .build();

    // Act
    publisher
        .publish("orders", "order.placed", &TestMessage::new("hello"))
        .await
        .unwrap();

    // Assert
    let out = &transport.published()[0];
    assert_eq!(out.properties.expiration.as_deref(), Some("60000"));
}

#[tokio::test]
async fn a_raw_envelope_goes_out_as_assembled() {
    // Arrange
    let transport = Arc::new(TestTransport::new());
    let publisher = Publisher::builder(transport.clone()).build();

    let envelope = MessageEnvelope::default()
        .with_payload(b"raw bytes".to_vec())
        .with_exchange("audit")
        .with_routing_key("audit.raw")
        .with_content_type("application/octet-stream")
        .with_header("origin", "importer");

    // Act
    publisher.publish_envelope(envelope).await.unwrap();

    // Assert: the caller's content type survives the stamping.
    let out = &transport.published()[0];
    assert_eq!(out.payload, b"raw bytes");
    assert_eq!(
        out.properties.content_type.as_deref(),
        Some("application/octet-stream")
    );
    assert_eq!(out.properties.headers.get("origin").map(String::as_str), Some("importer"));
}
