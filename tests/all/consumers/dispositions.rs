use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use portage::consumers::{
    ConsumerGroup, ConsumerOptions, ConsumerState, DispatchFailure, FallbackResolver,
    HandlerError, Incoming, MessageHandler, MessageHeader,
};
use portage::retry::ExponentialBackoff;
use shutdown_handler::ShutdownHandler;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::helpers::{json_delivery, raw_delivery, TestMessage, TestTransport};

async fn ack_handler(_incoming: Incoming<'_, (), TestMessage>) -> Result<(), HandlerError> {
    Ok(())
}

#[tokio::test]
async fn a_successful_delivery_is_acked_exactly_once() {
    // Arrange
    let queue_name = Uuid::new_v4().to_string();
    let transport = Arc::new(TestTransport::new());

    let consumer_group = ConsumerGroup::builder(transport.clone(), ())
        .exit_after(1)
        .message_handler(
            MessageHandler::builder(ConsumerOptions::new(&queue_name)).handler(ack_handler),
        )
        .build()
        .await
        .unwrap();

    // Act
    let handle = tokio::spawn(consumer_group.run_until_stopped());
    transport.deliver(&queue_name, json_delivery(1, &queue_name, &TestMessage::new("hi"))).await;
    handle.await.unwrap().unwrap();

    // Assert
    assert_eq!(transport.acks(), vec![1]);
    assert_eq!(transport.dispositions(), 1);
}

#[tokio::test]
async fn a_malformed_payload_skips_the_handler_and_goes_to_the_fallback() {
    #[derive(Clone, Default)]
    struct Context {
        handler_calls: Arc<AtomicUsize>,
    }

    #[derive(Default)]
    struct RecordingResolver {
        deserialization_failures: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl FallbackResolver for RecordingResolver {
        async fn resolve(
            &self,
            _header: &MessageHeader,
            failure: &DispatchFailure,
        ) -> ConsumerState {
            if let DispatchFailure::Deserialization(_) = failure {
                self.deserialization_failures.fetch_add(1, Ordering::SeqCst);
            }
            ConsumerState::NackDiscard
        }
    }

    async fn handler(incoming: Incoming<'_, Context, TestMessage>) -> Result<(), HandlerError> {
        incoming.context.handler_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    // Arrange
    let queue_name = Uuid::new_v4().to_string();
    let transport = Arc::new(TestTransport::new());
    let context = Context::default();
    let resolver = RecordingResolver::default();
    let deserialization_failures = resolver.deserialization_failures.clone();

    let consumer_group = ConsumerGroup::builder(transport.clone(), context.clone())
        .fallback_resolver(resolver)
        .exit_after(1)
        .message_handler(MessageHandler::builder(ConsumerOptions::new(&queue_name)).handler(handler))
        .build()
        .await
        .unwrap();

    // Act
    let handle = tokio::spawn(consumer_group.run_until_stopped());
    transport
        .deliver(&queue_name, raw_delivery(7, &queue_name, b"{ not json".to_vec()))
        .await;
    handle.await.unwrap().unwrap();

    // Assert
    assert_eq!(context.handler_calls.load(Ordering::SeqCst), 0);
    assert_eq!(deserialization_failures.load(Ordering::SeqCst), 1);
    assert_eq!(transport.nacks(), vec![(7, false)]);
    assert_eq!(transport.dispositions(), 1);
}

/// A resolver asking for a requeue only gets one if the consumer opted in:
/// otherwise the engine demotes the disposition to a discard.
#[tokio::test]
async fn a_requeue_request_is_demoted_to_a_discard_without_the_opt_in() {
    struct AlwaysRequeue;

    #[async_trait::async_trait]
    impl FallbackResolver for AlwaysRequeue {
        async fn resolve(
            &self,
            _header: &MessageHeader,
            _failure: &DispatchFailure,
        ) -> ConsumerState {
            ConsumerState::NackRequeue
        }
    }

    async fn handler(_incoming: Incoming<'_, (), TestMessage>) -> Result<(), HandlerError> {
        Err(HandlerError::fatal(anyhow::anyhow!("nope")))
    }

    // Arrange
    let queue_name = Uuid::new_v4().to_string();
    let transport = Arc::new(TestTransport::new());

    let consumer_group = ConsumerGroup::builder(transport.clone(), ())
        .fallback_resolver(AlwaysRequeue)
        .exit_after(1)
        .message_handler(MessageHandler::builder(ConsumerOptions::new(&queue_name)).handler(handler))
        .build()
        .await
        .unwrap();

    // Act
    let handle = tokio::spawn(consumer_group.run_until_stopped());
    transport.deliver(&queue_name, json_delivery(3, &queue_name, &TestMessage::new("x"))).await;
    handle.await.unwrap().unwrap();

    // Assert: nacked without requeue.
    assert_eq!(transport.nacks(), vec![(3, false)]);
}

#[tokio::test]
async fn a_requeue_request_is_honoured_with_the_opt_in() {
    struct AlwaysRequeue;

    #[async_trait::async_trait]
    impl FallbackResolver for AlwaysRequeue {
        async fn resolve(
            &self,
            _header: &MessageHeader,
            _failure: &DispatchFailure,
        ) -> ConsumerState {
            ConsumerState::NackRequeue
        }
    }

    async fn handler(_incoming: Incoming<'_, (), TestMessage>) -> Result<(), HandlerError> {
        Err(HandlerError::fatal(anyhow::anyhow!("nope")))
    }

    // Arrange
    let queue_name = Uuid::new_v4().to_string();
    let transport = Arc::new(TestTransport::new());

    let consumer_group = ConsumerGroup::builder(transport.clone(), ())
        .fallback_resolver(AlwaysRequeue)
        .exit_after(1)
        .message_handler(
            MessageHandler::builder(
                ConsumerOptions::new(&queue_name).with_requeue_on_failure(true),
            )
            .handler(handler),
        )
        .build()
        .await
        .unwrap();

    // Act
    let handle = tokio::spawn(consumer_group.run_until_stopped());
    transport.deliver(&queue_name, json_delivery(4, &queue_name, &TestMessage::new("x"))).await;
    handle.await.unwrap().unwrap();

    // Assert: nacked with requeue.
    assert_eq!(transport.nacks(), vec![(4, true)]);
}

#[tokio::test]
async fn by_default_an_exhausted_message_is_acked() {
    async fn handler(_incoming: Incoming<'_, (), TestMessage>) -> Result<(), HandlerError> {
        Err(HandlerError::fatal(anyhow::anyhow!("unprocessable")))
    }

    // Arrange
    let queue_name = Uuid::new_v4().to_string();
    let transport = Arc::new(TestTransport::new());

    let consumer_group = ConsumerGroup::builder(transport.clone(), ())
        .exit_after(1)
        .message_handler(MessageHandler::builder(ConsumerOptions::new(&queue_name)).handler(handler))
        .build()
        .await
        .unwrap();

    // Act
    let handle = tokio::spawn(consumer_group.run_until_stopped());
    transport.deliver(&queue_name, json_delivery(9, &queue_name, &TestMessage::new("x"))).await;
    handle.await.unwrap().unwrap();

    // Assert
    assert_eq!(transport.acks(), vec![9]);
    assert!(transport.nacks().is_empty());
}

#[tokio::test]
async fn auto_declare_sets_up_the_queue_topology_on_build() {
    let queue_name = Uuid::new_v4().to_string();
    let transport = Arc::new(TestTransport::new());

    let _consumer_group = ConsumerGroup::builder(transport.clone(), ())
        .message_handler(
            MessageHandler::builder(
                ConsumerOptions::new(&queue_name).with_dead_letter("dlx", "dead"),
            )
            .handler(ack_handler),
        )
        .build()
        .await
        .unwrap();

    let declared = transport.declared_queues();
    assert_eq!(declared.len(), 1);
    assert_eq!(declared[0].queue, queue_name);
    assert_eq!(declared[0].dead_letter_exchange.as_deref(), Some("dlx"));
    assert_eq!(declared[0].dead_letter_routing_key.as_deref(), Some("dead"));
}

#[tokio::test]
async fn the_group_queue_prefix_applies_to_every_handler() {
    let transport = Arc::new(TestTransport::new());

    let consumer_group = ConsumerGroup::builder(transport.clone(), ())
        .queue_name_prefix("staging")
        .exit_after(1)
        .message_handler(
            MessageHandler::builder(ConsumerOptions::new("orders")).handler(ack_handler),
        )
        .build()
        .await
        .unwrap();

    assert_eq!(transport.declared_queues()[0].queue, "staging_orders");

    // The consumer also consumes from the prefixed queue.
    let handle = tokio::spawn(consumer_group.run_until_stopped());
    transport
        .deliver("staging_orders", json_delivery(1, "staging_orders", &TestMessage::new("hello")))
        .await;
    handle.await.unwrap().unwrap();

    assert_eq!(transport.acks(), vec![1]);
}

/// Two handlers with different message types can share a group. The retry
/// policy override on one handler does not leak onto its sibling.
#[tokio::test]
async fn handler_level_overrides_do_not_leak_across_handlers() {
    #[derive(Clone, Default)]
    struct Context {
        failures_seen: Arc<Mutex<Vec<String>>>,
    }

    async fn failing(incoming: Incoming<'_, Context, TestMessage>) -> Result<(), HandlerError> {
        incoming
            .context
            .failures_seen
            .lock()
            .await
            .push(incoming.message.body.clone());
        Err(HandlerError::transient(anyhow::anyhow!("try again")))
    }

    async fn succeeding(_incoming: Incoming<'_, Context, TestMessage>) -> Result<(), HandlerError> {
        Ok(())
    }

    // Arrange: handler A retries zero times, handler B keeps the group
    // default of zero as well but acks fine.
    let transport = Arc::new(TestTransport::new());
    let context = Context::default();

    let consumer_group = ConsumerGroup::builder(transport.clone(), context.clone())
        .retry_policy(ExponentialBackoff::new(0, 2))
        .message_handler(
            MessageHandler::builder(ConsumerOptions::new("queue-a"))
                .retry_policy(ExponentialBackoff::new(0, 2))
                .handler(failing),
        )
        .message_handler(
            MessageHandler::builder(ConsumerOptions::new("queue-b")).handler(succeeding),
        )
        .build()
        .await
        .unwrap();

    // Act
    let shutdown = Arc::new(ShutdownHandler::new());
    let handle = tokio::spawn(consumer_group.run_until_shutdown(shutdown.clone()));
    transport.deliver("queue-a", json_delivery(1, "queue-a", &TestMessage::new("a"))).await;
    transport.deliver("queue-b", json_delivery(2, "queue-b", &TestMessage::new("b"))).await;
    // Both deliveries must settle before we pull the plug.
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
    while transport.acks().len() < 2 {
        assert!(tokio::time::Instant::now() < deadline, "deliveries did not settle in time");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    shutdown.shutdown();
    handle.await.unwrap().unwrap();

    // Assert: one failure seen on A, B acked, default resolver acked A too.
    assert_eq!(context.failures_seen.lock().await.as_slice(), ["a"]);
    let mut acks = transport.acks();
    acks.sort_unstable();
    assert_eq!(acks, vec![1, 2]);
}
