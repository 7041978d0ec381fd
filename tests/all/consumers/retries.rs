use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use portage::consumers::{ConsumerGroup, ConsumerOptions, HandlerError, Incoming, MessageHandler};
use portage::retry::{
    CounterStore, ExponentialBackoff, InMemoryCounterStore, PersistentRetryPolicy,
};
use shutdown_handler::ShutdownHandler;
use uuid::Uuid;

use crate::helpers::{json_delivery, RecordingPolicy, TestMessage, TestTransport};

#[derive(Clone, Default)]
struct Context {
    handler_calls: Arc<AtomicUsize>,
}

async fn always_failing(incoming: Incoming<'_, Context, TestMessage>) -> Result<(), HandlerError> {
    incoming.context.handler_calls.fetch_add(1, Ordering::SeqCst);
    Err(HandlerError::transient(anyhow::anyhow!("still broken")))
}

#[tokio::test]
async fn an_always_failing_handler_gets_the_full_backoff_schedule_then_one_fallback() {
    // Arrange
    let queue_name = Uuid::new_v4().to_string();
    let transport = Arc::new(TestTransport::new());
    let context = Context::default();
    let policy = Arc::new(RecordingPolicy::new(ExponentialBackoff::new(3, 2)));

    let consumer_group = ConsumerGroup::builder(transport.clone(), context.clone())
        .dyn_retry_policy(policy.clone())
        .exit_after(1)
        .message_handler(
            MessageHandler::builder(ConsumerOptions::new(&queue_name)).handler(always_failing),
        )
        .build()
        .await
        .unwrap();

    // Act
    let handle = tokio::spawn(consumer_group.run_until_stopped());
    transport
        .deliver(&queue_name, json_delivery(1, &queue_name, &TestMessage::new("x")))
        .await;
    handle.await.unwrap().unwrap();

    // Assert: initial attempt plus three retries, with the decided backoff
    // doubling each time, then a single (ack) disposition from the default
    // fallback.
    assert_eq!(context.handler_calls.load(Ordering::SeqCst), 4);
    assert_eq!(
        policy.decided_delays(),
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ]
    );
    assert_eq!(transport.acks(), vec![1]);
    assert_eq!(transport.dispositions(), 1);
}

#[tokio::test]
async fn a_fatal_error_skips_the_retry_schedule() {
    async fn fatal_handler(
        incoming: Incoming<'_, Context, TestMessage>,
    ) -> Result<(), HandlerError> {
        incoming.context.handler_calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::fatal(anyhow::anyhow!("unprocessable")))
    }

    // Arrange
    let queue_name = Uuid::new_v4().to_string();
    let transport = Arc::new(TestTransport::new());
    let context = Context::default();
    let policy = Arc::new(RecordingPolicy::new(ExponentialBackoff::new(3, 2)));

    let consumer_group = ConsumerGroup::builder(transport.clone(), context.clone())
        .dyn_retry_policy(policy.clone())
        .exit_after(1)
        .message_handler(
            MessageHandler::builder(ConsumerOptions::new(&queue_name)).handler(fatal_handler),
        )
        .build()
        .await
        .unwrap();

    // Act
    let handle = tokio::spawn(consumer_group.run_until_stopped());
    transport
        .deliver(&queue_name, json_delivery(1, &queue_name, &TestMessage::new("x")))
        .await;
    handle.await.unwrap().unwrap();

    // Assert: one invocation, no retry decisions at all.
    assert_eq!(context.handler_calls.load(Ordering::SeqCst), 1);
    assert!(policy.decisions().is_empty());
    assert_eq!(transport.dispositions(), 1);
}

/// The persistent policy charges failures recorded by previous deliveries
/// against the budget of the next one.
#[tokio::test]
async fn a_persisted_count_shrinks_the_budget_of_the_next_delivery() {
    // Arrange: two failures already on record for this queue.
    let queue_name = Uuid::new_v4().to_string();
    let store = Arc::new(InMemoryCounterStore::new());
    store
        .increment(&format!("retry:{queue_name}"), 2)
        .await
        .unwrap();
    let persistent = PersistentRetryPolicy::new(store.clone(), "retry:").max_retries(3);

    let transport = Arc::new(TestTransport::new());
    let context = Context::default();
    let policy = Arc::new(RecordingPolicy::new(persistent));

    let consumer_group = ConsumerGroup::builder(transport.clone(), context.clone())
        .dyn_retry_policy(policy.clone())
        .exit_after(1)
        .message_handler(
            MessageHandler::builder(ConsumerOptions::new(&queue_name)).handler(always_failing),
        )
        .build()
        .await
        .unwrap();

    // Act
    let handle = tokio::spawn(consumer_group.run_until_stopped());
    transport
        .deliver(&queue_name, json_delivery(1, &queue_name, &TestMessage::new("x")))
        .await;
    handle.await.unwrap().unwrap();

    // Assert: only one retry left out of three, and the backoff exponent
    // accounts for the two persisted failures (2^(1+2) = 8s).
    assert_eq!(context.handler_calls.load(Ordering::SeqCst), 2);
    assert_eq!(policy.decided_delays(), vec![Duration::from_secs(8)]);
}

/// Shutting down while a delivery sleeps out its backoff hands the message
/// back to the broker right away: a single requeueing nack, no extra attempt.
#[tokio::test]
async fn shutdown_mid_backoff_requeues_with_a_single_nack() {
    // Arrange: a backoff long enough that the test would time out if the
    // sleep ran to completion.
    let queue_name = Uuid::new_v4().to_string();
    let transport = Arc::new(TestTransport::new());
    let context = Context::default();

    let consumer_group = ConsumerGroup::builder(transport.clone(), context.clone())
        .retry_policy(ExponentialBackoff::new(3, 60))
        .message_handler(
            MessageHandler::builder(ConsumerOptions::new(&queue_name)).handler(always_failing),
        )
        .build()
        .await
        .unwrap();

    // Act
    let shutdown = Arc::new(ShutdownHandler::new());
    let handle = tokio::spawn(consumer_group.run_until_shutdown(shutdown.clone()));
    transport
        .deliver(&queue_name, json_delivery(1, &queue_name, &TestMessage::new("x")))
        .await;
    // Wait for the first attempt to fail and enter its backoff sleep.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while context.handler_calls.load(Ordering::SeqCst) < 1 {
        assert!(tokio::time::Instant::now() < deadline, "handler never ran");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    shutdown.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("shutdown slept out the backoff")
        .unwrap()
        .unwrap();

    // Assert: one attempt, one disposition, requeued.
    assert_eq!(context.handler_calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.nacks(), vec![(1, true)]);
    assert!(transport.acks().is_empty());
}
