use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::consumers::dispatcher::Dispatcher;
use crate::consumers::ConcurrencyGate;
use crate::serialization::MessageSerializer;
use crate::transport::Transport;

/// The actual implementation of a queue consumer.
///
/// [`ConsumerGroup`] instantiates a `Consumer` for each [`MessageHandler`].
///
/// Users of the crate are never exposed to `Consumer` directly - it's an
/// implementation detail whose interface is free to evolve over time (as long
/// as it does not require changes to the builder interface for
/// [`ConsumerGroup`] and [`MessageHandler`]).
///
/// [`ConsumerGroup`]: super::ConsumerGroup
/// [`MessageHandler`]: super::MessageHandler
pub(super) struct Consumer<C, T, S, Tr>
where
    C: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// The per-delivery orchestrator, shared with every spawned dispatch task.
    pub(super) dispatcher: Arc<Dispatcher<C, T, S, Tr>>,
    /// Application-level admission gate, sized to the consumer's QoS.
    pub(super) gate: ConcurrencyGate,
    /// The maximum number of deliveries this consumer is going to start
    /// processing before exiting the processing loop.
    /// The consumer will process messages indefinitely if set to `None`.
    pub(super) exit_after: Option<usize>,
}

/// Object-safe face of [`Consumer`], letting a [`ConsumerGroup`] hold
/// consumers with different message types side by side.
///
/// [`ConsumerGroup`]: super::ConsumerGroup
#[async_trait::async_trait]
pub(super) trait GroupConsumer: Send + Sync {
    /// Validate the consumer's options and, when auto-declare is on, set up
    /// the queue topology with the transport.
    async fn prepare(&self) -> Result<(), anyhow::Error>;

    /// Run the consumer until the queue's delivery stream ends, the
    /// `shutdown` future resolves, or the exit-after budget is spent.
    async fn run_until_shutdown(
        self: Box<Self>,
        shutdown: BoxFuture<'static, ()>,
    ) -> Result<(), anyhow::Error>;
}

#[async_trait::async_trait]
impl<C, T, S, Tr> GroupConsumer for Consumer<C, T, S, Tr>
where
    C: Send + Sync + 'static,
    T: DeserializeOwned + Send + Sync + 'static,
    S: MessageSerializer,
    Tr: Transport,
{
    async fn prepare(&self) -> Result<(), anyhow::Error> {
        let options = &self.dispatcher.options;
        options.validate()?;
        if options.auto_declare {
            self.dispatcher
                .transport
                .declare_queue(&options.to_declaration())
                .await?;
        }
        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        name = "consumer_run",
        fields(queue_name = %self.dispatcher.options.queue)
    )]
    async fn run_until_shutdown(
        self: Box<Self>,
        shutdown: BoxFuture<'static, ()>,
    ) -> Result<(), anyhow::Error> {
        let queue_name = self.dispatcher.options.queue.clone();
        let mut deliveries = self
            .dispatcher
            .transport
            .consume(&queue_name, &Uuid::new_v4().to_string())
            .await?;

        // Root of the per-delivery cancellation scopes: cancelled on
        // shutdown so deliveries waiting out a backoff get handed back
        // promptly instead of sleeping through the stop.
        let cancellation = CancellationToken::new();
        let mut task_handles = FuturesUnordered::new();
        let mut counter = 0;

        let mut shutdown = shutdown.fuse();

        let result = 'event_loop: loop {
            // have we consumed all the events we want?
            if self.exit_after == Some(counter) {
                break 'event_loop Ok(());
            }

            tokio::select! {
                // poll in the declared order - handling shutdown is
                // preferred over processing more events
                biased;

                // check for a shutdown signal
                _ = &mut shutdown => {
                    tracing::info!("consumer received shutdown event");
                    cancellation.cancel();
                    break 'event_loop Ok(());
                }

                // clear out some of our task handles
                _ = task_handles.next(), if !task_handles.is_empty() => {}

                // try get the next delivery
                event = deliveries.next() => {
                    match event {
                        // the transport closed the stream
                        None => { break 'event_loop Ok(()) }
                        Some(Err(e)) => {
                            tracing::error!("Consumer error: {}", e);
                            break 'event_loop Err(e.into())
                        }
                        Some(Ok(delivery)) => {
                            // A slot must be free before processing starts:
                            // the gate mirrors the broker's prefetch window
                            // at the application level. The wait still honours
                            // shutdown: with the gate full, permits may not
                            // free up until in-flight backoffs are cancelled.
                            let permit = tokio::select! {
                                biased;

                                _ = &mut shutdown => {
                                    tracing::info!("consumer received shutdown event");
                                    cancellation.cancel();
                                    break 'event_loop Ok(());
                                }

                                permit = self.gate.admit() => match permit {
                                    Ok(permit) => permit,
                                    Err(e) => break 'event_loop Err(e),
                                },
                            };
                            // Spawn the dispatch as its own task to process
                            // multiple messages concurrently, up to the gate
                            // limit. This also isolates failures: one
                            // message (even a panicking one) cannot tear the
                            // whole consumer down.
                            let dispatcher = self.dispatcher.clone();
                            let token = cancellation.child_token();
                            let handle = tokio::spawn(async move {
                                let _permit = permit;
                                dispatcher.dispatch(delivery, token).await;
                            });
                            task_handles.push(handle);
                            counter += 1;
                        }
                    }
                }
            }
        };

        // Make sure all dispatches in flight settle their deliveries before
        // returning. If the set is empty, this returns immediately.
        while task_handles.next().await.is_some() {}

        result
    }
}
