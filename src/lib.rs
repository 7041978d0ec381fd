//! `portage` is a consumer-side message-processing engine sitting between a
//! message-broker transport and your handler code.
//!
//! It pulls deliveries off a queue, pushes each one through an ordered
//! middleware chain wrapping the registered handler, applies a bounded retry
//! policy with exponential backoff on failure and settles every delivery with
//! exactly one broker disposition - acknowledge, requeue or dead-letter -
//! while bounding in-flight concurrency.
//!
//! The broker itself stays behind the [`Transport`](crate::transport::Transport)
//! trait: `portage` never manages connections or channels and can be driven
//! by any transport implementation, including in-process ones for testing.
//!
//! [`ConsumerGroup`](crate::consumers::ConsumerGroup) and
//! [`Publisher`](crate::publishers::Publisher) are the best starting points to
//! learn what `portage` provides and how to leverage it.

pub mod consumers;
pub mod publishers;
pub mod retry;
pub mod serialization;
pub mod transport;
