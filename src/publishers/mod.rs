//! Facilities to publish messages through a [`Transport`](crate::transport::Transport).
//! Check out [`Publisher`] as a starting point.
mod message_envelope;
mod publisher;

pub use message_envelope::MessageEnvelope;
pub use publisher::{Publisher, PublisherBuilder, PublishError};
