//! Facilities to consume and process messages pulled from a queue. Check out
//! [`ConsumerGroup`] as a starting point.

pub use builders::{
    ConsumerGroup, ConsumerGroupBuilder, ConsumerGroupConfigurationBuilder, MessageHandler,
    MessageHandlerBuilder,
};
pub use error::{DispatchFailure, ErrorType, HandlerError};
pub use fallback::{ConsumerState, FallbackResolver};
pub use gate::{AdmissionPermit, ConcurrencyGate};
pub use handler::{AsyncClosure, ClosureHandler, Handler};
pub use header::MessageHeader;
pub use incoming::Incoming;
pub use middleware::{Next, ProcessingMiddleware};
pub use options::{ConsumerOptions, OptionsValidationError};

mod builders;
mod consumer;
mod dispatcher;
mod error;
mod fallback;
mod gate;
mod handler;
mod header;
pub mod hooks;
mod incoming;
mod middleware;
mod options;
