//! Ready-to-go implementations of the consumer extension points.

pub mod fallback;
