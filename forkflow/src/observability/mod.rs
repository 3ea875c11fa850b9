//! Observability utilities.

mod spans;
mod subscriber;

pub use spans::PipelineSpanAttributes;
pub use subscriber::{init_tracing, LogFormat, DEFAULT_FILTER};
