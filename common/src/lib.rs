//! Shared building blocks for the MongoDB metrics collector.
//!
//! Holds configuration, the error taxonomy, measurement models, the
//! per-cycle measurement sink, and the HTTP response envelope.

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod sink;
pub mod utils;

pub use errors::{AppError, AppResult};
pub use sink::MetricSink;
