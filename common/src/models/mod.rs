//! Shared data models.

pub mod metric;

// Re-export commonly used types
pub use metric::{CycleReport, Measurement, MeasurementValue, MetricDescriptor, MetricKind};
