//! Measurement models.
//!
//! A measurement pairs a [`MetricDescriptor`] with the value observed during
//! one poll cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// How the monitoring backend should interpret a measurement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Point-in-time value.
    Gauge,
    /// Cumulative counter; the backend derives a rate from consecutive cycles.
    Derive,
    /// Cumulative timing triple (count, total, latest sample).
    DeriveTiming,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Derive => write!(f, "derive"),
            MetricKind::DeriveTiming => write!(f, "derive_timing"),
        }
    }
}

/// Identity of a measurement.
///
/// The name is a `/`-separated path ending in the host or database the
/// value belongs to, so the same logical metric keeps the same name across
/// polls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MetricDescriptor {
    /// Hierarchical metric name, e.g. `Asserts/Regular/db1.example.com`.
    pub name: String,
    /// Unit label, e.g. `bytes`, `ms`, `ops`.
    pub unit: String,
    /// Measurement kind.
    pub kind: MetricKind,
}

impl MetricDescriptor {
    pub fn new(name: impl Into<String>, unit: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            kind,
        }
    }
}

/// Observed value of a measurement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MeasurementValue {
    /// Single numeric value (gauges and derive counters).
    Scalar { value: f64 },
    /// Timing triple.
    Timing { count: f64, total: f64, latest: f64 },
}

impl MeasurementValue {
    /// Returns the primary numeric value (the total for timings).
    pub fn value(&self) -> f64 {
        match self {
            MeasurementValue::Scalar { value } => *value,
            MeasurementValue::Timing { total, .. } => *total,
        }
    }

    /// Average sample for timings; `None` for scalars or empty timings.
    pub fn average(&self) -> Option<f64> {
        match self {
            MeasurementValue::Timing { count, total, .. } if *count > 0.0 => Some(total / count),
            _ => None,
        }
    }
}

/// One measurement produced during a poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Measurement {
    /// Measurement identity.
    #[serde(flatten)]
    pub descriptor: MetricDescriptor,
    /// Observed value.
    pub value: MeasurementValue,
}

impl Measurement {
    /// Returns the measurement name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Returns the measurement kind.
    pub fn kind(&self) -> MetricKind {
        self.descriptor.kind
    }
}

/// Outcome of one poll cycle, as handed to reporters.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CycleReport {
    /// Short identifier of the cycle, also present in its log span.
    pub cycle_id: String,
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// Wall time spent in the cycle.
    pub duration_ms: u64,
    /// Whether the connection to the server succeeded.
    pub connected: bool,
    /// Measurements collected, ordered by name.
    pub measurements: Vec<Measurement>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_keeps_full_name() {
        let d = MetricDescriptor::new("Database/Size/orders", "bytes", MetricKind::Gauge);
        assert_eq!(d.name, "Database/Size/orders");
        assert_eq!(d.unit, "bytes");
    }

    #[test]
    fn test_timing_average() {
        let v = MeasurementValue::Timing { count: 4.0, total: 10.0, latest: 1.0 };
        assert_eq!(v.average(), Some(2.5));
        assert_eq!(MeasurementValue::Timing { count: 0.0, total: 0.0, latest: 0.0 }.average(), None);
        assert_eq!(MeasurementValue::Scalar { value: 7.0 }.average(), None);
    }

    #[test]
    fn test_measurement_serializes_flat() {
        let m = Measurement {
            descriptor: MetricDescriptor::new("Memory/Resident/h", "megabytes", MetricKind::Gauge),
            value: MeasurementValue::Scalar { value: 12.0 },
        };
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["name"], "Memory/Resident/h");
        assert_eq!(json["kind"], "gauge");
        assert_eq!(json["value"]["type"], "scalar");
        assert_eq!(json["value"]["value"], 12.0);
    }
}
