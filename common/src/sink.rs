//! Per-cycle measurement sink.
//!
//! The extractors append to a [`MetricSink`] during one poll cycle; the
//! host drains it after transmission. Writing the same name twice within a
//! cycle keeps the latest value.

use std::collections::BTreeMap;

use crate::models::metric::{Measurement, MeasurementValue, MetricDescriptor, MetricKind};

/// Accumulates measurements keyed by name.
#[derive(Debug, Default)]
pub struct MetricSink {
    measurements: BTreeMap<String, Measurement>,
}

impl MetricSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a point-in-time value.
    pub fn gauge(&mut self, name: impl Into<String>, unit: &str, value: f64) {
        self.insert(name.into(), unit, MetricKind::Gauge, MeasurementValue::Scalar { value });
    }

    /// Records a cumulative counter value.
    pub fn derive(&mut self, name: impl Into<String>, unit: &str, value: f64) {
        self.insert(name.into(), unit, MetricKind::Derive, MeasurementValue::Scalar { value });
    }

    /// Records a cumulative timing triple.
    pub fn derive_timing(
        &mut self,
        name: impl Into<String>,
        unit: &str,
        count: f64,
        total: f64,
        latest: f64,
    ) {
        self.insert(
            name.into(),
            unit,
            MetricKind::DeriveTiming,
            MeasurementValue::Timing { count, total, latest },
        );
    }

    fn insert(&mut self, name: String, unit: &str, kind: MetricKind, value: MeasurementValue) {
        let measurement = Measurement {
            descriptor: MetricDescriptor::new(name.clone(), unit, kind),
            value,
        };
        self.measurements.insert(name, measurement);
    }

    /// Looks up a measurement by its full name.
    pub fn get(&self, name: &str) -> Option<&Measurement> {
        self.measurements.get(name)
    }

    /// Returns the scalar value (or timing total) recorded under `name`.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|m| m.value.value())
    }

    /// Iterates measurements in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.values()
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Takes every measurement out of the sink, leaving it empty.
    pub fn drain(&mut self) -> Vec<Measurement> {
        std::mem::take(&mut self.measurements).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_overwrites_same_name() {
        let mut sink = MetricSink::new();
        sink.gauge("Connections/Current/h", "connections", 3.0);
        sink.gauge("Connections/Current/h", "connections", 5.0);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.value("Connections/Current/h"), Some(5.0));
    }

    #[test]
    fn test_kinds_are_recorded() {
        let mut sink = MetricSink::new();
        sink.gauge("a", "bytes", 1.0);
        sink.derive("b", "ops", 2.0);
        sink.derive_timing("c", "ms", 3.0, 30.0, 9.0);
        assert_eq!(sink.get("a").unwrap().kind(), MetricKind::Gauge);
        assert_eq!(sink.get("b").unwrap().kind(), MetricKind::Derive);
        assert_eq!(
            sink.get("c").unwrap().value,
            MeasurementValue::Timing { count: 3.0, total: 30.0, latest: 9.0 }
        );
    }

    #[test]
    fn test_drain_empties_sink() {
        let mut sink = MetricSink::new();
        sink.derive("b", "ops", 2.0);
        sink.gauge("a", "bytes", 1.0);
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].name(), "a");
        assert!(sink.is_empty());
    }
}
