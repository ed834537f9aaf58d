//! Declarative field-to-metric mapping.

use common::MetricSink;
use mongodb::bson::Document;

use crate::document::StatusDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emit {
    Gauge,
    Derive,
}

/// One document field and the measurement it becomes.
///
/// The emitted name is `{name}/{suffix}` where the suffix is the host or
/// database being described.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    emit: Emit,
    pub name: &'static str,
    pub unit: &'static str,
    pub path: &'static [&'static str],
    divisor: f64,
}

impl MetricSpec {
    pub const fn gauge(name: &'static str, unit: &'static str, path: &'static [&'static str]) -> Self {
        Self { emit: Emit::Gauge, name, unit, path, divisor: 1.0 }
    }

    pub const fn derive(name: &'static str, unit: &'static str, path: &'static [&'static str]) -> Self {
        Self { emit: Emit::Derive, name, unit, path, divisor: 1.0 }
    }

    /// Divides the raw field value before emitting it.
    pub const fn divided_by(self, divisor: f64) -> Self {
        Self { divisor, ..self }
    }

    /// Reads the field from `doc` (0 when absent) and records it.
    pub fn record(&self, doc: &Document, suffix: &str, sink: &mut MetricSink) {
        let value = doc.number(self.path) / self.divisor;
        let name = format!("{}/{}", self.name, suffix);
        match self.emit {
            Emit::Gauge => sink.gauge(name, self.unit, value),
            Emit::Derive => sink.derive(name, self.unit, value),
        }
    }
}

/// Records every spec in `specs`.
pub fn record_all(specs: &[MetricSpec], doc: &Document, suffix: &str, sink: &mut MetricSink) {
    for spec in specs {
        spec.record(doc, suffix, sink);
    }
}
