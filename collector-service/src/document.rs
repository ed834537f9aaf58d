//! Nested lookups over status documents.
//!
//! Server and database status documents differ between server versions and
//! storage engines. Every lookup here answers with a default instead of an
//! error when a segment is missing or has an unexpected shape.

use mongodb::bson::{Bson, Document};

/// Path-based accessors with defaults.
pub trait StatusDocument {
    /// Follows `path` through nested documents.
    fn lookup(&self, path: &[&str]) -> Option<&Bson>;

    /// Numeric value at `path`, or `0.0`.
    fn number(&self, path: &[&str]) -> f64 {
        self.lookup(path).and_then(as_number).unwrap_or(0.0)
    }

    /// Boolean value at `path`, or `false`.
    fn flag(&self, path: &[&str]) -> bool {
        match self.lookup(path) {
            Some(Bson::Boolean(value)) => *value,
            Some(other) => as_number(other).is_some_and(|n| n != 0.0),
            None => false,
        }
    }

    /// String value at `path`.
    fn text(&self, path: &[&str]) -> Option<&str> {
        self.lookup(path).and_then(Bson::as_str)
    }

    /// Date value at `path` as milliseconds since the Unix epoch.
    fn timestamp_millis(&self, path: &[&str]) -> Option<i64> {
        match self.lookup(path)? {
            Bson::DateTime(dt) => Some(dt.timestamp_millis()),
            _ => None,
        }
    }
}

impl StatusDocument for Document {
    fn lookup(&self, path: &[&str]) -> Option<&Bson> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for segment in parents {
            current = current.get_document(segment).ok()?;
        }
        current.get(last)
    }
}

/// Coerces the numeric BSON types (and booleans) to `f64`.
fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        Bson::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
        _ => None,
    }
}
