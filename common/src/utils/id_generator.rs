//! Unique ID generator.

use uuid::Uuid;

/// Generates identifiers for requests and poll cycles.
pub struct IdGenerator;

impl IdGenerator {
    /// Generates a unique request ID.
    pub fn request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Generates a short poll-cycle ID (first 8 characters of a UUID).
    pub fn cycle_id() -> String {
        Uuid::new_v4().simple().to_string()[..8].to_string()
    }
}
