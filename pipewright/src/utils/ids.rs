//! Record identifier generation.

use uuid::Uuid;

/// Generates a random (v4) identifier for definitions, triggers and artifacts.
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a time-ordered (v7) identifier.
///
/// Used for executions so that lexical order follows creation order.
#[must_use]
pub fn generate_time_ordered_id() -> String {
    Uuid::now_v7().to_string()
}
