//! Utility functions for ID generation, timestamps and variable templating.

mod ids;
pub mod template;

pub use ids::{generate_id, generate_time_ordered_id};
pub use template::{interpolate, value_to_string};

use chrono::{DateTime, Utc};

/// Returns the current UTC time.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds elapsed between two instants, clamped at zero.
#[must_use]
pub fn duration_ms(started: DateTime<Utc>, completed: DateTime<Utc>) -> i64 {
    (completed - started).num_milliseconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_duration_ms() {
        let start = now();
        let end = start + Duration::milliseconds(1500);
        assert_eq!(duration_ms(start, end), 1500);
    }

    #[test]
    fn test_duration_ms_clamps_negative() {
        let start = now();
        let end = start - Duration::seconds(1);
        assert_eq!(duration_ms(start, end), 0);
    }
}
