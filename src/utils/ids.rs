//! Unique identifier generation
//!
//! Timestamped ids for correlation headers, ephemeral database names and
//! stored report files. Unique enough for concurrent test runs sharing
//! one service account; not cryptographic.

use chrono::Utc;

/// Generate a prefixed, timestamped unique id, e.g.
/// `txn-20260823_141503-0042`.
pub fn unique_id(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S%3f");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{prefix}-{timestamp}-{random:04}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_shape() {
        let id = unique_id("db");
        assert!(id.starts_with("db-"));
        assert!(id.len() > 10);
    }

    #[test]
    fn test_unique_ids_differ() {
        let a = unique_id("db");
        let b = unique_id("db");
        assert_ne!(a, b);
    }
}
