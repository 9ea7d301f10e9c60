/// Current UTC timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a new record id.
///
/// Record ids are opaque UUIDv4 strings, distinct from the
/// human-legible identifiers (order numbers, ticket codes) that the
/// server derives separately.
pub fn record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ids_are_unique() {
        let a = record_id();
        let b = record_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2024-01-01 as a sanity lower bound
        assert!(now_millis() > 1_704_067_200_000);
    }
}
