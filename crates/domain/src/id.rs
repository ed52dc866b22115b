//! ID generation utilities.

use uuid::Uuid;

/// Generates a new request identifier.
///
/// UUID v7 includes timestamp information and is sortable, which keeps
/// request ids in log output ordered by issue time.
#[must_use]
pub fn generate_request_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique_and_ordered() {
        let first = generate_request_id();
        let second = generate_request_id();
        assert_ne!(first, second);
        assert!(first.to_string().len() == 36);
    }

    #[test]
    fn test_request_id_is_v7() {
        let id = generate_request_id();
        assert_eq!(id.get_version_num(), 7);
    }
}
