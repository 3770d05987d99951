//! Year-scoped sequential member codes of the form `PREFIX-YEAR-NNNNNN`.

/// Returns the code following `last_code` for the given prefix and year.
///
/// `last_code` is the highest code already issued for this prefix+year (or
/// `None` when the sequence is empty). Sequence numbers are six digits,
/// zero-padded, starting at 1. Reading the last code and incrementing is not
/// safe under concurrent creation; callers must do this inside a transaction.
pub fn next_member_code(prefix: &str, year: i32, last_code: Option<&str>) -> String {
    let sequence = last_code.and_then(parse_sequence).unwrap_or(0) + 1;
    format!("{prefix}-{year}-{sequence:06}")
}

/// Extracts the trailing sequence number from a member code.
pub fn parse_sequence(code: &str) -> Option<u32> {
    code.rsplit('-').next()?.parse().ok()
}

/// The `LIKE` pattern matching all codes issued for a prefix+year.
pub fn code_pattern(prefix: &str, year: i32) -> String {
    format!("{prefix}-{year}-%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_code_of_year() {
        assert_eq!(next_member_code("PMC", 2024, None), "PMC-2024-000001");
    }

    #[test]
    fn test_increments_last_code() {
        assert_eq!(
            next_member_code("PMC", 2024, Some("PMC-2024-001234")),
            "PMC-2024-001235"
        );
    }

    #[test]
    fn test_sequence_resets_between_years() {
        // The caller scopes the lookup by year, so a new year starts at 1.
        assert_eq!(next_member_code("PMC", 2025, None), "PMC-2025-000001");
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("PMC-2024-000042"), Some(42));
        assert_eq!(parse_sequence("garbage"), None);
    }

    #[test]
    fn test_code_pattern() {
        assert_eq!(code_pattern("PMC", 2024), "PMC-2024-%");
    }
}
