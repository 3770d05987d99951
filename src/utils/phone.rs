use crate::error::{AppError, AppResult};
use regex::Regex;

/// Normalizes a mobile number: strips whitespace and keeps only digits and
/// a leading `+`.
pub fn format_mobile_number(mobile: &str) -> String {
    let mut out = String::with_capacity(mobile.len());
    for (i, c) in mobile.chars().filter(|c| !c.is_whitespace()).enumerate() {
        if c.is_ascii_digit() || (c == '+' && i == 0) {
            out.push(c);
        }
    }
    out
}

/// Basic shape check for an international mobile number.
pub fn validate_mobile_number(mobile: &str) -> AppResult<()> {
    let mobile_regex = Regex::new(r"^\+?\d{7,15}$").unwrap();

    if !mobile_regex.is_match(mobile) {
        return Err(AppError::ValidationError(
            "Invalid mobile number format".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mobile_number() {
        assert_eq!(format_mobile_number("+1 555 123 4567"), "+15551234567");
        assert_eq!(format_mobile_number("(555) 123-4567"), "5551234567");
        assert_eq!(format_mobile_number("+44 20 7946 0958"), "+442079460958");
    }

    #[test]
    fn test_validate_mobile_number() {
        assert!(validate_mobile_number("+15551234567").is_ok());
        assert!(validate_mobile_number("5551234567").is_ok());
        assert!(validate_mobile_number("123").is_err());
        assert!(validate_mobile_number("+1-555").is_err());
    }
}
