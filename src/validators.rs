//! Local input validators
//!
//! Everything here runs before a request is built, so a rejected value never
//! reaches the network.

use crate::error::ValidationError;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Exactly twelve ASCII digits, nothing else
    static ref AADHAAR_REGEX: Regex = Regex::new(r"^[0-9]{12}$").unwrap();
    static ref CONNECTS_REGEX: Regex = Regex::new(r"^[0-9]+$").unwrap();
}

/// Validates an Aadhaar number for KYC submission.
pub fn validate_aadhaar(number: &str) -> Result<String, ValidationError> {
    if !AADHAAR_REGEX.is_match(number) {
        return Err(ValidationError::InvalidAadhaar);
    }
    Ok(number.to_string())
}

/// Parses a user-entered Connects amount (a positive whole number).
pub fn parse_connects(input: &str) -> Result<u64, ValidationError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("amount"));
    }

    if !CONNECTS_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("amount"));
    }

    let amount: u64 = trimmed
        .parse()
        .map_err(|_| ValidationError::InvalidFormat("amount"))?;

    if amount == 0 {
        return Err(ValidationError::NotPositive("amount"));
    }

    Ok(amount)
}

/// Trims a chat message and rejects it if nothing is left.
pub fn validate_message_text(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("message"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_aadhaar() {
        assert_eq!(validate_aadhaar("123456789012").unwrap(), "123456789012");
    }

    #[test]
    fn test_invalid_aadhaar() {
        for input in ["", "12345678901", "1234567890123", "12345678901a", " 123456789012"] {
            assert_eq!(
                validate_aadhaar(input),
                Err(ValidationError::InvalidAadhaar),
                "{:?} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_aadhaar_error_message() {
        let err = validate_aadhaar("1").unwrap_err();
        assert_eq!(err.to_string(), "Aadhaar number must be exactly 12 digits");
    }

    #[test]
    fn test_parse_connects() {
        assert_eq!(parse_connects("150"), Ok(150));
        assert_eq!(parse_connects("  20 "), Ok(20));
        assert_eq!(parse_connects(""), Err(ValidationError::EmptyField("amount")));
        assert_eq!(parse_connects("0"), Err(ValidationError::NotPositive("amount")));
        assert_eq!(parse_connects("-5"), Err(ValidationError::InvalidFormat("amount")));
        assert_eq!(parse_connects("1.5"), Err(ValidationError::InvalidFormat("amount")));
    }

    #[test]
    fn test_parse_connects_overflow_is_invalid() {
        assert_eq!(
            parse_connects("99999999999999999999999"),
            Err(ValidationError::InvalidFormat("amount"))
        );
    }

    #[test]
    fn test_message_text_is_trimmed() {
        assert_eq!(validate_message_text("  hi there \n").unwrap(), "hi there");
        assert_eq!(
            validate_message_text("   "),
            Err(ValidationError::EmptyField("message"))
        );
    }
}
