use bigdecimal::BigDecimal;
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

pub const USER_ID_MAX_LEN: usize = 128;
pub const NOTE_MAX_LEN: usize = 280;
pub const BANK_REFERENCE_MAX_LEN: usize = 20;
pub const AMOUNT_INPUT_MAX_LEN: usize = 32;
pub const AMOUNT_MAX_FRACTION_DIGITS: i64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e.to_string())
    }
}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_user_id(field: &'static str, user_id: &str) -> ValidationResult {
    validate_required(field, user_id)?;
    validate_max_len(field, user_id, USER_ID_MAX_LEN)?;

    if user_id.chars().any(|ch| ch.is_control() || ch.is_whitespace()) {
        return Err(ValidationError::new(
            field,
            "must not contain whitespace or control characters",
        ));
    }

    Ok(())
}

/// Parses a money amount, rejecting more than two fraction digits.
pub fn parse_amount(field: &'static str, raw: &str) -> Result<BigDecimal, ValidationError> {
    let raw = raw.trim();
    validate_required(field, raw)?;
    validate_max_len(field, raw, AMOUNT_INPUT_MAX_LEN)?;

    let amount = BigDecimal::from_str(raw)
        .map_err(|_| ValidationError::new(field, "must be a decimal number"))?;
    validate_scale(field, &amount)?;
    Ok(amount)
}

pub fn validate_scale(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    let (_, scale) = amount.normalized().as_bigint_and_exponent();
    if scale > AMOUNT_MAX_FRACTION_DIGITS {
        return Err(ValidationError::new(
            field,
            format!("must have at most {} decimal places", AMOUNT_MAX_FRACTION_DIGITS),
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new(field, "must be greater than zero"));
    }
    validate_scale(field, amount)
}

pub fn validate_fee(fee: &BigDecimal) -> ValidationResult {
    if fee < &BigDecimal::from(0) {
        return Err(ValidationError::new("fee", "must not be negative"));
    }
    validate_scale("fee", fee)
}

pub fn validate_note(note: &str) -> ValidationResult {
    validate_max_len("note", note, NOTE_MAX_LEN)
}

pub fn validate_bank_reference(reference: &str) -> ValidationResult {
    validate_required("bankReference", reference)?;
    validate_max_len("bankReference", reference, BANK_REFERENCE_MAX_LEN)?;

    if !reference
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == ' ' || ch == '-')
    {
        return Err(ValidationError::new(
            "bankReference",
            "must contain only letters, digits, spaces and hyphens",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "abcd");
    }

    #[test]
    fn validates_user_id() {
        assert!(validate_user_id("senderId", "user-42").is_ok());
        assert!(validate_user_id("senderId", "").is_err());
        assert!(validate_user_id("senderId", "two words").is_err());
        assert!(validate_user_id("senderId", &"a".repeat(129)).is_err());
    }

    #[test]
    fn parses_amounts_with_two_decimals() {
        assert_eq!(
            parse_amount("amount", " 103.00 ").unwrap(),
            BigDecimal::from(103)
        );
        assert!(parse_amount("amount", "10.5").is_ok());
        assert!(parse_amount("amount", "10.500").is_ok());
        assert!(parse_amount("amount", "10.505").is_err());
        assert!(parse_amount("amount", "ten").is_err());
        assert!(parse_amount("amount", "").is_err());
    }

    #[test]
    fn validates_positive_amount() {
        let positive = BigDecimal::from_str("1.23").expect("valid decimal");
        let zero = BigDecimal::from(0);
        let negative = BigDecimal::from(-1);

        assert!(validate_positive_amount("amount", &positive).is_ok());
        assert!(validate_positive_amount("amount", &zero).is_err());
        assert!(validate_positive_amount("amount", &negative).is_err());
    }

    #[test]
    fn validates_fee() {
        assert!(validate_fee(&BigDecimal::from(0)).is_ok());
        assert!(validate_fee(&BigDecimal::from(-1)).is_err());
        assert!(validate_fee(&BigDecimal::from_str("0.001").unwrap()).is_err());
    }

    #[test]
    fn validates_bank_reference() {
        assert!(validate_bank_reference("WALLET TOPUP").is_ok());
        assert!(validate_bank_reference("").is_err());
        assert!(validate_bank_reference(&"A".repeat(21)).is_err());
        assert!(validate_bank_reference("drop;table").is_err());
    }
}
