//! Field-level validators shared by every write endpoint.
//!
//! Each validator returns `Option<ValidationError>` so a request handler can
//! run all of them and report every failing field at once via
//! [`ValidationErrors::collect`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;

use crate::money::{Amount, AmountError, AmountInput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("Validation failed: {}", summary(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

fn summary(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    /// Keeps the failing checks; `Ok(())` when every check passed.
    pub fn collect<I>(checks: I) -> Result<(), ValidationErrors>
    where
        I: IntoIterator<Item = Option<ValidationError>>,
    {
        let errors: Vec<ValidationError> = checks.into_iter().flatten().collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors { errors })
        }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![ValidationError::new(field, message)],
        }
    }

    pub fn first_message(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

pub fn validate_string(
    value: Option<&str>,
    field: &str,
    max_length: usize,
    required: bool,
) -> Option<ValidationError> {
    match value {
        None if required => Some(ValidationError::new(field, format!("{} is required", field))),
        Some(v) if required && v.trim().is_empty() => {
            Some(ValidationError::new(field, format!("{} is required", field)))
        }
        Some(v) if v.chars().count() > max_length => Some(ValidationError::new(
            field,
            format!("{} cannot exceed {} characters", field, max_length),
        )),
        _ => None,
    }
}

/// International formats: digits, spaces, `-`, `+` and parentheses, with
/// 10 to 15 digits overall.
pub fn validate_phone(phone: &str) -> Option<ValidationError> {
    if phone.trim().is_empty() {
        return Some(ValidationError::new("phone", "Phone number is required"));
    }

    let allowed = |c: char| c.is_ascii_digit() || matches!(c, ' ' | '-' | '+' | '(' | ')');
    if !phone.chars().all(allowed) {
        return Some(ValidationError::new("phone", "Invalid phone format"));
    }

    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if !(10..=15).contains(&digits) {
        return Some(ValidationError::new(
            "phone",
            "Phone number must contain between 10 and 15 digits",
        ));
    }

    None
}

pub fn validate_integer_range(value: i64, field: &str, min: i64, max: i64) -> Option<ValidationError> {
    if value < min || value > max {
        return Some(ValidationError::new(
            field,
            format!("{} must be between {} and {}", field, min, max),
        ));
    }
    None
}

pub fn validate_amount(value: f64, field: &str) -> Option<ValidationError> {
    Amount::from_f64(value).err().map(|e| amount_error(&e, field))
}

/// Parses a client-supplied amount, reporting failures against `field`.
pub fn parse_amount(input: &AmountInput, field: &str) -> Result<Amount, ValidationError> {
    input.parse().map_err(|e| amount_error(&e, field))
}

fn amount_error(err: &AmountError, field: &str) -> ValidationError {
    match err {
        AmountError::OutOfRange => ValidationError::new(
            field,
            format!("{} must be between 0€ and 999999€", field),
        ),
        AmountError::TooManyDecimals => ValidationError::new(
            field,
            format!("{} cannot have more than 2 decimals", field),
        ),
        AmountError::Invalid(_) => ValidationError::new(field, format!("{} must be a number", field)),
    }
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DDTHH:MM[:SS]` local times and plain dates.
pub fn validate_date(value: &str, field: &str) -> Option<ValidationError> {
    if value.trim().is_empty() {
        return Some(ValidationError::new(field, format!("{} is required", field)));
    }
    if parses_as_date(value) {
        None
    } else {
        Some(ValidationError::new(field, format!("{} is not a valid date", field)))
    }
}

fn parses_as_date(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

/// Rating is optional; when present it must be an integer from 1 to 5.
pub fn validate_rating(value: Option<i64>) -> Option<ValidationError> {
    value.and_then(|v| validate_integer_range(v, "rating", 1, 5))
}

pub fn validate_enum<T>(value: &str, field: &str, allowed: &[T]) -> Option<ValidationError>
where
    T: AsRef<str>,
{
    if allowed.iter().any(|a| a.as_ref() == value) {
        return None;
    }
    let choices = allowed.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ");
    Some(ValidationError::new(
        field,
        format!("{} must be one of: {}", field, choices),
    ))
}
