//! Validation errors and the format rules shared by the domain types

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Number of digits in a national ID once separators are stripped
pub const NATIONAL_ID_DIGITS: usize = 11;

/// local-part "@" domain, dot-atom local part, hyphenated domain labels
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*$",
    )
    .expect("invalid email regex")
});

/// Validation error for domain models
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field is empty when it shouldn't be
    Empty { field: &'static str },

    /// Field exceeds maximum length
    TooLong { field: &'static str, max: usize },

    /// String doesn't match required format
    InvalidFormat { field: &'static str, reason: &'static str },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{} cannot be empty", field),
            Self::TooLong { field, max } => {
                write!(f, "{} exceeds maximum length of {} characters", field, max)
            }
            Self::InvalidFormat { field, reason } => {
                write!(f, "{}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Strip the `.` and `-` separators allowed in a formatted national ID.
pub fn strip_national_id(raw: &str) -> String {
    raw.chars().filter(|c| *c != '.' && *c != '-').collect()
}

/// Check a national ID: exactly 11 decimal digits once `.` and `-` are removed.
///
/// Format only, no check digits are verified.
pub fn validate_national_id(raw: &str) -> bool {
    let digits = strip_national_id(raw);
    digits.len() == NATIONAL_ID_DIGITS && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Check an email address against the `local@domain` grammar.
pub fn validate_email(raw: &str) -> bool {
    EMAIL_RE.is_match(raw)
}
