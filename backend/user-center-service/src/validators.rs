use crate::error::{Result, UserCenterError};
use once_cell::sync::Lazy;
use regex::Regex;

/// Input validation utilities for account operations

/// Floor for any configured minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 6;

// Column widths in characters, mirrored from the schema
pub const MAX_NICKNAME_LENGTH: usize = 64;
pub const MAX_SOURCE_LENGTH: usize = 64;
pub const MAX_PRODUCT_ID_LENGTH: usize = 128;
pub const MAX_PRODUCT_NAME_LENGTH: usize = 255;
pub const MAX_AUDIT_USERNAME_LENGTH: usize = 254;
pub const MAX_IP_ADDRESS_LENGTH: usize = 64;
pub const MAX_DEVICE_ID_LENGTH: usize = 128;

// Compile regex patterns once at startup
// These patterns are hardcoded and always valid, so we use expect() with explicit reasoning
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded email regex is invalid - fix source code")
});

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]{3,32}$")
        .expect("hardcoded username regex is invalid - fix source code")
});

/// Validate email format (RFC 5322 simplified)
pub fn validate_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// Validate username format (3-32 characters, alphanumeric with - and _)
pub fn validate_username(username: &str) -> bool {
    USERNAME_REGEX.is_match(username)
}

/// Trim `value` and reject it when nothing is left
pub fn required<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(UserCenterError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed)
}

/// Trim an optional value, mapping blank input to `None`
pub fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Reject `value` when it holds more than `max` characters
pub fn bounded<'a>(field: &str, value: &'a str, max: usize) -> Result<&'a str> {
    if value.chars().count() > max {
        return Err(UserCenterError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(value)
}

/// [`required`] followed by [`bounded`]
pub fn required_bounded<'a>(field: &str, value: &'a str, max: usize) -> Result<&'a str> {
    bounded(field, required(field, value)?, max)
}

/// [`optional`] followed by [`bounded`]
pub fn optional_bounded(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>> {
    optional(value)
        .map(|v| bounded(field, &v, max).map(str::to_string))
        .transpose()
}

/// Cut recorded metadata to `max` characters; never fails
pub fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

pub fn check_username(username: &str) -> Result<String> {
    let username = required("username", username)?;
    if !validate_username(username) {
        return Err(UserCenterError::Validation(
            "username must be 3-32 characters of letters, digits, '-' or '_'".to_string(),
        ));
    }
    Ok(username.to_string())
}

pub fn check_email(email: &str) -> Result<String> {
    let email = required("email", email)?;
    if !validate_email(email) {
        return Err(UserCenterError::Validation(format!(
            "invalid email: {}",
            email
        )));
    }
    Ok(email.to_string())
}

/// Passwords are not trimmed; length counts characters, not bytes
pub fn check_password(password: &str, min_length: usize) -> Result<()> {
    if password.is_empty() {
        return Err(UserCenterError::Validation("password is required".to_string()));
    }
    let min_length = min_length.max(MIN_PASSWORD_LENGTH);
    if password.chars().count() < min_length {
        return Err(UserCenterError::Validation(format!(
            "password must be at least {} characters",
            min_length
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(validate_email("user@example.com"));
        assert!(validate_email("test.user+tag@sub.example.co.uk"));
    }

    #[test]
    fn test_invalid_email() {
        assert!(!validate_email("invalid"));
        assert!(!validate_email("@example.com"));
        assert!(!validate_email("user@"));
    }

    #[test]
    fn test_valid_username() {
        assert!(validate_username("john_doe"));
        assert!(validate_username("user-123"));
        assert!(validate_username("bob"));
    }

    #[test]
    fn test_invalid_username() {
        assert!(!validate_username("ab")); // Too short
        assert!(!validate_username(&"a".repeat(33))); // Too long
        assert!(!validate_username("user@name")); // Invalid character
    }

    #[test]
    fn test_password_length() {
        assert!(check_password("secret", 6).is_ok());
        assert!(matches!(
            check_password("five5", 6),
            Err(UserCenterError::Validation(_))
        ));
        assert!(matches!(
            check_password("", 6),
            Err(UserCenterError::Validation(_))
        ));
        // configured minimum never drops below the floor
        assert!(check_password("abcde", 2).is_err());
        assert!(check_password("abcdefg", 8).is_err());
    }

    #[test]
    fn test_required_and_optional_trim() {
        assert_eq!(required("username", "  bob ").unwrap(), "bob");
        assert!(required("username", "   ").is_err());
        assert_eq!(optional(Some("  x ")), Some("x".to_string()));
        assert_eq!(optional(Some("   ")), None);
        assert_eq!(optional(None), None);
    }

    #[test]
    fn test_bounded_lengths() {
        assert_eq!(bounded("nickname", "Bob", 3).unwrap(), "Bob");
        assert!(matches!(
            bounded("nickname", "Bobby", 3),
            Err(UserCenterError::Validation(_))
        ));
        // characters, not bytes
        assert!(bounded("nickname", "ééé", 3).is_ok());

        assert_eq!(required_bounded("name", " CRM ", 3).unwrap(), "CRM");
        assert!(required_bounded("name", "  ", 3).is_err());
        assert!(required_bounded("name", "CRMX", 3).is_err());

        assert_eq!(optional_bounded("source", None, 3).unwrap(), None);
        assert_eq!(optional_bounded("source", Some("  "), 3).unwrap(), None);
        assert_eq!(
            optional_bounded("source", Some(" web "), 3).unwrap(),
            Some("web".to_string())
        );
        assert!(optional_bounded("source", Some("mobile"), 3).is_err());
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("ééééé", 2), "éé");
    }
}
