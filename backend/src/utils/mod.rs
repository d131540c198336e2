//! Utility functions and helper modules.

use validator::ValidationError;

pub mod jwt;

const PASSWORD_SYMBOLS: &str = "$@!%*#?&";

/// At least 8 characters drawn from letters, digits and `$@!%*#?&`, with at
/// least one of each kind.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let allowed = password
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || PASSWORD_SYMBOLS.contains(c));
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| PASSWORD_SYMBOLS.contains(c));

    if password.chars().count() >= 8 && allowed && has_letter && has_digit && has_symbol {
        Ok(())
    } else {
        Err(ValidationError::new("password_strength").with_message(
            "Password must be at least 8 characters and include a letter, a digit and one of $@!%*#?&"
                .into(),
        ))
    }
}

/// Digits only, optionally prefixed with `+`, 6 to 15 digits long.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if (6..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("phone").with_message("Invalid phone number".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("hello#world1").is_ok());
        assert!(validate_password_strength("short#1").is_err());
        assert!(validate_password_strength("nodigits#here").is_err());
        assert!(validate_password_strength("nosymbol123").is_err());
        assert!(validate_password_strength("bad space#1x").is_err());
    }

    #[test]
    fn test_phone() {
        assert!(validate_phone("13800138000").is_ok());
        assert!(validate_phone("+8613800138000").is_ok());
        assert!(validate_phone("12ab5678").is_err());
        assert!(validate_phone("").is_err());
    }
}
