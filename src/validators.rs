/// Input validators module - username and password policy
/// Features:
/// 1. Username format: ASCII letters and digits only, 1 to 12 characters
/// 2. Password strength: length plus four character classes
/// 3. Sanitization: strips quote, comment and path characters from identifiers

use regex::Regex;
use lazy_static::lazy_static;

use crate::error::ValidationError;

pub const MAX_USERNAME_LENGTH: usize = 12;
pub const MIN_PASSWORD_LENGTH: usize = 9;
/// bcrypt only looks at the first 72 bytes; longer inputs are refused
pub const MAX_PASSWORD_LENGTH: usize = 72;
pub const SPECIAL_CHARACTERS: &str = r#"!@#$%^&*()_+-=[]{};':"\|,.<>/?"#;

lazy_static! {
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9]{1,12}$")
        .expect("username pattern is a valid regex");
}

/// True iff `username` is 1 to 12 ASCII letters or digits
pub fn is_valid_username(username: &str) -> bool {
    USERNAME_REGEX.is_match(username)
}

/// True iff `password` is at least 9 characters long and contains an
/// uppercase letter, a lowercase letter, a digit and a special character
pub fn is_valid_password(password: &str) -> bool {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return false;
    }

    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARACTERS.contains(c));

    has_uppercase && has_lowercase && has_digit && has_special
}

/// Removes `'`, `"`, `;`, `--`, `/` and `*` and trims surrounding whitespace.
///
/// Applied to every username before it is compared, looked up or stored.
pub fn sanitize(input: &str) -> String {
    input
        .replace('\'', "")
        .replace('"', "")
        .replace(';', "")
        .replace("--", "")
        .replace('/', "")
        .replace('*', "")
        .trim()
        .to_string()
}

/// Sanitizes and validates a username, returning the stored form
pub fn validate_username(raw: &str) -> Result<String, ValidationError> {
    let username = sanitize(raw);

    if username.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }

    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong(
            "username".to_string(),
            MAX_USERNAME_LENGTH,
        ));
    }

    if !is_valid_username(&username) {
        return Err(ValidationError::InvalidUsername);
    }

    Ok(username)
}

/// Checks password strength for registration
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        ));
    }

    if !is_valid_password(password) {
        return Err(ValidationError::WeakPassword);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        assert!(is_valid_username("Ab123456789"));
        assert!(is_valid_username("a"));
        assert!(is_valid_username("ABCDEFabcdef"));
    }

    #[test]
    fn test_invalid_usernames() {
        assert!(!is_valid_username("ab_12"));
        assert!(!is_valid_username("Ab12345678901"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("john doe"));
        assert!(!is_valid_username("jöhn"));
    }

    #[test]
    fn test_password_length_boundary() {
        // 8 characters, every class present
        assert!(!is_valid_password("Abcdef1!"));
        assert!(is_valid_password("Abcdefg1!"));
        assert!(is_valid_password("Abcdefgh1!"));
    }

    #[test]
    fn test_password_character_classes() {
        assert!(!is_valid_password("abcdefgh1!"));
        assert!(!is_valid_password("ABCDEFGH1!"));
        assert!(!is_valid_password("Abcdefghi!"));
        assert!(!is_valid_password("Abcdefghi1"));
    }

    #[test]
    fn test_every_special_character_counts() {
        for special in SPECIAL_CHARACTERS.chars() {
            let password = format!("Abcdefgh1{}", special);
            assert!(is_valid_password(&password), "rejected {:?}", special);
        }
    }

    #[test]
    fn test_sanitize_strips_dangerous_characters() {
        assert_eq!(sanitize("  alice  "), "alice");
        assert_eq!(sanitize("al'ice\"; --"), "alice");
        assert_eq!(sanitize("a/b*c"), "abc");
        assert_eq!(sanitize("a-b"), "a-b");
    }

    #[test]
    fn test_validate_username_sanitizes_first() {
        assert_eq!(validate_username(" bob'  ").unwrap(), "bob");
        assert!(matches!(
            validate_username("ab_12"),
            Err(ValidationError::InvalidUsername)
        ));
        assert!(matches!(
            validate_username("';--"),
            Err(ValidationError::EmptyField(_))
        ));
        assert!(matches!(
            validate_username("Ab12345678901"),
            Err(ValidationError::TooLong(_, MAX_USERNAME_LENGTH))
        ));
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Abcdefgh1!").is_ok());
        assert!(matches!(
            validate_password("abcdefgh1!"),
            Err(ValidationError::WeakPassword)
        ));
        let long = format!("Aa1!{}", "x".repeat(MAX_PASSWORD_LENGTH));
        // Strong by the character rules, refused only for length
        assert!(is_valid_password(&long));
        assert!(matches!(
            validate_password(&long),
            Err(ValidationError::TooLong(_, MAX_PASSWORD_LENGTH))
        ));
    }
}
