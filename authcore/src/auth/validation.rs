//! Field validation for registration and password changes.
//!
//! Validation accumulates every field failure before returning, so a caller
//! sees all problems in one response instead of fixing them one at a time.

use regex::Regex;
use std::sync::LazyLock;

use super::errors::FieldError;
use super::models::RegisterRequest;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern is valid")
});

const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;

/// Normalize an email for storage and lookup: trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check email shape without touching the store.
pub fn valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}

/// Password strength rule: length plus character-class mix.
fn password_problem(password: &str) -> Option<&'static str> {
    if password.len() < MIN_PASSWORD_LEN {
        return Some("Password must be at least 8 characters");
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());

    if !has_digit || !has_uppercase || !has_lowercase {
        return Some("Password must contain at least one number, one uppercase and one lowercase letter");
    }

    None
}

/// Validate a registration request, accumulating all field errors.
pub fn validate_registration(request: &RegisterRequest) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    let email = normalize_email(&request.email);
    if email.is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    } else if !valid_email(&email) {
        errors.push(FieldError::new("email", "Enter a valid email address"));
    }

    if let Some(problem) = password_problem(&request.password) {
        errors.push(FieldError::new("password", problem));
    }

    if request.password != request.password_confirm {
        errors.push(FieldError::new("password_confirm", "Passwords do not match"));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Validate a new password and its confirmation, accumulating all errors.
pub fn validate_new_password(password: &str, confirm: &str) -> Result<(), Vec<FieldError>> {
    let mut errors = Vec::new();

    if let Some(problem) = password_problem(password) {
        errors.push(FieldError::new("new_password", problem));
    }

    if password != confirm {
        errors.push(FieldError::new(
            "new_password_confirm",
            "Passwords do not match",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request(email: &str, password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            password_confirm: confirm.to_string(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    #[test]
    fn test_valid_registration_passes() {
        let req = request("user@example.com", "Secret123!", "Secret123!");
        assert!(validate_registration(&req).is_ok());
    }

    #[test]
    fn test_normalize_email_lowercases_and_trims() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
    }

    #[test]
    fn test_invalid_email_shapes() {
        for email in ["", "plainaddress", "user@", "@example.com", "a@b"] {
            assert!(!valid_email(email), "{email:?} should be rejected");
        }
    }

    #[test]
    fn test_errors_accumulate_across_fields() {
        // Bad email AND weak password AND mismatched confirm: all three
        // must come back in one pass.
        let req = request("not-an-email", "weak", "different");
        let errors = validate_registration(&req).unwrap_err();

        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "password", "password_confirm"]);
    }

    #[test]
    fn test_password_rules() {
        assert!(password_problem("Short1").is_some());
        assert!(password_problem("alllowercase1").is_some());
        assert!(password_problem("ALLUPPERCASE1").is_some());
        assert!(password_problem("NoDigitsHere").is_some());
        assert!(password_problem("Secret123").is_none());
    }

    #[test]
    fn test_new_password_mismatch() {
        let errors = validate_new_password("NewPass1!", "NewPass2!").unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "new_password_confirm");
    }

    proptest! {
        #[test]
        fn prop_normalized_email_is_idempotent(raw in "[ -~]{0,40}") {
            let once = normalize_email(&raw);
            prop_assert_eq!(normalize_email(&once), once.clone());
        }

        #[test]
        fn prop_matching_strong_passwords_validate(
            body in "[a-z]{7,12}", digit in 0u8..10
        ) {
            let password = format!("A{body}{digit}");
            prop_assert!(validate_new_password(&password, &password).is_ok());
        }
    }
}
