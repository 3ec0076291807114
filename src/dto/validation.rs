//! Validation helpers for DTOs.

use validator::ValidationError;

/// Length of a public session code.
pub const SESSION_CODE_LENGTH: usize = 6;

/// Validates that a session code is exactly 6 ASCII digits.
pub fn validate_session_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != SESSION_CODE_LENGTH {
        let mut err = ValidationError::new("session_code_length");
        err.message = Some(
            format!(
                "Session code must be exactly {SESSION_CODE_LENGTH} digits (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("session_code_format");
        err.message = Some("Session code must contain only ASCII digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_six_digit_codes() {
        assert!(validate_session_code("483920").is_ok());
        assert!(validate_session_code("100000").is_ok());
        assert!(validate_session_code("999999").is_ok());
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(validate_session_code("48392").is_err());
        assert!(validate_session_code("4839201").is_err());
        assert!(validate_session_code("").is_err());
    }

    #[test]
    fn rejects_non_digits() {
        assert!(validate_session_code("48392a").is_err());
        assert!(validate_session_code("4839 0").is_err());
        assert!(validate_session_code("ABCDEF").is_err());
    }
}
