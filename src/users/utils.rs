use regex::Regex;
use crate::types::ValidationError;

lazy_static! {
    static ref EMAIL_RE: Regex = {
        let pattern = r"(?i)\A[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\z";
        Regex::new(pattern).unwrap()
    };
    static ref USERNAME_RE: Regex = Regex::new(r"\A[a-zA-Z0-9_]+\z").unwrap();
}

pub const MIN_PASSWORD_LEN: usize = 2;

pub fn validate_email_re(email: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(email) {
        Err(ValidationError::from(
            "email",
            format!("Invalid email: {}", email),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_username_re(username: &str) -> Result<(), ValidationError> {
    if !USERNAME_RE.is_match(username) {
        Err(ValidationError::from(
            "username",
            "Username should be one word, letters, numbers and underscores only.",
        ))
    } else {
        Ok(())
    }
}

pub fn validate_password(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    let mut errors = ValidationError::default();
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add_error("password", "Password to short");
    }
    if confirmation.is_empty() {
        errors.add_error("password_confirmation", "This field is required.");
    }
    if confirmation != password {
        errors.add_error("password", "Passwords must match");
    }
    errors.into_result()
}
