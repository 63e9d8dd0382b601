//! Input validation for credentials, content and topic names.
//!
//! The web layer validates form input with these functions before calling
//! into the core, and the core re-applies the content checks so no code
//! path can persist malformed data.

use crate::constants::{
    MAX_CONTENT_LEN, MAX_TOPIC_NAME_LEN, PASSWORD_MIN_LEN, PASSWORD_SYMBOLS, USERNAME_MAX_LEN,
    USERNAME_MIN_LEN,
};
use crate::error::{RealtextError, Result};

/// Validates a username at registration time.
///
/// # Errors
/// Returns a validation error if the username is shorter than 4 or longer
/// than 20 characters, or contains whitespace.
pub fn check_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if len < USERNAME_MIN_LEN || len > USERNAME_MAX_LEN {
        return Err(RealtextError::validation(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(RealtextError::validation(
            "Username cannot contain whitespace",
        ));
    }
    Ok(())
}

/// Validates password complexity at registration time.
///
/// Requires at least 8 characters, at least one letter and one digit, and
/// only ASCII letters, digits and the `@$!%*#?&` symbol set.
pub fn check_password(password: &str) -> Result<()> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(RealtextError::validation(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        )));
    }
    if !password.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(RealtextError::validation(
            "Password must contain at least one letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(RealtextError::validation(
            "Password must contain at least one digit",
        ));
    }
    if let Some(bad) = password
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !PASSWORD_SYMBOLS.contains(*c))
    {
        return Err(RealtextError::validation(format!(
            "Password contains a disallowed character: {:?}",
            bad
        )));
    }
    Ok(())
}

/// Validates message content before it is persisted.
///
/// # Errors
/// Returns `ContentInvalid` if the content is empty (after trimming) or
/// exceeds 500 characters.
pub fn check_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(RealtextError::content_invalid("Content cannot be empty"));
    }
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(RealtextError::content_invalid(format!(
            "Content exceeds maximum length of {} characters",
            MAX_CONTENT_LEN
        )));
    }
    Ok(())
}

/// Validates a topic name before creation.
pub fn check_topic_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RealtextError::content_invalid("Topic name cannot be empty"));
    }
    if name.chars().count() > MAX_TOPIC_NAME_LEN {
        return Err(RealtextError::content_invalid(format!(
            "Topic name exceeds maximum length of {} characters",
            MAX_TOPIC_NAME_LEN
        )));
    }
    Ok(())
}
