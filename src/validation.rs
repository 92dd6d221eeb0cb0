//! Syntax checks shared by the stores.
//!
//! Every check runs before any backend call so a rejected request never leaves
//! partial state behind.

use crate::constants::{
    ERR_INVALID_PASSWORD, MAX_METADATA_KEY_LEN, METADATA_INDEX_KEY, MIN_SECRET_RUN,
};
use crate::error::{AppError, Result};

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'
}

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@#$%^&+=".contains(c)
}

/// Validate a username or metadata name component.
///
/// Letters, digits, `.`, `_` and `-` only. The empty string passes.
pub fn validate_identifier(s: &str) -> Result<()> {
    if !s.chars().all(is_identifier_char) {
        return Err(AppError::InvalidFormat(format!(
            "{} can only contain letters, numbers, underscores, periods, and dashes.",
            s
        )));
    }
    Ok(())
}

/// Validate a password.
///
/// Passes when the string contains at least `MIN_SECRET_RUN` consecutive
/// characters from `[A-Za-z0-9@#$%^&+=]` anywhere in it; whatever surrounds
/// that run is not checked.
pub fn validate_secret(s: &str) -> Result<()> {
    let mut run = 0;
    for c in s.chars() {
        if is_secret_char(c) {
            run += 1;
            if run >= MIN_SECRET_RUN {
                return Ok(());
            }
        } else {
            run = 0;
        }
    }
    Err(AppError::InvalidFormat(ERR_INVALID_PASSWORD.to_string()))
}

/// Validate a metadata storage key or field name.
pub fn validate_metadata_key(s: &str) -> Result<()> {
    validate_identifier(s)?;

    if s.len() > MAX_METADATA_KEY_LEN {
        return Err(AppError::TooLong(format!(
            "Metadata key {} can only be 100 characters.",
            s
        )));
    }

    if s == METADATA_INDEX_KEY {
        return Err(AppError::ReservedName(s.to_string()));
    }

    Ok(())
}
