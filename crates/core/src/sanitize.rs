//! Cleansing and allow-list validation for free-text fields.
//!
//! Every string taken from a segment and stored on a record passes through one of these
//! functions first.

use crate::constants::{MAX_PATIENT_ID_LENGTH, MAX_PATIENT_NAME_LENGTH};
use crate::{PatientIdError, ValidationError};

/// Removes C0 controls, DEL and C1 controls, then trims surrounding whitespace.
pub fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitizes a patient identifier.
///
/// Control characters are stripped, then the remainder must be 1 to 100 characters drawn from
/// ASCII letters, digits, `-`, `_` and `.`.
///
/// # Errors
///
/// Returns a `PatientIdError` if the cleaned identifier is empty, too long, or contains any
/// other character.
pub fn sanitize_patient_id(input: &str) -> Result<String, PatientIdError> {
    let cleaned = strip_control_chars(input);

    if cleaned.is_empty() {
        return Err(PatientIdError::Empty);
    }

    let len = cleaned.chars().count();
    if len > MAX_PATIENT_ID_LENGTH {
        return Err(PatientIdError::TooLong {
            len,
            max: MAX_PATIENT_ID_LENGTH,
        });
    }

    let ok = cleaned
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_' | b'.'));
    if !ok {
        return Err(PatientIdError::InvalidCharacters(cleaned));
    }

    Ok(cleaned)
}

/// Sanitizes a patient display name.
///
/// An empty result is allowed. Otherwise the name must be at most 200 characters of letters
/// (any script), digits, whitespace, `'`, `-`, `.` or `,`.
///
/// # Errors
///
/// Returns `ValidationError::FieldTooLong` or `ValidationError::InvalidCharacters`.
pub fn sanitize_patient_name(input: &str) -> Result<String, ValidationError> {
    const FIELD: &str = "patient name";

    let cleaned = strip_control_chars(input);
    if cleaned.is_empty() {
        return Ok(cleaned);
    }

    if cleaned.chars().count() > MAX_PATIENT_NAME_LENGTH {
        return Err(ValidationError::FieldTooLong {
            field: FIELD,
            max: MAX_PATIENT_NAME_LENGTH,
        });
    }

    let ok = cleaned
        .chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace() || matches!(c, '\'' | '-' | '.' | ','));
    if !ok {
        return Err(ValidationError::InvalidCharacters { field: FIELD });
    }

    Ok(cleaned)
}

/// Cleanses a free-text field and bounds its length in characters.
///
/// # Errors
///
/// Returns `ValidationError::FieldTooLong` if the cleaned text exceeds `max_len`.
pub fn sanitize_text_field(input: &str, max_len: usize) -> Result<String, ValidationError> {
    let cleaned = strip_control_chars(input);
    if cleaned.chars().count() > max_len {
        return Err(ValidationError::FieldTooLong {
            field: "text field",
            max: max_len,
        });
    }
    Ok(cleaned)
}
