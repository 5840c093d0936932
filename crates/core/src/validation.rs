//! Structural and size gate for raw HL7 text.
//!
//! Nothing in this module parses segments. It only decides whether a buffer is worth handing
//! to the splitter, so hostile input (size bombs, non-HL7 payloads) is rejected up front.

use crate::config::IngestConfig;
use crate::constants::{MAX_MESSAGE_SIZE, MIN_MESSAGE_SIZE};
use crate::ValidationError;

/// Rewrites `\r\n` and `\n` line endings to the HL7 segment terminator `\r`.
pub fn normalize_line_endings(raw: &str) -> String {
    raw.replace("\r\n", "\r").replace('\n', "\r")
}

/// Validates a raw message against the default size window.
///
/// # Errors
///
/// See [`validate_with_limits`].
pub fn validate(raw_text: &str) -> Result<(), ValidationError> {
    validate_with_limits(raw_text, MIN_MESSAGE_SIZE, MAX_MESSAGE_SIZE)
}

/// Validates a raw message against an explicit size window.
///
/// Checks, in order:
/// - the buffer is not empty
/// - its UTF-8 byte length lies within `min_size..=max_size`
/// - after line-ending normalization it starts with `MSH`
/// - it contains a `PID` segment marker
///
/// # Errors
///
/// Returns the first `ValidationError` encountered.
pub fn validate_with_limits(
    raw_text: &str,
    min_size: usize,
    max_size: usize,
) -> Result<(), ValidationError> {
    check_size(raw_text, min_size, max_size)?;
    check_structure(&normalize_line_endings(raw_text))
}

fn check_size(raw_text: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    if raw_text.is_empty() {
        return Err(ValidationError::Empty);
    }

    let size = raw_text.len();
    if size < min {
        return Err(ValidationError::TooSmall { size, min });
    }
    if size > max {
        return Err(ValidationError::TooLarge { size, max });
    }

    Ok(())
}

fn check_structure(normalized: &str) -> Result<(), ValidationError> {
    if !normalized.starts_with("MSH") {
        return Err(ValidationError::MissingMsh);
    }
    if !normalized.contains("PID") {
        return Err(ValidationError::MissingPid);
    }

    Ok(())
}

/// A message that has passed validation, with line endings normalized to `\r`.
///
/// The text cannot be modified once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage(String);

impl RawMessage {
    /// Validates `raw_text` with the limits in `config` and normalizes it.
    ///
    /// # Errors
    ///
    /// Returns a `ValidationError` if the text fails any check in [`validate_with_limits`].
    pub fn new(raw_text: &str, config: &IngestConfig) -> Result<Self, ValidationError> {
        check_size(
            raw_text,
            config.min_message_size(),
            config.max_message_size(),
        )?;
        let normalized = normalize_line_endings(raw_text);
        check_structure(&normalized)?;
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(body: &str) -> String {
        let mut s = body.to_string();
        while s.len() < MIN_MESSAGE_SIZE {
            s.push_str("\rNTE|1||padding");
        }
        s
    }

    #[test]
    fn test_validate_accepts_minimal_message() {
        let msg = padded("MSH|^~\\&|APP|FAC|||20240101000000||ORU^R01|1|P|2.5\rPID|1||123");
        validate(&msg).expect("valid message");
    }

    #[test]
    fn test_validate_rejects_empty() {
        let err = validate("").expect_err("empty should fail");
        assert_eq!(err, ValidationError::Empty);
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_validate_rejects_undersized_message_regardless_of_structure() {
        let err = validate("MSH|^~\\&|APP\rPID|1||123").expect_err("too small");
        assert!(matches!(err, ValidationError::TooSmall { min: 100, .. }));
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn test_validate_rejects_oversized_message() {
        let err = validate_with_limits(&padded("MSH|^~\\&\rPID|1"), 10, 50).expect_err("too large");
        assert!(matches!(err, ValidationError::TooLarge { max: 50, .. }));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_validate_rejects_message_over_fifty_mebibytes() {
        let mut msg = String::from("MSH|^~\\&|APP\rPID|1||123\r");
        msg.push_str(&"X".repeat(MAX_MESSAGE_SIZE));
        let err = validate(&msg).expect_err("too large");
        assert!(matches!(err, ValidationError::TooLarge { .. }));
    }

    #[test]
    fn test_validate_rejects_missing_msh() {
        let err = validate(&padded("PID|1||123\rOBX|1|NM|x")).expect_err("no MSH");
        assert_eq!(err, ValidationError::MissingMsh);
        assert!(err.to_string().contains("must start with 'MSH'"));
    }

    #[test]
    fn test_validate_rejects_missing_pid() {
        let err = validate(&padded("MSH|^~\\&|APP|FAC\rOBX|1|NM|x")).expect_err("no PID");
        assert_eq!(err, ValidationError::MissingPid);
        assert!(err.to_string().contains("missing required PID"));
    }

    #[test]
    fn test_normalize_line_endings_handles_mixed_terminators() {
        assert_eq!(normalize_line_endings("A\r\nB\nC\rD"), "A\rB\rC\rD");
    }

    #[test]
    fn test_raw_message_is_normalized() {
        let text = padded("MSH|^~\\&|APP\r\nPID|1||123\n");
        let raw = RawMessage::new(&text, &IngestConfig::default()).expect("valid");
        assert!(!raw.as_str().contains('\n'));
        assert!(raw.as_str().starts_with("MSH|"));
    }
}
