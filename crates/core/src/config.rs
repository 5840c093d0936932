//! Ingestion runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the pipeline. The parser
//! never reads process-wide environment variables itself, so parallel imports and test harnesses
//! see the same behaviour.

use crate::constants::{MAX_MESSAGE_SIZE, MAX_OBSERVATION_TEXT_LENGTH, MIN_MESSAGE_SIZE};
use crate::ConfigError;

/// Ingestion configuration resolved at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestConfig {
    anonymize: bool,
    min_message_size: usize,
    max_message_size: usize,
    max_text_length: usize,
    retain_raw_message: bool,
}

impl IngestConfig {
    /// Create a new `IngestConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidInput` if the size window is empty or the text bound is zero.
    pub fn new(
        anonymize: bool,
        min_message_size: usize,
        max_message_size: usize,
        max_text_length: usize,
        retain_raw_message: bool,
    ) -> Result<Self, ConfigError> {
        if min_message_size >= max_message_size {
            return Err(ConfigError::InvalidInput(format!(
                "min_message_size ({}) must be smaller than max_message_size ({})",
                min_message_size, max_message_size
            )));
        }

        if max_text_length == 0 {
            return Err(ConfigError::InvalidInput(
                "max_text_length must be greater than zero".into(),
            ));
        }

        Ok(Self {
            anonymize,
            min_message_size,
            max_message_size,
            max_text_length,
            retain_raw_message,
        })
    }

    pub fn anonymize(&self) -> bool {
        self.anonymize
    }

    pub fn min_message_size(&self) -> usize {
        self.min_message_size
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn max_text_length(&self) -> usize {
        self.max_text_length
    }

    pub fn retain_raw_message(&self) -> bool {
        self.retain_raw_message
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            anonymize: false,
            min_message_size: MIN_MESSAGE_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            max_text_length: MAX_OBSERVATION_TEXT_LENGTH,
            retain_raw_message: false,
        }
    }
}

/// Parse an anonymization flag from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns `false`.
pub fn anonymize_from_env_value(value: Option<String>) -> Result<bool, ConfigError> {
    let value = value
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty());

    match value.as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidInput(format!(
            "unrecognised anonymize flag: {other}"
        ))),
    }
}
