//! MSH (message header) parsing.

use crate::constants::DEFAULT_HL7_VERSION;
use crate::sanitize::sanitize_text_field;
use crate::segment::Segment;
use crate::timestamp::parse_hl7_datetime;
use crate::translators::detect_manufacturer;
use crate::{IngestError, IngestResult, ValidationError};
use chrono::NaiveDateTime;
use openpace_types::Manufacturer;
use serde::Serialize;

/// Header metadata for one message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageHeader {
    pub sending_application: String,
    pub sending_facility: String,
    pub receiving_application: String,
    pub receiving_facility: String,
    pub message_datetime: NaiveDateTime,
    pub message_type: String,
    pub control_id: String,
    pub version: String,
    pub manufacturer: Manufacturer,
}

impl MessageHeader {
    /// Parses an MSH segment.
    ///
    /// The message type is read from MSH-9, or MSH-10 when MSH-9 is blank, and must contain
    /// both an `ORU` and an `R01` token once every nested component is flattened. The message
    /// datetime comes from MSH-8 when that holds a valid datetime, otherwise MSH-7.
    ///
    /// # Errors
    ///
    /// - `IngestError::TypeMismatch` if the message is not ORU^R01.
    /// - `IngestError::Validation` if no message datetime can be resolved or a header text
    ///   field is too long.
    pub fn parse(msh: &Segment, max_text_length: usize) -> IngestResult<Self> {
        let message_type = message_type(msh)?;

        let message_datetime = parse_hl7_datetime(msh.field(8))
            .or_else(|| parse_hl7_datetime(msh.field(7)))
            .ok_or(ValidationError::MissingTimestamp)?;

        let text = |n: usize| sanitize_text_field(msh.component(n, 1), max_text_length);
        let sending_application = text(3)?;

        let version = text(12)?;
        let version = if version.is_empty() {
            DEFAULT_HL7_VERSION.to_string()
        } else {
            version
        };

        Ok(Self {
            manufacturer: detect_manufacturer(&sending_application),
            sending_application,
            sending_facility: text(4)?,
            receiving_application: text(5)?,
            receiving_facility: text(6)?,
            message_datetime,
            message_type,
            control_id: text(10)?,
            version,
        })
    }
}

/// Flattens the message-type field and checks for `ORU` and `R01` tokens.
fn message_type(msh: &Segment) -> IngestResult<String> {
    let mut parts = msh.flattened(9);
    if parts.is_empty() {
        parts = msh.flattened(10);
    }

    let tokens: Vec<String> = parts
        .iter()
        .flat_map(|p| p.split('_'))
        .map(|t| t.trim().to_ascii_uppercase())
        .filter(|t| !t.is_empty())
        .collect();

    let joined = parts.join("^");
    let is_oru_r01 = tokens.iter().any(|t| t == "ORU") && tokens.iter().any(|t| t == "R01");
    if !is_oru_r01 {
        return Err(IngestError::TypeMismatch(joined));
    }

    Ok(joined)
}
