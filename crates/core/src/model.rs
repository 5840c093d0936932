//! Normalized records produced by ingestion.
//!
//! These are the shapes handed to a [`RecordStore`](crate::store::RecordStore). All string
//! fields have already been sanitized.

use crate::header::MessageHeader;
use crate::translators::EgmFormat;
use crate::IngestWarning;
use base64::{engine::general_purpose, Engine as _};
use chrono::{NaiveDate, NaiveDateTime};
use openpace_types::{Gender, Manufacturer, TimestampTier, TransmissionKind, VariableName};
use serde::{Serialize, Serializer};

/// A patient, keyed by sanitized identifier.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Patient {
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub anonymized: bool,
    /// Display identifier used instead of the name when anonymized.
    pub anonymized_id: Option<String>,
}

/// Identity of the implanted device that produced a transmission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub manufacturer: Manufacturer,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub firmware: Option<String>,
}

/// The single value carried by an observation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationValue {
    Numeric(f64),
    Text(String),
    Blob(#[serde(serialize_with = "serialize_base64")] Vec<u8>),
}

fn serialize_base64<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
}

impl ObservationValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Self::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(v) => Some(v),
            _ => None,
        }
    }
}

/// One mapped OBX row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Observation {
    pub sequence_number: u32,
    pub variable_name: VariableName,
    pub loinc_code: Option<String>,
    pub vendor_code: String,
    pub sub_id: Option<String>,
    pub value: ObservationValue,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub abnormal_flag: Option<String>,
    pub observation_status: String,
    pub observation_time: NaiveDateTime,
    pub time_source: TimestampTier,
    pub egm_format: Option<EgmFormat>,
}

/// One ORU^R01 message after parsing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Transmission {
    pub header: MessageHeader,
    pub device: DeviceIdentity,
    pub kind: TransmissionKind,
    pub order_id: Option<String>,
    pub source_filename: Option<String>,
    /// Normalized message text, kept only when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_message: Option<String>,
    pub observations: Vec<Observation>,
}

impl Transmission {
    pub fn observation(&self, variable: &str) -> Option<&Observation> {
        self.observations
            .iter()
            .find(|o| o.variable_name.as_str() == variable)
    }
}

/// Everything produced from one message, before persistence.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParsedMessage {
    pub patient: Patient,
    pub transmission: Transmission,
    pub warnings: Vec<IngestWarning>,
    /// Number of OBX segments in the message, kept or not.
    pub observation_segments: usize,
}

impl ParsedMessage {
    pub fn imported(&self) -> usize {
        self.transmission.observations.len()
    }

    pub fn skipped(&self) -> usize {
        self.observation_segments.saturating_sub(self.imported())
    }
}
