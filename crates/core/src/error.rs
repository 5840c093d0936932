use serde::Serialize;
use uuid::Uuid;

/// Structural or field-level rejection of message content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("HL7 message cannot be empty")]
    Empty,
    #[error("HL7 message too small: {size} bytes (minimum {min} bytes)")]
    TooSmall { size: usize, min: usize },
    #[error("HL7 message too large: {size} bytes (maximum {max} bytes)")]
    TooLarge { size: usize, max: usize },
    #[error("HL7 message must start with 'MSH' segment")]
    MissingMsh,
    #[error("HL7 message is missing required PID segment")]
    MissingPid,
    #[error("HL7 message has no resolvable message datetime (MSH-7)")]
    MissingTimestamp,
    #[error("{field} exceeds maximum length of {max} characters")]
    FieldTooLong { field: &'static str, max: usize },
    #[error("{field} contains invalid characters")]
    InvalidCharacters { field: &'static str },
}

/// Rejection of a patient identifier. Always fatal for the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatientIdError {
    #[error("patient ID cannot be empty")]
    Empty,
    #[error("patient ID exceeds maximum length of {max} characters ({len} given)")]
    TooLong { len: usize, max: usize },
    #[error(
        "patient ID contains invalid characters (only alphanumeric, '-', '_', '.' allowed): {0:?}"
    )]
    InvalidCharacters(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record store lock was poisoned")]
    LockPoisoned,
    #[error("unknown patient handle: {0}")]
    UnknownPatient(Uuid),
    #[error("unknown transmission handle: {0}")]
    UnknownTransmission(Uuid),
    #[error("observation sequence {sequence} already stored for transmission {transmission}")]
    DuplicateSequence { transmission: Uuid, sequence: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidInput(String),
}

/// Fatal ingestion failure. Nothing is persisted when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("invalid patient ID: {0}")]
    PatientId(#[from] PatientIdError),
    #[error("expected ORU^R01 message, got: {0}")]
    TypeMismatch(String),
    #[error("failed to persist transmission: {0}")]
    Store(#[from] StoreError),
}

pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// A recoverable problem found while parsing. The affected field or observation is
/// dropped and parsing continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WarningKind {
    #[error("no OBR segment present; transmission kind is unknown")]
    MissingRequest,
    #[error("invalid OBX set ID {0:?}")]
    InvalidSequence(String),
    #[error("duplicate OBX set ID {0}")]
    DuplicateSequence(u32),
    #[error("invalid numeric value {0:?}")]
    InvalidNumeric(String),
    #[error("embedded data could not be base64-decoded")]
    UndecodableBlob,
    #[error("no universal variable for code {code:?} ({text:?})")]
    UnmappedCode { code: String, text: String },
    #[error("{field} dropped: {source}")]
    RejectedText {
        field: &'static str,
        #[source]
        source: ValidationError,
    },
    #[error("patient name dropped: {0}")]
    RejectedPatientName(ValidationError),
    #[error("invalid gender code {0:?}")]
    InvalidGender(String),
    #[error("invalid date of birth {0:?}")]
    InvalidDateOfBirth(String),
}

/// A warning tied to the OBX set ID it came from, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestWarning {
    pub sequence: Option<u32>,
    pub kind: WarningKind,
}

impl IngestWarning {
    pub fn message(kind: WarningKind) -> Self {
        Self {
            sequence: None,
            kind,
        }
    }

    pub fn observation(sequence: Option<u32>, kind: WarningKind) -> Self {
        Self { sequence, kind }
    }
}

impl std::fmt::Display for IngestWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sequence {
            Some(seq) => write!(f, "OBX {}: {}", seq, self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl Serialize for IngestWarning {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("IngestWarning", 2)?;
        state.serialize_field("sequence", &self.sequence)?;
        state.serialize_field("message", &self.kind.to_string())?;
        state.end()
    }
}
