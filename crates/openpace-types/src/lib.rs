//! Shared vocabulary for device transmissions.
//!
//! These types are used by the ingestion pipeline and by anything that consumes its
//! records. They carry no parsing logic of their own beyond validated construction.

use serde::{Deserialize, Serialize};

/// Errors that can occur when creating a [`VariableName`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VariableNameError {
    /// The input was empty or contained only whitespace
    #[error("variable name cannot be empty")]
    Empty,
    /// The input contained something other than lowercase ASCII, digits or `_`
    #[error("variable name contains invalid characters: {0}")]
    InvalidCharacters(String),
}

/// A universal, vendor-independent observation variable such as `battery_voltage`.
///
/// Names are lowercase snake case. Construction trims surrounding whitespace and rejects
/// anything outside `[a-z0-9_]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableName(String);

impl VariableName {
    /// Creates a new `VariableName` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `VariableNameError::Empty` for blank input and
    /// `VariableNameError::InvalidCharacters` when the trimmed input is not snake case.
    pub fn new(input: impl AsRef<str>) -> Result<Self, VariableNameError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(VariableNameError::Empty);
        }

        let ok = trimmed
            .bytes()
            .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_'));
        if !ok {
            return Err(VariableNameError::InvalidCharacters(trimmed.to_owned()));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for variables that carry a datetime for a group of observations
    /// (for example `msmt_battery_datetime` or `session_datetime`).
    pub fn is_datetime(&self) -> bool {
        self.0.ends_with("_datetime")
    }
}

impl std::fmt::Display for VariableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for VariableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for VariableName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for VariableName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        VariableName::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Administrative gender as carried in PID-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "O")]
    Other,
    #[serde(rename = "U")]
    Unknown,
}

impl Gender {
    /// Parses a single HL7 gender code, case-insensitively.
    ///
    /// Returns `None` for anything outside `M`, `F`, `O`, `U`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "M" => Some(Self::Male),
            "F" => Some(Self::Female),
            "O" => Some(Self::Other),
            "U" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Where a transmission was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionKind {
    /// Sent from a home monitor.
    Remote,
    /// Interrogated by a programmer during a clinic visit.
    InClinic,
    /// No OBR segment was present.
    Unknown,
}

/// Device manufacturer detected from the sending application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Manufacturer {
    Medtronic,
    BostonScientific,
    Abbott,
    Biotronik,
    Generic,
}

impl Manufacturer {
    /// Human-readable manufacturer name.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Medtronic => "Medtronic",
            Self::BostonScientific => "Boston Scientific",
            Self::Abbott => "Abbott",
            Self::Biotronik => "Biotronik",
            Self::Generic => "Generic",
        }
    }
}

impl std::fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which source supplied an observation's clinical time.
///
/// Variants are ordered by precedence: a lower tier always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampTier {
    /// OBX-14 on the observation itself.
    Observation,
    /// A vendor datetime row sharing the observation's sub-id.
    SubIdGroup,
    /// OBR-7 of the governing request.
    Request,
    /// Message datetime (MSH-8, else MSH-7).
    Message,
}
