//! Limits and fixed values used across the ingestion pipeline.

/// Smallest accepted message, in encoded bytes.
pub const MIN_MESSAGE_SIZE: usize = 100;

/// Largest accepted message, in encoded bytes (50 MiB).
pub const MAX_MESSAGE_SIZE: usize = 50 * 1024 * 1024;

/// Maximum number of characters in a sanitized patient identifier.
pub const MAX_PATIENT_ID_LENGTH: usize = 100;

/// Maximum number of characters in a sanitized patient name.
pub const MAX_PATIENT_NAME_LENGTH: usize = 200;

/// Default bound for free-text observation fields (value text, unit, range, flag).
pub const MAX_OBSERVATION_TEXT_LENGTH: usize = 500;

/// HL7 version assumed when MSH-12 is empty.
pub const DEFAULT_HL7_VERSION: &str = "2.5";

/// Result status assumed when OBX-11 is empty.
pub const DEFAULT_OBSERVATION_STATUS: &str = "F";

/// Coding-system identifier in OBX-3.3 marking a LOINC code.
pub const LOINC_CODING_SYSTEM: &str = "LN";

/// Prefix used to synthesize a patient identifier from a device serial.
pub const DEVICE_PATIENT_ID_PREFIX: &str = "DEV-";

/// Prefix for the display identifier given to anonymized patients.
pub const ANONYMIZED_ID_PREFIX: &str = "Patient_";

/// Binary EGM blobs shorter than this carry no usable waveform.
pub const EGM_MIN_BINARY_LEN: usize = 100;

/// Length of the fixed header preceding binary EGM samples.
pub const EGM_HEADER_LEN: usize = 64;

/// Sample rate assumed for binary EGM strips, in Hz.
pub const EGM_SAMPLE_RATE_HZ: u32 = 1000;
