//! # OpenPace Core
//!
//! Ingestion of HL7 v2 ORU^R01 messages from cardiac implantable electronic devices.
//!
//! This crate contains the pure parsing pipeline and the storage contract:
//! - Size and structure validation, then sanitization of every persisted string
//! - Segment splitting honouring the delimiters declared in MSH
//! - MSH, PID, OBR and OBX parsing into normalized records
//! - Vendor translation of observation codes to universal variable names
//! - Observation timestamp resolution across four tiers
//!
//! **No I/O concerns**: reading files, concurrency and output formatting belong in `cli`.
//! Persistence goes through the [`RecordStore`] trait; [`InMemoryStore`] is provided.

pub mod config;
pub mod constants;
pub mod error;
pub mod header;
pub mod ingest;
pub mod model;
pub mod observation;
pub mod patient;
pub mod request;
pub mod sanitize;
pub mod segment;
pub mod store;
pub mod timestamp;
pub mod translators;
pub mod validation;

pub use config::{anonymize_from_env_value, IngestConfig};
pub use error::{
    ConfigError, IngestError, IngestResult, IngestWarning, PatientIdError, StoreError,
    ValidationError, WarningKind,
};
pub use header::MessageHeader;
pub use ingest::{ingest, parse_message, persist, IngestOutcome};
pub use model::{DeviceIdentity, Observation, ObservationValue, ParsedMessage, Patient, Transmission};
pub use store::{InMemoryStore, PatientHandle, RecordStore, StoredTransmission, TransmissionHandle};
pub use translators::{EgmFormat, EgmMeta, VendorTranslator};
