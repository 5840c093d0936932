//! Vendor code translation.
//!
//! Each manufacturer encodes the same clinical concepts differently in OBX-3. A
//! [`VendorTranslator`] maps those codes (and, failing that, the display text) onto universal
//! [`VariableName`]s and classifies embedded EGM blobs.
//!
//! The set of translators is closed. One is selected per transmission from the manufacturer
//! detected in MSH-3 and reused for every OBX in that message.

pub mod boston_scientific;
pub mod generic;
pub mod medtronic;

use openpace_types::{Manufacturer, VariableName};
use serde::Serialize;

/// Container format of an embedded EGM blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EgmFormat {
    Pdf,
    Xml,
    Binary,
}

/// What could be learned about an EGM blob without waveform processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgmMeta {
    pub format: EgmFormat,
    pub vendor: Manufacturer,
    pub byte_len: usize,
    pub sample_rate_hz: Option<u32>,
    pub channels: Vec<String>,
    /// Number of whole 16-bit samples after the header; zero when not decoded.
    pub sample_count: usize,
}

impl EgmMeta {
    /// Metadata for a blob whose contents were not decoded.
    pub(crate) fn opaque(format: EgmFormat, vendor: Manufacturer, byte_len: usize) -> Self {
        Self {
            format,
            vendor,
            byte_len,
            sample_rate_hz: None,
            channels: Vec::new(),
            sample_count: 0,
        }
    }
}

pub(crate) fn is_pdf(blob: &[u8]) -> bool {
    blob.starts_with(b"%PDF")
}

pub(crate) fn is_xml_declaration(blob: &[u8]) -> bool {
    blob.starts_with(b"<?xml")
}

/// Stateless translation strategy for one manufacturer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorTranslator {
    Generic,
    Medtronic,
    BostonScientific,
}

impl VendorTranslator {
    /// Selects the translator for a detected manufacturer. Manufacturers without a dedicated
    /// code table use the LOINC-based generic translator.
    pub fn for_manufacturer(manufacturer: Manufacturer) -> Self {
        match manufacturer {
            Manufacturer::Medtronic => Self::Medtronic,
            Manufacturer::BostonScientific => Self::BostonScientific,
            Manufacturer::Abbott | Manufacturer::Biotronik | Manufacturer::Generic => {
                Self::Generic
            }
        }
    }

    pub fn vendor(&self) -> Manufacturer {
        match self {
            Self::Generic => Manufacturer::Generic,
            Self::Medtronic => Manufacturer::Medtronic,
            Self::BostonScientific => Manufacturer::BostonScientific,
        }
    }

    /// Maps an OBX-3 identifier and display text to a universal variable.
    ///
    /// The vendor's exact code table is consulted first, then keyword inference over the
    /// display text. `None` means the observation has no universal meaning.
    pub fn map_observation_id(&self, code: &str, text: &str) -> Option<VariableName> {
        let code = code.trim();
        let mapped = match self {
            Self::Generic => generic::map_observation_id(code, text),
            Self::Medtronic => medtronic::map_observation_id(code, text),
            Self::BostonScientific => boston_scientific::map_observation_id(code, text),
        }?;

        VariableName::new(mapped).ok()
    }

    /// Classifies a decoded ED blob. `None` means the blob is too small to be an EGM.
    pub fn decode_egm(&self, blob: &[u8]) -> Option<EgmMeta> {
        match self {
            Self::Generic => generic::decode_egm(blob),
            Self::Medtronic => medtronic::decode_egm(blob),
            Self::BostonScientific => boston_scientific::decode_egm(blob),
        }
    }
}

/// Detects the manufacturer from the MSH-3 sending application.
pub fn detect_manufacturer(sending_application: &str) -> Manufacturer {
    fn contains_any(haystack: &str, needles: &[&str]) -> bool {
        needles.iter().any(|n| haystack.contains(n))
    }

    let app = sending_application.to_ascii_uppercase();
    if contains_any(&app, &["MEDTRONIC", "CARELINK"]) {
        Manufacturer::Medtronic
    } else if contains_any(&app, &["BOSTON", "BSC", "LATITUDE"]) {
        Manufacturer::BostonScientific
    } else if contains_any(&app, &["ABBOTT", "MERLIN", "SJM"]) {
        Manufacturer::Abbott
    } else if app.contains("BIOTRONIK") {
        Manufacturer::Biotronik
    } else {
        Manufacturer::Generic
    }
}
