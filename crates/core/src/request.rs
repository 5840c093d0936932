//! OBR (observation request) parsing.

use crate::sanitize::sanitize_text_field;
use crate::segment::Segment;
use crate::timestamp::parse_hl7_datetime;
use chrono::NaiveDateTime;
use openpace_types::TransmissionKind;

/// Request context that governs the OBX rows following it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservationRequest {
    pub order_id: Option<String>,
    pub kind: TransmissionKind,
    pub requested_at: Option<NaiveDateTime>,
}

impl ObservationRequest {
    /// Parses OBR-2 (placer order), OBR-4 (service) and OBR-7 (observation datetime).
    ///
    /// A service identifier containing `REMOTE` marks a home-monitor transmission; anything
    /// else is treated as an in-clinic interrogation.
    pub fn parse(obr: &Segment, max_text_length: usize) -> Self {
        let service = obr.component(4, 1).to_ascii_uppercase();
        let kind = if service.contains("REMOTE") {
            TransmissionKind::Remote
        } else {
            TransmissionKind::InClinic
        };

        let order_id = match sanitize_text_field(obr.component(2, 1), max_text_length) {
            Ok(id) if !id.is_empty() => Some(id),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("OBR-2 order id dropped: {}", e);
                None
            }
        };

        Self {
            order_id,
            kind,
            requested_at: parse_hl7_datetime(obr.field(7)),
        }
    }
}
