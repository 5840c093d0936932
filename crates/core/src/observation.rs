//! OBX (observation) parsing.
//!
//! Rows are read in two steps. [`ObxRow::from_segment`] pulls positional fields without
//! interpreting them, so the orchestrator can index vendor datetime rows before any
//! measurement is resolved. [`build_observation`] then interprets one row against its
//! translator and time context.

use crate::constants::{DEFAULT_OBSERVATION_STATUS, LOINC_CODING_SYSTEM};
use crate::model::{Observation, ObservationValue};
use crate::sanitize::sanitize_text_field;
use crate::segment::Segment;
use crate::timestamp::{parse_hl7_datetime, resolve, SubIdDatetimes};
use crate::translators::{EgmFormat, VendorTranslator};
use crate::{IngestWarning, WarningKind};
use base64::{engine::general_purpose, Engine as _};
use chrono::NaiveDateTime;
use openpace_types::{TimestampTier, VariableName};

/// Value types that carry a datetime.
const DATETIME_VALUE_TYPES: &[&str] = &["DTM", "TS", "DT"];

/// Tokens that name an ED encoding or data type rather than carrying the payload.
const ED_KEYWORDS: &[&str] = &["BASE64", "A", "HEX", "NONE", "AP", "IM", "TEXT", "PDF", "XML"];

/// Identifiers whose digits are significant as written, so `ST` values are never coerced.
const DEVICE_IDENTITY_VARIABLES: &[&str] = &["device_model", "device_serial", "device_firmware"];

/// Positional OBX fields, uninterpreted.
#[derive(Clone, Debug)]
pub struct ObxRow<'a> {
    segment: &'a Segment,
    pub set_id: &'a str,
    pub value_type: String,
    pub code: &'a str,
    pub text: &'a str,
    pub coding_system: &'a str,
    pub sub_id: &'a str,
    pub value: &'a str,
    pub unit: &'a str,
    pub reference_range: &'a str,
    pub abnormal_flag: &'a str,
    pub status: &'a str,
    pub observed_at: &'a str,
}

impl<'a> ObxRow<'a> {
    pub fn from_segment(segment: &'a Segment) -> Self {
        Self {
            segment,
            set_id: segment.field(1).trim(),
            value_type: segment.component(2, 1).trim().to_ascii_uppercase(),
            code: segment.component(3, 1).trim(),
            text: segment.component(3, 2).trim(),
            coding_system: segment.component(3, 3).trim(),
            sub_id: segment.field(4).trim(),
            value: segment.field(5),
            unit: segment.component(6, 1),
            reference_range: segment.field(7),
            abnormal_flag: segment.field(8),
            status: segment.field(11),
            observed_at: segment.field(14),
        }
    }

    /// OBX-1 as a number, if valid.
    pub fn sequence(&self) -> Option<u32> {
        self.set_id.parse().ok()
    }

    /// True if this row reports a datetime for its sub-id group rather than a measurement.
    pub fn is_datetime_row(&self, variable: Option<&VariableName>) -> bool {
        DATETIME_VALUE_TYPES.contains(&self.value_type.as_str())
            || variable.is_some_and(VariableName::is_datetime)
    }

    /// The datetime carried in OBX-5, if this is a datetime row with a parseable value.
    pub fn group_datetime(&self, variable: Option<&VariableName>) -> Option<NaiveDateTime> {
        if !self.is_datetime_row(variable) {
            return None;
        }
        let first = self.segment.components(self.value).first().copied()?;
        parse_hl7_datetime(first)
    }
}

/// Builds the sub-id datetime index from every row that reports a group datetime.
pub fn index_sub_id_datetimes<'a>(
    rows: impl IntoIterator<Item = (&'a ObxRow<'a>, Option<&'a VariableName>)>,
) -> SubIdDatetimes {
    SubIdDatetimes::build(rows.into_iter().filter_map(|(row, variable)| {
        if row.sub_id.is_empty() {
            return None;
        }
        row.group_datetime(variable).map(|dt| (row.sub_id, dt))
    }))
}

/// Time sources and translator shared by every OBX under one request.
#[derive(Clone, Copy, Debug)]
pub struct ObservationContext<'a> {
    pub translator: VendorTranslator,
    pub request_datetime: Option<NaiveDateTime>,
    pub message_datetime: NaiveDateTime,
    pub sub_id_datetimes: &'a SubIdDatetimes,
    pub max_text_length: usize,
}

/// Interprets one OBX row.
///
/// `variable` is the row's mapped universal name. A row with no name, an invalid set ID, an
/// unusable value or an oversized text field is not materialized; the returned warning says
/// why.
pub fn build_observation(
    row: &ObxRow<'_>,
    variable: Option<VariableName>,
    ctx: &ObservationContext<'_>,
) -> Result<Observation, IngestWarning> {
    let Some(sequence_number) = row.sequence() else {
        return Err(IngestWarning::observation(
            None,
            WarningKind::InvalidSequence(row.set_id.chars().take(32).collect()),
        ));
    };
    let warn = |kind| IngestWarning::observation(Some(sequence_number), kind);

    let Some(variable_name) = variable else {
        return Err(warn(WarningKind::UnmappedCode {
            code: row.code.chars().take(64).collect(),
            text: row.text.chars().take(64).collect(),
        }));
    };

    let (value, egm_format) = parse_value(row, &variable_name, ctx).map_err(warn)?;

    let text = |field: &'static str, raw: &str| -> Result<Option<String>, WarningKind> {
        match sanitize_text_field(raw, ctx.max_text_length) {
            Ok(v) if v.is_empty() => Ok(None),
            Ok(v) => Ok(Some(v)),
            Err(source) => Err(WarningKind::RejectedText { field, source }),
        }
    };

    let vendor_code = text("observation code", row.code).map_err(warn)?.unwrap_or_default();
    let sub_id = text("sub-id", row.sub_id).map_err(warn)?;
    let unit = text("unit", row.unit).map_err(warn)?;
    let reference_range = text("reference range", row.reference_range).map_err(warn)?;
    let abnormal_flag = text("abnormal flag", row.abnormal_flag).map_err(warn)?;
    let observation_status = text("observation status", row.status)
        .map_err(warn)?
        .unwrap_or_else(|| DEFAULT_OBSERVATION_STATUS.to_string());

    let loinc_code = (row.coding_system.eq_ignore_ascii_case(LOINC_CODING_SYSTEM)
        && !vendor_code.is_empty())
    .then(|| vendor_code.clone());

    let (observation_time, time_source) = resolve(
        parse_hl7_datetime(row.observed_at),
        row.sub_id,
        ctx.request_datetime,
        Some(ctx.message_datetime),
        ctx.sub_id_datetimes,
    )
    .unwrap_or((ctx.message_datetime, TimestampTier::Message));

    tracing::debug!(
        sequence = sequence_number,
        variable = %variable_name,
        tier = ?time_source,
        "observation mapped"
    );

    Ok(Observation {
        sequence_number,
        variable_name,
        loinc_code,
        vendor_code,
        sub_id,
        value,
        unit,
        reference_range,
        abnormal_flag,
        observation_status,
        observation_time,
        time_source,
        egm_format,
    })
}

/// Fills exactly one value slot according to OBX-2.
fn parse_value(
    row: &ObxRow<'_>,
    variable: &VariableName,
    ctx: &ObservationContext<'_>,
) -> Result<(ObservationValue, Option<EgmFormat>), WarningKind> {
    let truncated = || row.value.chars().take(64).collect::<String>();

    match row.value_type.as_str() {
        "NM" => parse_finite(row.value.trim())
            .map(|v| (ObservationValue::Numeric(v), None))
            .ok_or_else(|| WarningKind::InvalidNumeric(truncated())),
        "ST" if DEVICE_IDENTITY_VARIABLES.contains(&variable.as_str()) => {
            text_value(row.value, ctx.max_text_length).map(|t| (t, None))
        }
        "ST" => {
            if let Some(v) = parse_finite(&row.value.trim().replace(',', ".")) {
                return Ok((ObservationValue::Numeric(v), None));
            }
            text_value(row.value, ctx.max_text_length).map(|t| (t, None))
        }
        "ED" => {
            let blob = decode_encapsulated(row).ok_or(WarningKind::UndecodableBlob)?;
            let egm = ctx.translator.decode_egm(&blob);
            match &egm {
                Some(meta) => tracing::debug!(
                    format = ?meta.format,
                    vendor = %meta.vendor,
                    bytes = meta.byte_len,
                    samples = meta.sample_count,
                    "embedded EGM classified"
                ),
                None => tracing::debug!(bytes = blob.len(), "embedded data too small for EGM"),
            }
            Ok((ObservationValue::Blob(blob), egm.map(|m| m.format)))
        }
        _ => text_value(row.value, ctx.max_text_length).map(|t| (t, None)),
    }
}

fn parse_finite(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn text_value(raw: &str, max_text_length: usize) -> Result<ObservationValue, WarningKind> {
    sanitize_text_field(raw, max_text_length)
        .map(ObservationValue::Text)
        .map_err(|source| WarningKind::RejectedText {
            field: "value",
            source,
        })
}

/// Extracts and decodes the base64 payload of an ED value such as `^Base64^SGVsbG8=^Base64`.
///
/// The third component is tried first; if it is blank, names an encoding, or does not decode,
/// the last non-empty component is tried.
fn decode_encapsulated(row: &ObxRow<'_>) -> Option<Vec<u8>> {
    let parts = row.segment.components(row.value);

    let decode = |candidate: &str| -> Option<Vec<u8>> {
        let candidate = candidate.trim();
        if candidate.is_empty()
            || ED_KEYWORDS
                .iter()
                .any(|k| candidate.eq_ignore_ascii_case(k))
        {
            return None;
        }
        general_purpose::STANDARD.decode(candidate).ok()
    };

    parts.get(2).copied().and_then(decode).or_else(|| {
        parts
            .iter()
            .rev()
            .copied()
            .find(|p| !p.trim().is_empty())
            .and_then(decode)
    })
}
