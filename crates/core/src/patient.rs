//! PID (patient identification) parsing.
//!
//! Besides the usual `ID^^^FACILITY` form, Boston Scientific places device identity in PID-3 as
//! a `model:XXX/serial:YYY` repetition alongside the real patient identifier:
//!
//! ```text
//! PID|1||model:D433/serial:677770^^BSX^U~7767669^^The Alfred Hospital^U
//! ```

use crate::constants::{ANONYMIZED_ID_PREFIX, DEVICE_PATIENT_ID_PREFIX};
use crate::model::Patient;
use crate::sanitize::{sanitize_patient_id, sanitize_patient_name, sanitize_text_field};
use crate::segment::Segment;
use crate::timestamp::parse_hl7_date;
use crate::{IngestResult, IngestWarning, WarningKind};
use openpace_types::Gender;

/// Result of parsing a PID segment.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientSegment {
    pub patient: Patient,
    pub device_model: Option<String>,
    pub device_serial: Option<String>,
    pub warnings: Vec<IngestWarning>,
}

#[derive(Default)]
struct DeviceOverlay<'a> {
    model: Option<&'a str>,
    serial: Option<&'a str>,
}

/// Reads `model:X/serial:Y` pairs. Returns `None` if `value` carries neither key.
fn parse_device_overlay(value: &str) -> Option<DeviceOverlay<'_>> {
    let mut overlay = DeviceOverlay::default();
    let mut matched = false;

    for pair in value.split('/') {
        let Some((key, val)) = pair.split_once(':') else {
            continue;
        };
        let val = val.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "model" => {
                matched = true;
                overlay.model.get_or_insert(val);
            }
            "serial" => {
                matched = true;
                overlay.serial.get_or_insert(val);
            }
            _ => {}
        }
    }

    matched.then_some(overlay)
}

impl PatientSegment {
    /// Parses a PID segment.
    ///
    /// The patient identifier is the first PID-3 repetition that is not a device overlay. If
    /// there is none but a serial was found, `DEV-{serial}` is used. Name and date of birth are
    /// only read when `anonymize` is false.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::PatientId` if the identifier fails sanitization.
    pub fn parse(pid: &Segment, anonymize: bool, max_text_length: usize) -> IngestResult<Self> {
        let mut warnings = Vec::new();
        let mut device_model = None;
        let mut device_serial = None;
        let mut id_candidate: Option<String> = None;

        for repetition in pid.repetitions(3) {
            let first = pid
                .components(repetition)
                .first()
                .copied()
                .unwrap_or("")
                .trim();

            if let Some(overlay) = parse_device_overlay(first) {
                if device_model.is_none() {
                    device_model =
                        overlay_text("device model", overlay.model, max_text_length, &mut warnings);
                }
                if device_serial.is_none() {
                    device_serial = overlay_text(
                        "device serial",
                        overlay.serial,
                        max_text_length,
                        &mut warnings,
                    );
                }
                continue;
            }

            if id_candidate.is_none() && !first.is_empty() {
                id_candidate = Some(first.to_string());
            }
        }

        let raw_id = match (id_candidate, &device_serial) {
            (Some(id), _) => id,
            (None, Some(serial)) => format!("{DEVICE_PATIENT_ID_PREFIX}{serial}"),
            (None, None) => String::new(),
        };
        let patient_id = sanitize_patient_id(&raw_id)?;

        let patient_name = if anonymize {
            None
        } else {
            parse_name(pid, &mut warnings)
        };

        let date_of_birth = if anonymize {
            None
        } else {
            let raw = pid.field(7).trim();
            let dob = parse_hl7_date(raw);
            if dob.is_none() && !raw.is_empty() {
                warnings.push(IngestWarning::message(WarningKind::InvalidDateOfBirth(
                    raw.chars().take(32).collect(),
                )));
            }
            dob
        };

        let raw_gender = pid.component(8, 1).trim();
        let gender = Gender::from_code(raw_gender);
        if gender.is_none() && !raw_gender.is_empty() {
            warnings.push(IngestWarning::message(WarningKind::InvalidGender(
                raw_gender.chars().take(32).collect(),
            )));
        }

        let anonymized_id = anonymize.then(|| anonymized_display_id(&patient_id));

        Ok(Self {
            patient: Patient {
                patient_id,
                patient_name,
                date_of_birth,
                gender,
                anonymized: anonymize,
                anonymized_id,
            },
            device_model,
            device_serial,
            warnings,
        })
    }
}

fn overlay_text(
    field: &'static str,
    value: Option<&str>,
    max_text_length: usize,
    warnings: &mut Vec<IngestWarning>,
) -> Option<String> {
    match sanitize_text_field(value?, max_text_length) {
        Ok(v) if !v.is_empty() => Some(v),
        Ok(_) => None,
        Err(source) => {
            warnings.push(IngestWarning::message(WarningKind::RejectedText { field, source }));
            None
        }
    }
}

/// PID-5 `LAST^FIRST^MIDDLE` rendered as `FIRST LAST`.
fn parse_name(pid: &Segment, warnings: &mut Vec<IngestWarning>) -> Option<String> {
    let last = pid.component(5, 1).trim();
    let first = pid.component(5, 2).trim();
    let display = format!("{first} {last}");

    match sanitize_patient_name(display.trim()) {
        Ok(name) if !name.is_empty() => Some(name),
        Ok(_) => None,
        Err(e) => {
            warnings.push(IngestWarning::message(WarningKind::RejectedPatientName(e)));
            None
        }
    }
}

fn anonymized_display_id(patient_id: &str) -> String {
    let chars: Vec<char> = patient_id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(3)..].iter().collect();
    format!("{ANONYMIZED_ID_PREFIX}{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Delimiters;
    use crate::{IngestError, PatientIdError};

    fn parse(line: &str, anonymize: bool) -> IngestResult<PatientSegment> {
        PatientSegment::parse(&Segment::parse(line, Delimiters::default()), anonymize, 500)
    }

    #[test]
    fn standard_identifier_and_demographics() {
        let pid = parse("PID|1||PT12345^^^HOSP^MR||DOE^JOHN^Q||19550315|m", false).unwrap();
        assert_eq!(pid.patient.patient_id, "PT12345");
        assert_eq!(pid.patient.patient_name.as_deref(), Some("JOHN DOE"));
        assert_eq!(pid.patient.date_of_birth.unwrap().to_string(), "1955-03-15");
        assert_eq!(pid.patient.gender, Some(Gender::Male));
        assert!(!pid.patient.anonymized);
        assert_eq!(pid.patient.anonymized_id, None);
        assert!(pid.warnings.is_empty());
    }

    #[test]
    fn boston_scientific_overlay_yields_device_identity() {
        let pid = parse(
            "PID|1||model:D433/serial:677770^^BSX^U~7767669^^The Alfred Hospital^U",
            false,
        )
        .unwrap();
        assert_eq!(pid.device_model.as_deref(), Some("D433"));
        assert_eq!(pid.device_serial.as_deref(), Some("677770"));
        assert_eq!(pid.patient.patient_id, "7767669");
    }

    #[test]
    fn overlay_without_patient_repetition_synthesizes_id_from_serial() {
        let pid = parse("PID|1||model:D433/serial:677770^^BSX^U", false).unwrap();
        assert_eq!(pid.patient.patient_id, "DEV-677770");
    }

    #[test]
    fn anonymize_suppresses_name_and_birth_date() {
        let pid = parse("PID|1||PT12345||DOE^JOHN||19550315|F", true).unwrap();
        assert_eq!(pid.patient.patient_name, None);
        assert_eq!(pid.patient.date_of_birth, None);
        assert_eq!(pid.patient.gender, Some(Gender::Female));
        assert!(pid.patient.anonymized);
        assert_eq!(pid.patient.anonymized_id.as_deref(), Some("Patient_345"));
    }

    #[test]
    fn anonymized_id_handles_short_identifiers() {
        assert_eq!(anonymized_display_id("7"), "Patient_7");
    }

    #[test]
    fn injection_in_patient_id_is_fatal() {
        let err = parse("PID|1||PT'; DROP TABLE patients;--", false).expect_err("should fail");
        assert!(matches!(
            err,
            IngestError::PatientId(PatientIdError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn missing_identifier_is_fatal() {
        let err = parse("PID|1||||DOE^JOHN", false).expect_err("should fail");
        assert!(matches!(err, IngestError::PatientId(PatientIdError::Empty)));
    }

    #[test]
    fn rejected_name_and_gender_are_recoverable() {
        let pid = parse("PID|1||PT1||<b>^JOHN||notadate|X", false).unwrap();
        assert_eq!(pid.patient.patient_name, None);
        assert_eq!(pid.patient.gender, None);
        assert_eq!(pid.patient.date_of_birth, None);
        assert_eq!(pid.warnings.len(), 3);
        assert!(matches!(
            pid.warnings[0].kind,
            WarningKind::RejectedPatientName(_)
        ));
        assert!(matches!(pid.warnings[1].kind, WarningKind::InvalidDateOfBirth(_)));
        assert!(matches!(pid.warnings[2].kind, WarningKind::InvalidGender(_)));
    }

    #[test]
    fn name_with_single_component_is_kept() {
        let pid = parse("PID|1||PT1||José García", false).unwrap();
        assert_eq!(pid.patient.patient_name.as_deref(), Some("José García"));
    }
}
