//! Message ingestion: validation through to assembled records.
//!
//! [`parse_message`] is pure. It reads one buffered message and returns the patient,
//! transmission and observations it describes, together with warnings for everything it had
//! to drop. [`persist`] writes a parsed message to a [`RecordStore`]; [`ingest`] does both.
//!
//! Fatal problems (validation, wrong message type, bad patient identifier) abort before
//! anything is written. Per-observation problems only skip the affected row.

use crate::config::IngestConfig;
use crate::header::MessageHeader;
use crate::model::{DeviceIdentity, Observation, ObservationValue, ParsedMessage, Transmission};
use crate::observation::{build_observation, index_sub_id_datetimes, ObservationContext, ObxRow};
use crate::patient::PatientSegment;
use crate::request::ObservationRequest;
use crate::segment::SegmentedMessage;
use crate::store::{RecordStore, TransmissionHandle};
use crate::translators::VendorTranslator;
use crate::validation::RawMessage;
use crate::{IngestResult, IngestWarning, StoreError, ValidationError, WarningKind};
use openpace_types::{TransmissionKind, VariableName};
use std::collections::HashSet;

/// Parses one ORU^R01 message.
///
/// # Arguments
///
/// * `text` - The complete message, with any line-ending convention.
/// * `filename` - Source file name, recorded on the transmission.
/// * `config` - Size limits, anonymization and raw-text retention.
///
/// # Errors
///
/// - `IngestError::Validation` if the message fails the size/structure gate or has no MSH
///   datetime.
/// - `IngestError::TypeMismatch` if MSH-9 is not ORU^R01.
/// - `IngestError::PatientId` if no acceptable patient identifier can be derived.
pub fn parse_message(
    text: &str,
    filename: Option<&str>,
    config: &IngestConfig,
) -> IngestResult<ParsedMessage> {
    let max_text = config.max_text_length();

    let raw = RawMessage::new(text, config)?;
    let message = SegmentedMessage::split(&raw);

    let msh = message.first("MSH").ok_or(ValidationError::MissingMsh)?;
    let header = MessageHeader::parse(msh, max_text)?;

    let pid = message.first("PID").ok_or(ValidationError::MissingPid)?;
    let PatientSegment {
        patient,
        device_model,
        device_serial,
        mut warnings,
    } = PatientSegment::parse(pid, config.anonymize(), max_text)?;

    // Each OBX is governed by the nearest preceding OBR, or the first OBR if none precedes it.
    let mut requests: Vec<ObservationRequest> = Vec::new();
    let mut rows: Vec<(ObxRow<'_>, Option<usize>)> = Vec::new();
    for segment in message.segments() {
        match segment.name() {
            "OBR" => requests.push(ObservationRequest::parse(segment, max_text)),
            "OBX" => rows.push((
                ObxRow::from_segment(segment),
                requests.len().checked_sub(1),
            )),
            _ => {}
        }
    }

    let (kind, order_id) = match requests.first() {
        Some(request) => (request.kind, request.order_id.clone()),
        None => {
            tracing::warn!("no OBR segment; transmission kind unknown");
            warnings.push(IngestWarning::message(WarningKind::MissingRequest));
            (TransmissionKind::Unknown, None)
        }
    };

    let translator = VendorTranslator::for_manufacturer(header.manufacturer);
    tracing::debug!(
        manufacturer = %header.manufacturer,
        translator = ?translator,
        "translator selected"
    );

    let variables: Vec<Option<VariableName>> = rows
        .iter()
        .map(|(row, _)| translator.map_observation_id(row.code, row.text))
        .collect();

    let sub_id_datetimes = index_sub_id_datetimes(
        rows.iter()
            .map(|(row, _)| row)
            .zip(variables.iter().map(Option::as_ref)),
    );

    let mut observations: Vec<Observation> = Vec::new();
    let mut seen_sequences = HashSet::new();
    for ((row, request), variable) in rows.iter().zip(variables) {
        let request_datetime = requests
            .get(request.unwrap_or(0))
            .and_then(|r| r.requested_at);
        let ctx = ObservationContext {
            translator,
            request_datetime,
            message_datetime: header.message_datetime,
            sub_id_datetimes: &sub_id_datetimes,
            max_text_length: max_text,
        };

        let warning = match build_observation(row, variable, &ctx) {
            Ok(obs) if seen_sequences.insert(obs.sequence_number) => {
                observations.push(obs);
                continue;
            }
            Ok(obs) => IngestWarning::observation(
                Some(obs.sequence_number),
                WarningKind::DuplicateSequence(obs.sequence_number),
            ),
            Err(warning) => warning,
        };
        tracing::warn!("skipped observation: {}", warning);
        warnings.push(warning);
    }

    let device = DeviceIdentity {
        manufacturer: header.manufacturer,
        model: device_model.or_else(|| device_text(&observations, "device_model")),
        serial: device_serial.or_else(|| device_text(&observations, "device_serial")),
        firmware: device_text(&observations, "device_firmware"),
    };

    let observation_segments = rows.len();

    let transmission = Transmission {
        header,
        device,
        kind,
        order_id,
        source_filename: filename.map(str::to_string),
        raw_message: config.retain_raw_message().then(|| raw.into_string()),
        observations,
    };

    let parsed = ParsedMessage {
        patient,
        transmission,
        warnings,
        observation_segments,
    };

    tracing::info!(
        control_id = %parsed.transmission.header.control_id,
        manufacturer = %parsed.transmission.device.manufacturer,
        imported = parsed.imported(),
        skipped = parsed.skipped(),
        "parsed transmission"
    );

    Ok(parsed)
}

/// First observation of `variable` rendered as text, for device identity fallback.
fn device_text(observations: &[Observation], variable: &str) -> Option<String> {
    let obs = observations
        .iter()
        .find(|o| o.variable_name.as_str() == variable)?;
    match &obs.value {
        ObservationValue::Text(t) if !t.is_empty() => Some(t.clone()),
        ObservationValue::Numeric(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Writes a parsed message: upsert the patient, insert the transmission, then every
/// observation.
pub fn persist<S>(store: &S, parsed: &ParsedMessage) -> Result<TransmissionHandle, StoreError>
where
    S: RecordStore + ?Sized,
{
    let patient = store.upsert_patient(&parsed.patient)?;
    let handle = store.insert_transmission(patient, &parsed.transmission)?;
    for observation in &parsed.transmission.observations {
        store.insert_observation(handle, observation)?;
    }
    Ok(handle)
}

/// Result of a successful [`ingest`].
#[derive(Debug)]
pub struct IngestOutcome {
    pub handle: TransmissionHandle,
    pub parsed: ParsedMessage,
}

/// Parses `text` and persists the result into `store`.
///
/// # Errors
///
/// Any error from [`parse_message`], or `IngestError::Store` if persistence fails.
pub fn ingest<S>(
    store: &S,
    text: &str,
    filename: Option<&str>,
    config: &IngestConfig,
) -> IngestResult<IngestOutcome>
where
    S: RecordStore + ?Sized,
{
    let parsed = parse_message(text, filename, config)?;
    let handle = persist(store, &parsed)?;
    Ok(IngestOutcome { handle, parsed })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::translators::EgmFormat;
    use crate::{IngestError, PatientIdError};
    use openpace_types::{Gender, Manufacturer, TimestampTier};

    const MEDTRONIC: &str = "MSH|^~\\&|CARELINK|MEDTRONIC|OPENPACE|CLINIC|20240101000000||ORU^R01|MSG00001|P|2.5\r\n\
PID|1||PT12345^^^HOSP^MR||DOE^JOHN^A||19550315|M\r\n\
OBR|1|ORD001||REMOTE^Remote Transmission|||20240110000000\r\n\
OBX|1|NM|MDC_BATTERY_VOLTAGE^Battery Voltage^MDC||2.65|V|2.2-2.8|N|||F|||20240115103000\r\n\
OBX|2|NM|MDC_IMP_RV^RV Lead Impedance^MDC||540|Ohm|200-1500|N|||F\r\n\
OBX|3|NM|ZZZ_UNKNOWN^Mystery Reading^MDC||12|||||F\r\n\
OBX|4|NM|73990-7^Battery Voltage^LN||not-a-number|V\r\n\
OBX|5|ED|MDC_EGM_STRIP^EGM Strip^MDC||^Base64^SGVsbG8=^Base64|||||F\r\n";

    const BOSTON: &str = "MSH|^~\\&|LATITUDE|BSX|OPENPACE|CLINIC|20240101000000||ORU^R01|BSX0001|P|2.6\r\
PID|1||model:D433/serial:677770^^BSX^U~7767669^^The Alfred Hospital^U\r\
OBR|1|||INTERROGATION|||20240110000000\r\
OBX|1|NM|721472^MDC_IDC_MSMT_BATTERY_REMAINING_LONGEVITY^MDC|2|84|mo\r\
OBX|2|DTM|721216^MDC_IDC_MSMT_BATTERY_DTM^MDC|2|20240114090000\r\
OBX|3|NM|722432^MDC_IDC_MSMT_LEADCHNL_RA_IMPEDANCE^MDC|3|510|Ohm\r\
OBX|4|ST|720899^MDC_IDC_DEV_SERIAL^MDC||999999";

    fn config() -> IngestConfig {
        IngestConfig::default()
    }

    pub(crate) fn sample_transmission() -> Transmission {
        parse_message(MEDTRONIC, None, &IngestConfig::default())
            .expect("sample parses")
            .transmission
    }

    #[test]
    fn parses_medtronic_transmission() {
        let parsed = parse_message(MEDTRONIC, Some("carelink.hl7"), &config()).unwrap();

        assert_eq!(parsed.patient.patient_id, "PT12345");
        assert_eq!(parsed.patient.patient_name.as_deref(), Some("JOHN DOE"));
        assert_eq!(parsed.patient.gender, Some(Gender::Male));

        let tx = &parsed.transmission;
        assert_eq!(tx.header.control_id, "MSG00001");
        assert_eq!(tx.device.manufacturer, Manufacturer::Medtronic);
        assert_eq!(tx.kind, TransmissionKind::Remote);
        assert_eq!(tx.order_id.as_deref(), Some("ORD001"));
        assert_eq!(tx.source_filename.as_deref(), Some("carelink.hl7"));
        assert_eq!(tx.raw_message, None);

        let seqs: Vec<u32> = tx.observations.iter().map(|o| o.sequence_number).collect();
        assert_eq!(seqs, [1, 2, 5]);
        assert_eq!(parsed.imported(), 3);
        assert_eq!(parsed.skipped(), 2);
        assert_eq!(parsed.warnings.len(), 2);
    }

    #[test]
    fn numeric_battery_voltage_example() {
        let parsed = parse_message(MEDTRONIC, None, &config()).unwrap();
        let obs = parsed.transmission.observation("battery_voltage").unwrap();
        assert_eq!(obs.value.as_numeric(), Some(2.65));
        assert_eq!(obs.value.as_text(), None);
        assert_eq!(obs.unit.as_deref(), Some("V"));
    }

    #[test]
    fn observation_times_follow_tier_precedence() {
        let parsed = parse_message(MEDTRONIC, None, &config()).unwrap();
        let tx = &parsed.transmission;

        let battery = tx.observation("battery_voltage").unwrap();
        assert_eq!(battery.observation_time.to_string(), "2024-01-15 10:30:00");
        assert_eq!(battery.time_source, TimestampTier::Observation);

        let impedance = tx.observation("lead_impedance_ventricular").unwrap();
        assert_eq!(impedance.observation_time.to_string(), "2024-01-10 00:00:00");
        assert_eq!(impedance.time_source, TimestampTier::Request);
    }

    #[test]
    fn unmapped_and_invalid_rows_are_reported_not_raised() {
        let parsed = parse_message(MEDTRONIC, None, &config()).unwrap();
        assert!(parsed
            .warnings
            .iter()
            .any(|w| w.sequence == Some(3) && matches!(w.kind, WarningKind::UnmappedCode { .. })));
        assert!(parsed
            .warnings
            .iter()
            .any(|w| w.sequence == Some(4) && matches!(w.kind, WarningKind::InvalidNumeric(_))));
    }

    #[test]
    fn embedded_egm_is_kept_as_blob() {
        let parsed = parse_message(MEDTRONIC, None, &config()).unwrap();
        let egm = parsed.transmission.observation("egm_strip").unwrap();
        assert_eq!(egm.value.as_blob(), Some(&b"Hello"[..]));
        // Five bytes is below the binary EGM threshold.
        assert_eq!(egm.egm_format, None);
    }

    #[test]
    fn parses_boston_scientific_transmission() {
        let parsed = parse_message(BOSTON, None, &config()).unwrap();
        assert_eq!(parsed.patient.patient_id, "7767669");

        let tx = &parsed.transmission;
        assert_eq!(tx.device.manufacturer, Manufacturer::BostonScientific);
        assert_eq!(tx.device.model.as_deref(), Some("D433"));
        assert_eq!(tx.device.serial.as_deref(), Some("677770"));
        assert_eq!(tx.kind, TransmissionKind::InClinic);
        assert_eq!(tx.header.version, "2.6");

        let longevity = tx.observation("battery_longevity").unwrap();
        assert_eq!(longevity.observation_time.to_string(), "2024-01-14 09:00:00");
        assert_eq!(longevity.time_source, TimestampTier::SubIdGroup);

        let impedance = tx.observation("lead_impedance_atrial").unwrap();
        assert_eq!(impedance.time_source, TimestampTier::Request);
    }

    #[test]
    fn device_identity_falls_back_to_observations() {
        let text = BOSTON.replace(
            "model:D433/serial:677770^^BSX^U~7767669^^The Alfred Hospital^U",
            "7767669^^The Alfred Hospital^U",
        );
        let parsed = parse_message(&text, None, &config()).unwrap();
        assert_eq!(parsed.transmission.device.model, None);
        assert_eq!(parsed.transmission.device.serial.as_deref(), Some("999999"));
    }

    #[test]
    fn device_identity_from_observations_keeps_leading_zeros() {
        let text = "MSH|^~\\&|EPIC|HOSP|||20240101000000||ORU^R01|G0|P|2.5\r\
PID|1||PT776\r\
OBR|1|A||REMOTE|||20240105000000\r\
OBX|1|ST|device_serial^Device Serial^L||0012345\r\
OBX|2|ST|device_model^Device Model^L||12345678901234567890";
        let parsed = parse_message(text, None, &config()).unwrap();
        let device = &parsed.transmission.device;
        assert_eq!(device.serial.as_deref(), Some("0012345"));
        assert_eq!(device.model.as_deref(), Some("12345678901234567890"));
    }

    #[test]
    fn missing_obr_is_recoverable() {
        let text = "MSH|^~\\&|EPIC|HOSP|||20240101000000||ORU^R01|G1|P|2.5\r\
PID|1||PT777\r\
OBX|1|NM|73990-7^Battery Voltage^LN||2.70|V\r\
OBX|2|NM|8867-4^Heart Rate^LN||64|bpm";
        let parsed = parse_message(text, None, &config()).unwrap();
        let tx = &parsed.transmission;
        assert_eq!(tx.kind, TransmissionKind::Unknown);
        assert_eq!(tx.observations.len(), 2);
        assert!(tx
            .observations
            .iter()
            .all(|o| o.time_source == TimestampTier::Message));
        assert!(matches!(
            parsed.warnings[0].kind,
            WarningKind::MissingRequest
        ));
    }

    #[test]
    fn observations_use_nearest_preceding_request() {
        let text = "MSH|^~\\&|EPIC|HOSP|||20240101000000||ORU^R01|G2|P|2.5\r\
PID|1||PT778\r\
OBR|1|A||REMOTE|||20240105000000\r\
OBX|1|NM|73990-7^Battery Voltage^LN||2.70|V\r\
OBR|2|B||REMOTE|||20240106000000\r\
OBX|2|NM|8867-4^Heart Rate^LN||64|bpm";
        let parsed = parse_message(text, None, &config()).unwrap();
        let tx = &parsed.transmission;
        assert_eq!(
            tx.observation("battery_voltage").unwrap().observation_time.to_string(),
            "2024-01-05 00:00:00"
        );
        assert_eq!(
            tx.observation("heart_rate").unwrap().observation_time.to_string(),
            "2024-01-06 00:00:00"
        );
    }

    #[test]
    fn duplicate_sequence_numbers_keep_the_first_row() {
        let text = "MSH|^~\\&|EPIC|HOSP|||20240101000000||ORU^R01|G3|P|2.5\r\
PID|1||PT779\r\
OBR|1|A||REMOTE|||20240105000000\r\
OBX|1|NM|73990-7^Battery Voltage^LN||2.70|V\r\
OBX|1|NM|8867-4^Heart Rate^LN||64|bpm";
        let parsed = parse_message(text, None, &config()).unwrap();
        assert_eq!(parsed.imported(), 1);
        assert!(matches!(
            parsed.warnings[0].kind,
            WarningKind::DuplicateSequence(1)
        ));
    }

    #[test]
    fn anonymize_and_raw_retention_follow_config() {
        let cfg = IngestConfig::new(true, 100, 1024 * 1024, 500, true).unwrap();
        let parsed = parse_message(MEDTRONIC, None, &cfg).unwrap();
        assert_eq!(parsed.patient.patient_name, None);
        assert_eq!(parsed.patient.date_of_birth, None);
        assert_eq!(parsed.patient.anonymized_id.as_deref(), Some("Patient_345"));

        let raw = parsed.transmission.raw_message.as_deref().unwrap();
        assert!(raw.starts_with("MSH|"));
        assert!(!raw.contains('\n'));
    }

    #[test]
    fn parsing_is_deterministic() {
        let a = parse_message(BOSTON, Some("a.hl7"), &config()).unwrap();
        let b = parse_message(BOSTON, Some("a.hl7"), &config()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_pid_is_rejected_before_parsing() {
        let text = MEDTRONIC.replace("PID|1||PT12345^^^HOSP^MR||DOE^JOHN^A||19550315|M\r\n", "");
        let err = parse_message(&text, None, &config()).expect_err("no PID");
        assert!(matches!(
            err,
            IngestError::Validation(ValidationError::MissingPid)
        ));
    }

    #[test]
    fn wrong_message_type_is_fatal() {
        let text = MEDTRONIC.replace("ORU^R01", "ADT^A08");
        let err = parse_message(&text, None, &config()).expect_err("wrong type");
        assert!(matches!(err, IngestError::TypeMismatch(_)));
    }

    #[test]
    fn hostile_patient_id_is_fatal() {
        let text = MEDTRONIC.replace("PT12345^^^HOSP^MR", "PT\"; DELETE FROM x");
        let err = parse_message(&text, None, &config()).expect_err("bad id");
        assert!(matches!(
            err,
            IngestError::PatientId(PatientIdError::InvalidCharacters(_))
        ));
    }

    #[test]
    fn ingest_persists_and_reuses_patients() {
        let store = InMemoryStore::new();
        let first = ingest(&store, MEDTRONIC, None, &config()).unwrap();
        let second_text = MEDTRONIC.replace("MSG00001", "MSG00002");
        let second = ingest(&store, &second_text, None, &config()).unwrap();

        assert_ne!(first.handle, second.handle);
        assert_eq!(store.patient_count().unwrap(), 1);
        assert_eq!(store.transmission_count().unwrap(), 2);

        let stored = store.transmission(first.handle).unwrap().unwrap();
        assert_eq!(stored.observations.len(), 3);
        assert_eq!(stored.kind, TransmissionKind::Remote);
    }

    #[test]
    fn retained_raw_message_reaches_the_store() {
        let store = InMemoryStore::new();
        let cfg = IngestConfig::new(false, 100, 1024 * 1024, 500, true).unwrap();
        let outcome = ingest(&store, MEDTRONIC, None, &cfg).unwrap();

        let stored = store.transmission(outcome.handle).unwrap().unwrap();
        let raw = stored.raw_message.as_deref().expect("raw message retained");
        assert!(raw.starts_with("MSH|^~\\&|CARELINK"));
        assert_eq!(stored.raw_message, outcome.parsed.transmission.raw_message);

        let default_outcome = ingest(&store, MEDTRONIC, None, &config()).unwrap();
        let stored = store.transmission(default_outcome.handle).unwrap().unwrap();
        assert_eq!(stored.raw_message, None);
    }

    #[test]
    fn failed_ingest_writes_nothing() {
        let store = InMemoryStore::new();
        let text = MEDTRONIC.replace("ORU^R01", "ORM^O01");
        assert!(ingest(&store, &text, None, &config()).is_err());
        assert_eq!(store.patient_count().unwrap(), 0);
        assert_eq!(store.transmission_count().unwrap(), 0);
    }

    #[test]
    fn parsed_message_serialises_to_json() {
        let parsed = parse_message(MEDTRONIC, None, &config()).unwrap();
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["transmission"]["kind"], "remote");
        assert_eq!(
            json["transmission"]["observations"][0]["variable_name"],
            "battery_voltage"
        );
        assert_eq!(
            json["transmission"]["observations"][2]["value"]["blob"],
            "SGVsbG8="
        );
        assert_eq!(json["warnings"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn parsed_message_serialises_to_yaml() {
        let parsed = parse_message(BOSTON, None, &config()).unwrap();
        let yaml = serde_yaml::to_string(&parsed).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(value["patient"]["patient_id"].as_str(), Some("7767669"));
        let first = &value["transmission"]["observations"][0];
        assert_eq!(first["variable_name"].as_str(), Some("battery_longevity"));
        assert_eq!(first["time_source"].as_str(), Some("sub_id_group"));
    }

    #[test]
    fn egm_format_is_recorded_for_large_binary_strips() {
        use base64::{engine::general_purpose, Engine as _};

        let blob = general_purpose::STANDARD.encode(vec![0u8; 200]);
        let text = MEDTRONIC.replace("SGVsbG8=", &blob);
        let parsed = parse_message(&text, None, &config()).unwrap();
        let egm = parsed.transmission.observation("egm_strip").unwrap();
        assert_eq!(egm.egm_format, Some(EgmFormat::Binary));
    }
}
