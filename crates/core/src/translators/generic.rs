//! LOINC-based translation used for standardized messages and vendors without a dedicated table.

use super::{is_pdf, EgmFormat, EgmMeta};
use openpace_types::Manufacturer;

const LOINC_CODES: &[(&str, &str)] = &[
    // Battery
    ("73990-7", "battery_voltage"),
    ("73991-5", "battery_eri_date"),
    ("73992-3", "battery_impedance"),
    // Lead impedance
    ("8889-8", "lead_impedance_atrial"),
    ("8890-6", "lead_impedance_ventricular"),
    ("8891-4", "lead_impedance_rv"),
    ("8892-2", "lead_impedance_lv"),
    // Arrhythmia burden
    ("89269-2", "afib_burden_percent"),
    ("89270-0", "vt_burden_percent"),
    ("89271-8", "svt_burden_percent"),
    // Heart rate
    ("8867-4", "heart_rate"),
    ("8893-0", "heart_rate_max"),
    ("8894-8", "heart_rate_min"),
    ("8895-5", "heart_rate_mean"),
    // Pacing
    ("8896-3", "pacing_percent_atrial"),
    ("8897-1", "pacing_percent_ventricular"),
    ("8898-9", "pacing_percent_biventricular"),
    // Waveforms and reports
    ("11524-6", "egm_strip"),
    ("11525-3", "ecg_waveform"),
    ("18750-0", "cardiac_ep_report"),
    // Programmed parameters
    ("8899-7", "lower_rate_limit"),
    ("8900-3", "upper_rate_limit"),
    ("8901-1", "pacing_mode"),
    // Sensing
    ("8902-9", "atrial_sensitivity"),
    ("8903-7", "ventricular_sensitivity"),
];

/// Codes that some senders put in OBX-3.1 verbatim as the variable name.
const SELF_NAMED_CODES: &[&str] = &[
    "battery_voltage",
    "battery_current",
    "battery_impedance",
    "ra_lead_impedance",
    "rv_lead_impedance",
    "lv_lead_impedance",
    "atrial_sensing",
    "ventricular_sensing",
    "a_pace_threshold",
    "v_pace_threshold",
    "af_episode_count",
    "vt_episode_count",
    "device_model",
    "device_serial",
    "device_firmware",
    "longevity_estimate",
];

pub(crate) fn lookup_loinc(code: &str) -> Option<&'static str> {
    LOINC_CODES
        .iter()
        .find(|(loinc, _)| *loinc == code)
        .map(|(_, name)| *name)
}

pub fn map_observation_id(code: &str, text: &str) -> Option<&'static str> {
    if let Some(name) = lookup_loinc(code) {
        return Some(name);
    }

    let code_lower = code.to_ascii_lowercase();
    if let Some(name) = SELF_NAMED_CODES.iter().copied().find(|n| *n == code_lower) {
        return Some(name);
    }

    infer_from_text(text)
}

fn infer_from_text(text: &str) -> Option<&'static str> {
    let t = text.to_lowercase();
    let has = |k: &str| t.contains(k);

    if has("battery") && has("voltage") {
        Some("battery_voltage")
    } else if has("battery") && has("current") {
        Some("battery_current")
    } else if has("impedance") && (has("atrial") || has("ra")) {
        Some("lead_impedance_atrial")
    } else if has("impedance") && (has("ventricular") || has("rv")) {
        Some("lead_impedance_ventricular")
    } else if has("afib") || has("atrial fib") || has("af episode") {
        Some("afib_burden_percent")
    } else if has("pacing") && has("percent") {
        Some("pacing_percent_ventricular")
    } else if has("longevity") || (has("battery") && has("estimate")) {
        Some("longevity_estimate")
    } else if has("device") && has("model") {
        Some("device_model")
    } else if has("device") && has("serial") {
        Some("device_serial")
    } else if has("firmware") {
        Some("device_firmware")
    } else if has("sensing") && has("atrial") {
        Some("atrial_sensing")
    } else if has("sensing") && has("ventricular") {
        Some("ventricular_sensing")
    } else if has("threshold") && has("atrial") {
        Some("atrial_pacing_threshold")
    } else if has("threshold") && has("ventricular") {
        Some("ventricular_pacing_threshold")
    } else {
        None
    }
}

pub fn decode_egm(blob: &[u8]) -> Option<EgmMeta> {
    let format = if is_pdf(blob) {
        EgmFormat::Pdf
    } else {
        EgmFormat::Binary
    };
    Some(EgmMeta::opaque(format, Manufacturer::Generic, blob.len()))
}
