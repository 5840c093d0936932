//! Medtronic CareLink codes. CareLink mixes LOINC with proprietary `MDC_*` identifiers.

use super::{generic, is_pdf, EgmFormat, EgmMeta};
use crate::constants::{EGM_HEADER_LEN, EGM_MIN_BINARY_LEN, EGM_SAMPLE_RATE_HZ};
use openpace_types::Manufacturer;

const MEDTRONIC_CODES: &[(&str, &str)] = &[
    // Battery
    ("MDC_BATTERY_VOLTAGE", "battery_voltage"),
    ("MDC_BATTERY_REMAINING", "battery_percent"),
    ("MDC_BATTERY_ERI", "battery_eri_date"),
    ("MDC_BATTERY_STATUS", "battery_status"),
    // Lead impedance
    ("MDC_IMP_ATRIAL", "lead_impedance_atrial"),
    ("MDC_IMP_RV", "lead_impedance_ventricular"),
    ("MDC_IMP_LV", "lead_impedance_lv"),
    ("MDC_IMP_RA", "lead_impedance_atrial"),
    ("MDC_LEAD_IMP_A", "lead_impedance_atrial"),
    ("MDC_LEAD_IMP_V", "lead_impedance_ventricular"),
    // Arrhythmia
    ("MDC_AFIB_BURDEN", "afib_burden_percent"),
    ("MDC_AFL_BURDEN", "aflutter_burden_percent"),
    ("MDC_VT_EPISODES", "vt_episode_count"),
    ("MDC_SVT_EPISODES", "svt_episode_count"),
    // Heart rate
    ("MDC_HR_AVERAGE", "heart_rate_mean"),
    ("MDC_HR_MAX", "heart_rate_max"),
    ("MDC_HR_MIN", "heart_rate_min"),
    ("MDC_HR_REST", "heart_rate_resting"),
    // Pacing
    ("MDC_PACE_PCT_A", "pacing_percent_atrial"),
    ("MDC_PACE_PCT_V", "pacing_percent_ventricular"),
    ("MDC_PACE_PCT_BIV", "pacing_percent_biventricular"),
    ("MDC_PACE_BURDEN", "pacing_burden_total"),
    // Programmed parameters
    ("MDC_RATE_LOWER", "lower_rate_limit"),
    ("MDC_RATE_UPPER", "upper_rate_limit"),
    ("MDC_MODE", "pacing_mode"),
    ("MDC_AV_DELAY", "av_delay"),
    // Sensing
    ("MDC_SENSE_A", "atrial_sensitivity"),
    ("MDC_SENSE_V", "ventricular_sensitivity"),
    // Episodes
    ("MDC_EGM_STRIP", "egm_strip"),
    ("MDC_EPISODE_DATA", "episode_data"),
    // Rate response
    ("MDC_ACTIVITY_LEVEL", "activity_level"),
    ("MDC_RATE_RESPONSE", "rate_response_status"),
    // Alerts
    ("MDC_ALERT_COUNT", "alert_count"),
    ("MDC_LEAD_NOISE", "lead_noise_detected"),
];

const EGM_CHANNELS: [&str; 2] = ["Atrial", "Ventricular"];

/// `NNNNN-N` style codes.
fn looks_like_loinc(code: &str) -> bool {
    let digits: String = code.chars().filter(|c| *c != '-').collect();
    code.contains('-') && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

pub fn map_observation_id(code: &str, text: &str) -> Option<&'static str> {
    if let Some((_, name)) = MEDTRONIC_CODES.iter().find(|(c, _)| *c == code) {
        return Some(*name);
    }

    if looks_like_loinc(code) {
        return generic::map_observation_id(code, text);
    }

    infer_from_text(text)
}

fn infer_from_text(text: &str) -> Option<&'static str> {
    let t = text.to_lowercase();
    let has = |k: &str| t.contains(k);

    if has("battery") {
        return Some(if has("voltage") || has("volts") {
            "battery_voltage"
        } else if has("eri") || has("replacement") {
            "battery_eri_date"
        } else if has("remaining") || has("percent") {
            "battery_percent"
        } else {
            "battery_status"
        });
    }

    if has("impedance") || has("ohm") {
        return Some(if has("atrial") || has("ra") || has(" a ") {
            "lead_impedance_atrial"
        } else if has("ventricular") || has("rv") || has(" v ") {
            "lead_impedance_ventricular"
        } else if has("lv") || has("left") {
            "lead_impedance_lv"
        } else {
            "lead_impedance_ventricular"
        });
    }

    if has("afib") || has("atrial fib") {
        return Some(if has("burden") || has("percent") || has("%") {
            "afib_burden_percent"
        } else {
            "afib_episode_count"
        });
    }

    if has("aflutter") || has("atrial flutter") {
        return Some("aflutter_burden_percent");
    }
    if has("svt") {
        return Some("svt_episode_count");
    }
    if has("vt") || has("ventricular tach") {
        return Some("vt_episode_count");
    }

    if has("pacing") && has("percent") {
        return Some(if has("atrial") {
            "pacing_percent_atrial"
        } else if has("biv") || has("biventricular") {
            "pacing_percent_biventricular"
        } else if has("ventricular") {
            "pacing_percent_ventricular"
        } else {
            "pacing_burden_total"
        });
    }

    if has("heart rate") || has("hr") {
        return Some(if has("average") || has("mean") {
            "heart_rate_mean"
        } else if has("max") {
            "heart_rate_max"
        } else if has("min") {
            "heart_rate_min"
        } else {
            "heart_rate"
        });
    }

    if has("egm") || has("electrogram") {
        return Some("egm_strip");
    }

    None
}

/// Classifies a CareLink EGM.
///
/// PDF and XML/CDA payloads are reported as opaque. Binary payloads carry a 64-byte header
/// followed by big-endian signed 16-bit samples at 1000 Hz on two channels.
pub fn decode_egm(blob: &[u8]) -> Option<EgmMeta> {
    if is_pdf(blob) {
        return Some(EgmMeta::opaque(EgmFormat::Pdf, Manufacturer::Medtronic, blob.len()));
    }
    if blob.starts_with(b"<") {
        return Some(EgmMeta::opaque(EgmFormat::Xml, Manufacturer::Medtronic, blob.len()));
    }
    if blob.len() < EGM_MIN_BINARY_LEN {
        return None;
    }

    Some(EgmMeta {
        format: EgmFormat::Binary,
        vendor: Manufacturer::Medtronic,
        byte_len: blob.len(),
        sample_rate_hz: Some(EGM_SAMPLE_RATE_HZ),
        channels: EGM_CHANNELS.iter().map(|c| c.to_string()).collect(),
        sample_count: (blob.len() - EGM_HEADER_LEN) / 2,
    })
}
