//! Boston Scientific LATITUDE codes.
//!
//! LATITUDE reports numeric MDC_IDC identifiers. Device settings, operator settings and
//! measurements share one numeric space; the tables below are grouped the way the
//! nomenclature groups them, and [`category`] recovers that grouping from a mapped name.
//! Per-zone and per-channel rows repeat a code with a different OBX-4 sub-id.

use super::{is_pdf, is_xml_declaration, EgmFormat, EgmMeta};
use openpace_types::Manufacturer;
use serde::Serialize;

// Fixed device identity
const DEVICE_INFO: &[(&str, &str)] = &[
    ("720897", "device_type"),
    ("720898", "device_model"),
    ("720899", "device_serial"),
    ("720900", "device_manufacturer"),
    ("720901", "device_implant_date"),
];

const LEAD_INFO: &[(&str, &str)] = &[
    ("720961", "lead_model"),
    ("720962", "lead_serial"),
    ("720963", "lead_manufacturer"),
    ("720964", "lead_implant_date"),
    ("720965", "lead_polarity_type"),
    ("720966", "lead_location"),
];

const SESSION: &[(&str, &str)] = &[
    ("721025", "session_datetime"),
    ("721026", "session_type"),
    ("721033", "session_clinic_name"),
];

const BRADY_SETTINGS: &[(&str, &str)] = &[
    ("730752", "set_brady_mode"),
    ("730880", "set_brady_lowrate"),
    ("731136", "set_brady_max_tracking_rate"),
    ("731200", "set_brady_max_sensor_rate"),
    ("731265", "set_brady_sav_delay_high"),
    ("731266", "set_brady_sav_delay_low"),
    ("731329", "set_brady_pav_delay_high"),
    ("731330", "set_brady_pav_delay_low"),
    ("731072", "set_brady_sensor_type"),
    ("731392", "set_brady_at_mode_switch_mode"),
    ("731456", "set_brady_at_mode_switch_rate"),
];

const TACHY_SETTINGS: &[(&str, &str)] = &[("731520", "set_tachy_vstat")];

const ZONE_SETTINGS: &[(&str, &str)] = &[
    ("731648", "set_zone_type"),
    ("731712", "set_zone_vendor_type"),
    ("731776", "set_zone_status"),
    ("731840", "set_zone_detection_interval"),
    ("732097", "set_zone_atp_type_1"),
    ("732098", "set_zone_atp_type_2"),
    ("732161", "set_zone_num_atp_seqs_1"),
    ("732162", "set_zone_num_atp_seqs_2"),
    ("732225", "set_zone_shock_energy_1"),
    ("732226", "set_zone_shock_energy_2"),
    ("732227", "set_zone_shock_energy_3"),
    ("732289", "set_zone_num_shocks_1"),
    ("732290", "set_zone_num_shocks_2"),
    ("732291", "set_zone_num_shocks_3"),
];

const LEADCHNL_SENSING_SETTINGS: &[(&str, &str)] = &[
    ("729536", "set_leadchnl_ra_sensing_sensitivity"),
    ("729537", "set_leadchnl_rv_sensing_sensitivity"),
    ("729600", "set_leadchnl_ra_sensing_polarity"),
    ("729601", "set_leadchnl_rv_sensing_polarity"),
    ("729920", "set_leadchnl_ra_sensing_adaptation"),
    ("729921", "set_leadchnl_rv_sensing_adaptation"),
];

const LEADCHNL_PACING_SETTINGS: &[(&str, &str)] = &[
    ("729984", "set_leadchnl_ra_pacing_amplitude"),
    ("729985", "set_leadchnl_rv_pacing_amplitude"),
    ("730048", "set_leadchnl_ra_pacing_pulsewidth"),
    ("730049", "set_leadchnl_rv_pacing_pulsewidth"),
    ("730112", "set_leadchnl_ra_pacing_polarity"),
    ("730113", "set_leadchnl_rv_pacing_polarity"),
    ("730432", "set_leadchnl_ra_pacing_capture_mode"),
    ("730433", "set_leadchnl_rv_pacing_capture_mode"),
];

// Measurements. Widely used values map to the shared universal names.
const BATTERY_MSMT: &[(&str, &str)] = &[
    ("721216", "msmt_battery_datetime"),
    ("721280", "battery_status"),
    ("721472", "battery_longevity"),
    ("721536", "battery_percentage"),
];

const CAPACITOR_MSMT: &[(&str, &str)] = &[
    ("721664", "msmt_cap_charge_datetime"),
    ("721728", "capacitor_charge_time"),
    ("721856", "msmt_cap_charge_type"),
];

const LEADCHNL_MSMT: &[(&str, &str)] = &[
    ("721921", "msmt_leadchnl_ra_datetime"),
    ("721925", "msmt_leadchnl_rv_datetime"),
    ("722051", "atrial_sensing_amplitude"),
    ("722055", "ventricular_sensing_amplitude"),
    ("722112", "msmt_leadchnl_ra_sensing_polarity"),
    ("722113", "msmt_leadchnl_rv_sensing_polarity"),
    ("722176", "atrial_pacing_threshold"),
    ("722177", "ventricular_pacing_threshold"),
    ("722240", "msmt_leadchnl_ra_pacing_threshold_pulsewidth"),
    ("722241", "msmt_leadchnl_rv_pacing_threshold_pulsewidth"),
    ("722304", "msmt_leadchnl_ra_pacing_threshold_method"),
    ("722305", "msmt_leadchnl_rv_pacing_threshold_method"),
    ("722368", "msmt_leadchnl_ra_pacing_threshold_polarity"),
    ("722369", "msmt_leadchnl_rv_pacing_threshold_polarity"),
    ("722432", "lead_impedance_atrial"),
    ("722433", "lead_impedance_ventricular"),
    ("722496", "msmt_leadchnl_ra_impedance_polarity"),
    ("722497", "msmt_leadchnl_rv_impedance_polarity"),
];

const HV_CHANNEL_MSMT: &[(&str, &str)] = &[
    ("722560", "msmt_leadhvchnl_datetime"),
    ("722624", "msmt_leadhvchnl_impedance"),
    ("722688", "msmt_leadhvchnl_measurement_type"),
];

const STATISTICS: &[(&str, &str)] = &[
    ("737489", "stat_datetime_start"),
    ("737490", "stat_datetime_end"),
    ("737505", "stat_brady_datetime_start"),
    ("737506", "stat_brady_datetime_end"),
    ("737520", "pacing_percent_atrial"),
    ("737536", "pacing_percent_ventricular"),
    ("737665", "stat_at_datetime_start"),
    ("737666", "stat_at_datetime_end"),
    ("737696", "afib_burden_percent"),
    ("737824", "shocks_delivered_recent"),
    ("737840", "shocks_delivered_total"),
    ("737856", "shocks_aborted_recent"),
    ("737872", "shocks_aborted_total"),
    ("737888", "atp_delivered_recent"),
    ("737904", "atp_delivered_total"),
    ("737921", "stat_tachy_total_datetime_start"),
    ("737922", "stat_tachy_total_datetime_end"),
    ("737937", "stat_tachy_recent_datetime_start"),
    ("737938", "stat_tachy_recent_datetime_end"),
    ("737952", "stat_episode_type"),
    ("737984", "stat_episode_vendor_type"),
    ("738000", "episode_count_recent"),
    ("738017", "stat_episode_recent_count_datetime_start"),
    ("738018", "stat_episode_recent_count_datetime_end"),
];

const EPISODES: &[(&str, &str)] = &[
    ("739536", "episode_id"),
    ("739552", "episode_datetime"),
    ("739568", "episode_type"),
    ("739600", "episode_vendor_type"),
    ("739680", "episode_detection_therapy_details"),
    ("739712", "episode_duration"),
];

const ALL_TABLES: &[&[(&str, &str)]] = &[
    DEVICE_INFO,
    LEAD_INFO,
    SESSION,
    BRADY_SETTINGS,
    TACHY_SETTINGS,
    ZONE_SETTINGS,
    LEADCHNL_SENSING_SETTINGS,
    LEADCHNL_PACING_SETTINGS,
    BATTERY_MSMT,
    CAPACITOR_MSMT,
    LEADCHNL_MSMT,
    HV_CHANNEL_MSMT,
    STATISTICS,
    EPISODES,
];

fn lookup(code: &str) -> Option<&'static str> {
    ALL_TABLES
        .iter()
        .flat_map(|table| table.iter())
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

pub fn map_observation_id(code: &str, text: &str) -> Option<&'static str> {
    lookup(code).or_else(|| infer_from_text(text))
}

fn infer_from_text(text: &str) -> Option<&'static str> {
    let t = text.to_lowercase();
    let has = |k: &str| t.contains(k);

    if has("battery") {
        if has("voltage") {
            return Some("battery_voltage");
        } else if has("status") {
            return Some("battery_status");
        } else if has("longevity") {
            return Some("battery_longevity");
        }
    }

    if has("impedance") {
        if has("ra") || has("atrial") {
            return Some("lead_impedance_atrial");
        } else if has("rv") || has("ventricular") {
            return Some("lead_impedance_ventricular");
        }
    }

    if has("pacing") && has("percent") {
        if has("atrial") || has("ra") {
            return Some("pacing_percent_atrial");
        } else if has("ventricular") || has("rv") {
            return Some("pacing_percent_ventricular");
        }
    }

    if has("burden") && (has("af") || has("atrial")) {
        return Some("afib_burden_percent");
    }

    None
}

pub fn decode_egm(blob: &[u8]) -> Option<EgmMeta> {
    let format = if is_pdf(blob) {
        EgmFormat::Pdf
    } else if is_xml_declaration(blob) {
        EgmFormat::Xml
    } else {
        EgmFormat::Binary
    };
    Some(EgmMeta::opaque(
        format,
        Manufacturer::BostonScientific,
        blob.len(),
    ))
}

/// Grouping of a mapped variable for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableCategory {
    Device,
    LeadInfo,
    Brady,
    Tachy,
    Zone,
    Sensing,
    Pacing,
    Battery,
    LeadMeasurement,
    Statistics,
    Episode,
    Other,
}

/// Device constants that the operator cannot reprogram (model, serial, lead identity).
pub fn is_fixed_setting(variable: &str) -> bool {
    const PREFIXES: &[&str] = &[
        "device_",
        "lead_model",
        "lead_serial",
        "lead_manufacturer",
        "lead_implant",
        "lead_polarity_type",
        "lead_location",
    ];
    PREFIXES.iter().any(|p| variable.starts_with(p))
}

/// Programmed parameters a clinician can change.
pub fn is_operator_setting(variable: &str) -> bool {
    const PREFIXES: &[&str] = &["set_brady_", "set_tachy_", "set_zone_", "set_leadchnl_"];
    PREFIXES.iter().any(|p| variable.starts_with(p))
}

/// Values observed by the device rather than programmed.
pub fn is_measurement(variable: &str) -> bool {
    const PREFIXES: &[&str] = &["msmt_", "stat_", "episode_"];
    PREFIXES.iter().any(|p| variable.starts_with(p))
}

pub fn category(variable: &str) -> VariableCategory {
    let v = variable;
    if v.starts_with("device_") {
        VariableCategory::Device
    } else if v.starts_with("lead_") && !v.starts_with("lead_impedance") {
        VariableCategory::LeadInfo
    } else if v.starts_with("set_brady_") {
        VariableCategory::Brady
    } else if v.starts_with("set_tachy_") {
        VariableCategory::Tachy
    } else if v.starts_with("set_zone_") {
        VariableCategory::Zone
    } else if v.contains("sensing") {
        VariableCategory::Sensing
    } else if v.contains("pacing") && v.contains("set_") {
        VariableCategory::Pacing
    } else if v.contains("battery") || v.contains("cap_charge") {
        VariableCategory::Battery
    } else if v.starts_with("msmt_leadchnl_") || v.starts_with("msmt_leadhvchnl_") {
        VariableCategory::LeadMeasurement
    } else if v.starts_with("stat_") {
        VariableCategory::Statistics
    } else if v.starts_with("episode_") {
        VariableCategory::Episode
    } else {
        VariableCategory::Other
    }
}
