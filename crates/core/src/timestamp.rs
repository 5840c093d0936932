//! HL7 datetime parsing and per-observation clinical time resolution.

use chrono::{NaiveDate, NaiveDateTime};
use openpace_types::TimestampTier;
use std::collections::HashMap;

/// Parses an HL7 `DTM`/`TS` value.
///
/// Accepted shapes are `YYYYMMDDHHMMSS`, `YYYYMMDDHHMM` and `YYYYMMDD` (midnight). Fractional
/// seconds are ignored, and a `+HHMM`/`-HHMM` offset at or after position 8 is stripped first.
/// Anything else is `None`.
pub fn parse_hl7_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = strip_offset(value.trim());

    if value.len() >= 14 {
        return NaiveDateTime::parse_from_str(value.get(..14)?, "%Y%m%d%H%M%S").ok();
    }
    if value.len() >= 12 {
        return NaiveDateTime::parse_from_str(value.get(..12)?, "%Y%m%d%H%M").ok();
    }
    if value.len() >= 8 {
        return parse_hl7_date(value).and_then(|d| d.and_hms_opt(0, 0, 0));
    }

    None
}

/// Parses the `YYYYMMDD` prefix of an HL7 date.
pub fn parse_hl7_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.len() < 8 {
        return None;
    }
    NaiveDate::parse_from_str(value.get(..8)?, "%Y%m%d").ok()
}

fn strip_offset(value: &str) -> &str {
    match value.char_indices().skip(8).find(|(_, c)| matches!(c, '+' | '-')) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Datetimes reported by vendor rows, keyed by OBX-4 sub-id.
///
/// Built once per message before any measurement row is resolved, then only read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubIdDatetimes(HashMap<String, NaiveDateTime>);

impl SubIdDatetimes {
    /// Builds the index from `(sub_id, datetime)` pairs. The first datetime for a sub-id wins.
    pub fn build<'a>(pairs: impl IntoIterator<Item = (&'a str, NaiveDateTime)>) -> Self {
        let mut map = HashMap::new();
        for (sub_id, dt) in pairs {
            let sub_id = sub_id.trim();
            if sub_id.is_empty() {
                continue;
            }
            map.entry(sub_id.to_string()).or_insert(dt);
        }
        Self(map)
    }

    pub fn get(&self, sub_id: &str) -> Option<NaiveDateTime> {
        self.0.get(sub_id.trim()).copied()
    }
}

/// Chooses the clinical time for one observation. The first available source wins:
/// OBX-14, then the sub-id group datetime, then OBR-7, then the message datetime.
pub fn resolve(
    observation_datetime: Option<NaiveDateTime>,
    sub_id: &str,
    request_datetime: Option<NaiveDateTime>,
    message_datetime: Option<NaiveDateTime>,
    datetime_by_sub_id: &SubIdDatetimes,
) -> Option<(NaiveDateTime, TimestampTier)> {
    observation_datetime
        .map(|dt| (dt, TimestampTier::Observation))
        .or_else(|| {
            datetime_by_sub_id
                .get(sub_id)
                .map(|dt| (dt, TimestampTier::SubIdGroup))
        })
        .or_else(|| request_datetime.map(|dt| (dt, TimestampTier::Request)))
        .or_else(|| message_datetime.map(|dt| (dt, TimestampTier::Message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        parse_hl7_datetime(s).expect("fixture datetime")
    }

    #[test]
    fn parses_all_supported_precisions() {
        assert_eq!(dt("20240115103000").to_string(), "2024-01-15 10:30:00");
        assert_eq!(dt("202401151030").to_string(), "2024-01-15 10:30:00");
        assert_eq!(dt("20240115").to_string(), "2024-01-15 00:00:00");
        assert_eq!(dt("20240115103000.1234").to_string(), "2024-01-15 10:30:00");
    }

    #[test]
    fn strips_timezone_offsets() {
        assert_eq!(dt("20240115103000+0100").to_string(), "2024-01-15 10:30:00");
        assert_eq!(dt("202401151030-0500").to_string(), "2024-01-15 10:30:00");
        assert_eq!(dt("20240115-0500").to_string(), "2024-01-15 00:00:00");
    }

    #[test]
    fn rejects_unparseable_values() {
        for bad in ["", "2024", "2024011", "notadate", "20241345", "20240115256000"] {
            assert_eq!(parse_hl7_datetime(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn index_keeps_first_datetime_per_sub_id() {
        let idx = SubIdDatetimes::build([
            ("1", dt("20240114090000")),
            ("1", dt("20240301000000")),
            ("", dt("20240302000000")),
            ("2", dt("20240303000000")),
        ]);
        assert_eq!(idx.get(""), None);
        assert_eq!(idx.get("1"), Some(dt("20240114090000")));
        assert_eq!(idx.get(" 2 "), Some(dt("20240303000000")));
    }

    #[test]
    fn resolution_follows_tier_precedence() {
        let obx = Some(dt("20240115103000"));
        let obr = Some(dt("20240110000000"));
        let msh = Some(dt("20240101000000"));
        let idx = SubIdDatetimes::build([("1", dt("20240114090000"))]);

        let (t, tier) = resolve(obx, "1", obr, msh, &idx).unwrap();
        assert_eq!(t.to_string(), "2024-01-15 10:30:00");
        assert_eq!(tier, TimestampTier::Observation);

        let (t, tier) = resolve(None, "1", obr, msh, &idx).unwrap();
        assert_eq!(t.to_string(), "2024-01-14 09:00:00");
        assert_eq!(tier, TimestampTier::SubIdGroup);

        let (t, tier) = resolve(None, "9", obr, msh, &idx).unwrap();
        assert_eq!(t.to_string(), "2024-01-10 00:00:00");
        assert_eq!(tier, TimestampTier::Request);

        let (t, tier) = resolve(None, "", None, msh, &idx).unwrap();
        assert_eq!(t.to_string(), "2024-01-01 00:00:00");
        assert_eq!(tier, TimestampTier::Message);

        assert_eq!(resolve(None, "", None, None, &idx), None);
    }
}
