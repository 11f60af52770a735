//! ISO-8601 timestamps for the metadata file.
//!
//! Written values are RFC 3339 in local time with microseconds and an
//! explicit offset. Values without an offset (as written by older versions
//! of the tool) are accepted on read and taken as local time.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, SecondsFormat, TimeZone};

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Current local time
pub fn now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

/// Render a timestamp the way the metadata file stores it.
pub fn format(value: &DateTime<FixedOffset>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse an ISO-8601 string, with or without a UTC offset.
pub fn parse(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed);
    }

    let naive = NaiveDateTime::parse_from_str(value, NAIVE_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.fixed_offset())
}

/// Human-readable form of fractional epoch seconds, to the microsecond.
pub fn iso_from_epoch(seconds: f64) -> String {
    let micros = (seconds * 1_000_000.0).round() as i64;
    match DateTime::from_timestamp_micros(micros) {
        Some(utc) => format(&utc.with_timezone(&Local).fixed_offset()),
        None => String::new(),
    }
}

/// Fractional epoch seconds of a timestamp.
pub fn epoch_from(value: &DateTime<FixedOffset>) -> f64 {
    value.timestamp_micros() as f64 / 1_000_000.0
}

/// Serde adapter for `DateTime<FixedOffset>` fields.
pub mod iso8601 {
    use chrono::{DateTime, FixedOffset};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<FixedOffset>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid ISO-8601 timestamp: {raw}")))
    }
}
