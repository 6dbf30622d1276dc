//! Canonical timestamp and date string encoding shared by store backends.
//!
//! Fixed-width RFC 3339 with microseconds, so lexicographic order on the
//! encoded strings matches chronological order. Every backend that persists
//! or keysets on these values must go through this module.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

pub fn encode_date(value: NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub fn decode_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}
