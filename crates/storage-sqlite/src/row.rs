//! Row-level conversion helpers shared by the entity stores.
//!
//! SQLite rows carry money and timestamps as TEXT; these helpers are the
//! single place where the string forms are produced and parsed.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use pocketledger_core::sync::time;

use crate::errors::StorageError;

/// `sync_state` column values. Must stay in lockstep with the serde
/// encoding of `SyncState`; a test below pins that.
pub(crate) const SYNC_STATE_PENDING_CREATE: &str = "pending_create";
pub(crate) const SYNC_STATE_PENDING_UPDATE: &str = "pending_update";
pub(crate) const SYNC_STATE_PENDING_DELETE: &str = "pending_delete";
pub(crate) const SYNC_STATE_CLEAN: &str = "clean";

pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value)
        .map(|encoded| encoded.trim_matches('"').to_string())
        .map_err(|err| StorageError::Corrupt(format!("Enum encode failed: {}", err)))
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(
    value: &str,
) -> Result<T, StorageError> {
    serde_json::from_str(&format!("\"{}\"", value))
        .map_err(|_| StorageError::Corrupt(format!("Unknown enum value '{}'", value)))
}

pub(crate) fn timestamp_to_db(value: DateTime<Utc>) -> String {
    time::encode_timestamp(value)
}

pub(crate) fn timestamp_from_db(value: &str) -> Result<DateTime<Utc>, StorageError> {
    time::decode_timestamp(value)
        .ok_or_else(|| StorageError::Corrupt(format!("Bad timestamp '{}'", value)))
}

pub(crate) fn opt_timestamp_to_db(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(timestamp_to_db)
}

pub(crate) fn opt_timestamp_from_db(
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, StorageError> {
    value.map(timestamp_from_db).transpose()
}

pub(crate) fn date_to_db(value: NaiveDate) -> String {
    time::encode_date(value)
}

pub(crate) fn date_from_db(value: &str) -> Result<NaiveDate, StorageError> {
    time::decode_date(value).ok_or_else(|| StorageError::Corrupt(format!("Bad date '{}'", value)))
}

pub(crate) fn decimal_to_db(value: Decimal) -> String {
    value.to_string()
}

pub(crate) fn decimal_from_db(value: &str) -> Result<Decimal, StorageError> {
    value
        .parse::<Decimal>()
        .map_err(|_| StorageError::Corrupt(format!("Bad decimal '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pocketledger_core::sync::SyncState;
    use rust_decimal_macros::dec;

    #[test]
    fn sync_state_constants_match_the_serde_encoding() {
        assert_eq!(enum_to_db(&SyncState::Clean).unwrap(), SYNC_STATE_CLEAN);
        assert_eq!(
            enum_to_db(&SyncState::PendingCreate).unwrap(),
            SYNC_STATE_PENDING_CREATE
        );
        assert_eq!(
            enum_to_db(&SyncState::PendingUpdate).unwrap(),
            SYNC_STATE_PENDING_UPDATE
        );
        assert_eq!(
            enum_to_db(&SyncState::PendingDelete).unwrap(),
            SYNC_STATE_PENDING_DELETE
        );
    }

    #[test]
    fn enum_round_trips_and_rejects_garbage() {
        let state: SyncState = enum_from_db(SYNC_STATE_PENDING_DELETE).unwrap();
        assert_eq!(state, SyncState::PendingDelete);
        assert!(enum_from_db::<SyncState>("definitely_not_a_state").is_err());
    }

    #[test]
    fn decimal_round_trips_without_precision_loss() {
        let value = dec!(-1234.5678);
        assert_eq!(decimal_from_db(&decimal_to_db(value)).unwrap(), value);
        assert!(decimal_from_db("one hundred").is_err());
    }

    #[test]
    fn bad_timestamps_surface_as_corrupt() {
        assert!(timestamp_from_db("2026-08-06T12:00:00.000000Z").is_ok());
        assert!(timestamp_from_db("yesterday").is_err());
    }
}
