//! Record sync lifecycle, the syncable-entity contract and LWW comparison.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{EntityFilter, SortField, SortOrder};

/// Entity kinds participating in local-first sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    CreditCard,
    Transaction,
    BudgetCategory,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreditCard => write!(f, "credit_card"),
            Self::Transaction => write!(f, "transaction"),
            Self::BudgetCategory => write!(f, "budget_category"),
        }
    }
}

/// Reconciliation status of a record relative to the remote backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// In agreement with the backend as of the last reconcile.
    Clean,
    /// Created locally, never acknowledged by the backend.
    PendingCreate,
    /// Updated locally, acknowledgement outstanding.
    PendingUpdate,
    /// Deleted locally, hidden from reads until the backend confirms.
    PendingDelete,
    /// Bounded retries exhausted; awaiting manual resolution.
    Conflict,
}

impl SyncState {
    /// Records carrying local intent must not be overwritten by a remote
    /// read; the intent resolves on the next push or by explicit conflict
    /// resolution.
    pub fn local_intent_wins(&self) -> bool {
        !matches!(self, Self::Clean)
    }

    /// Eligible for the background push queue.
    pub fn is_pending_push(&self) -> bool {
        matches!(
            self,
            Self::PendingCreate | Self::PendingUpdate | Self::PendingDelete
        )
    }
}

/// Whether a remote copy should overwrite the local one.
///
/// Whole-record last-writer-wins on the remote timestamp: the remote copy
/// wins only when it is strictly newer than the version the local record
/// last saw, and never against a record holding local intent.
pub fn remote_wins_lww<E: Syncable>(local: &E, remote_updated_at: DateTime<Utc>) -> bool {
    if local.sync_state().local_intent_wins() {
        return false;
    }
    match local.updated_at_remote() {
        Some(last_seen) => remote_updated_at > last_seen,
        None => true,
    }
}

/// Contract every synced entity implements.
///
/// The accessors expose the sync envelope (identity, state, timestamps and
/// push bookkeeping); `matches` and `sort_key` define query semantics once
/// so the SQL and in-memory store backends cannot drift apart.
pub trait Syncable: Clone + Send + Sync + Serialize + 'static {
    /// Creation payload.
    type Draft: Clone + Send + Sync + 'static;
    /// Partial update payload.
    type Patch: Clone + Send + Sync + 'static;
    /// Aggregate computed over the effective set.
    type Summary: Default + Clone + Send + Sync + serde::de::DeserializeOwned + Serialize + 'static;

    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn owner_id(&self) -> &str;
    fn remote_id(&self) -> Option<&str>;
    fn set_remote_id(&mut self, remote_id: Option<String>);
    fn sync_state(&self) -> SyncState;
    fn set_sync_state(&mut self, state: SyncState);
    fn updated_at_local(&self) -> DateTime<Utc>;
    fn touch_local(&mut self, at: DateTime<Utc>);
    fn updated_at_remote(&self) -> Option<DateTime<Utc>>;
    fn set_updated_at_remote(&mut self, at: Option<DateTime<Utc>>);
    fn push_attempts(&self) -> u32;
    fn set_push_attempts(&mut self, attempts: u32);
    fn next_push_at(&self) -> Option<DateTime<Utc>>;
    fn set_next_push_at(&mut self, at: Option<DateTime<Utc>>);

    /// Build a new local record from a draft, in `PendingCreate` state.
    fn from_draft(id: String, owner_id: &str, draft: Self::Draft, now: DateTime<Utc>) -> Self;

    /// Apply a partial update to the domain fields only.
    fn apply_patch(&mut self, patch: &Self::Patch);

    /// Filter predicate; must agree with the SQL translation of the filter.
    fn matches(&self, filter: &EntityFilter) -> bool;

    /// Keyset sort key for `field`; must order identically to the SQL scan.
    fn sort_key(&self, field: SortField) -> String;

    /// Default scan order for this entity.
    fn default_order() -> SortOrder;

    /// Fold a summary over the effective (non-pending-delete) set.
    fn summarize<'a, I>(items: I) -> Self::Summary
    where
        I: IntoIterator<Item = &'a Self>,
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::card;
    use chrono::TimeZone;

    #[test]
    fn sync_state_serialization_matches_backend_contract() {
        let actual = [
            SyncState::Clean,
            SyncState::PendingCreate,
            SyncState::PendingUpdate,
            SyncState::PendingDelete,
            SyncState::Conflict,
        ]
        .iter()
        .map(|state| serde_json::to_string(state).expect("serialize sync state"))
        .collect::<Vec<_>>();

        let expected = vec![
            "\"clean\"",
            "\"pending_create\"",
            "\"pending_update\"",
            "\"pending_delete\"",
            "\"conflict\"",
        ];
        assert_eq!(actual, expected);
    }

    #[test]
    fn lww_newer_remote_wins_over_clean_local() {
        let seen = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut local = card("card-1", "owner-1");
        local.sync_state = SyncState::Clean;
        local.updated_at_remote = Some(seen);

        assert!(remote_wins_lww(
            &local,
            seen + chrono::Duration::seconds(1)
        ));
        assert!(!remote_wins_lww(&local, seen));
    }

    #[test]
    fn lww_local_pending_intent_always_wins() {
        let seen = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        for state in [
            SyncState::PendingUpdate,
            SyncState::PendingDelete,
            SyncState::Conflict,
        ] {
            let mut local = card("card-1", "owner-1");
            local.sync_state = state;
            local.updated_at_remote = Some(seen);
            assert!(
                !remote_wins_lww(&local, seen + chrono::Duration::days(1)),
                "{:?} must protect local intent",
                state
            );
        }
    }

    #[test]
    fn lww_unseen_remote_version_wins_over_clean_local() {
        let mut local = card("card-1", "owner-1");
        local.sync_state = SyncState::Clean;
        local.updated_at_remote = None;
        assert!(remote_wins_lww(&local, Utc::now()));
    }
}
