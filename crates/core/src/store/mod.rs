//! The LocalStore boundary: embedded persistence for sync-tagged entities.

mod memory;
mod query;

pub use memory::MemoryStore;
pub use query::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::sync::Syncable;

/// Outcome of a store-level delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Record has a remote counterpart; kept as `PendingDelete` until the
    /// backend confirms.
    Soft,
    /// Local-only record with nothing to reconcile; physically removed.
    Hard,
    NotFound,
}

/// Embedded store for one entity type.
///
/// Every mutation is atomic per record: a `put` or `delete` fully applies or
/// is fully rejected. Effective reads exclude `PendingDelete` records.
#[async_trait]
pub trait EntityStore<E: Syncable>: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<E>>;

    async fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<E>>;

    /// Effective records for an owner, unpaged, in `order`.
    async fn list_effective(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        order: SortOrder,
    ) -> Result<Vec<E>>;

    /// Stable, repeatable range scan over the effective set. Ordering
    /// tie-breaks on `id`, so paging never skips or duplicates a record as
    /// long as no concurrent write reorders the scanned range.
    async fn query(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        order: SortOrder,
        page: &PageRequest,
    ) -> Result<ScanPage<E>>;

    /// Upsert by id.
    async fn put(&self, entity: E) -> Result<E>;

    /// Soft-delete when the record has a remote counterpart (marks
    /// `PendingDelete` and stamps `updated_at_local`), hard otherwise.
    async fn delete(&self, id: &str, now: DateTime<Utc>) -> Result<DeleteOutcome>;

    /// Physical removal regardless of sync state.
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Records awaiting push whose retry time has come, oldest first.
    async fn list_pending_push(&self, due_before: DateTime<Utc>, limit: u32) -> Result<Vec<E>>;

    /// Summary over the effective set; always recomputed, never persisted.
    async fn summary(&self, owner_id: &str) -> Result<E::Summary>;

    /// Evict `Clean` records whose local timestamp precedes `cutoff`.
    /// Returns the number of evicted records.
    async fn prune_clean_before(&self, owner_id: &str, cutoff: DateTime<Utc>) -> Result<usize>;
}
