//! Local-first repository: the policy engine over one entity type.
//!
//! Reads come from the local store and never block on the network; when the
//! backend is reachable they are augmented with a remote pull reconciled
//! under whole-record last-writer-wins. Writes apply locally first, return
//! the optimistic result immediately, and push in the background: retryable
//! failures re-queue with capped exponential backoff until the attempt bound
//! flags a conflict, non-retryable failures roll the record back to its
//! pre-mutation snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Instant;

use chrono::Utc;
use log::{debug, warn};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::errors::{Error, RemoteError, Result, RetryClass};
use crate::events::{DomainEvent, EventBus};
use crate::network::{NetworkMonitor, NetworkStatus};
use crate::remote::{RemoteApi, RemotePage};
use crate::settings::SyncSettings;
use crate::store::{
    DeleteOutcome, EntityFilter, EntityStore, PageRequest, ScanPage, ScanPosition, SortOrder,
};
use crate::subscription::SubscriptionGuard;
use crate::sync::{remote_wins_lww, RetryPolicy, SyncState, Syncable};

/// Hard cap on records drained per flush cycle.
const FLUSH_BATCH_LIMIT: u32 = 100;
/// Hard cap on remote listing pages consumed by one pull.
const MAX_PULL_PAGES: u32 = 50;

/// Read-policy switches for a single call.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Consult the remote service when online.
    pub augment: bool,
    /// Ignore the freshness clock and always consult the remote when online.
    pub force_refresh: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            augment: true,
            force_refresh: false,
        }
    }
}

impl ReadOptions {
    /// Local store only, regardless of connectivity.
    pub fn local_only() -> Self {
        Self {
            augment: false,
            force_refresh: false,
        }
    }
}

/// How a flagged conflict should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Re-queue the local copy for push.
    KeepLocal,
    /// Discard the local copy in favor of the backend's.
    KeepRemote,
}

/// Outcome of one background push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushStatus {
    Confirmed,
    Rescheduled,
    Conflicted,
    RolledBack,
    Skipped,
}

/// Tally of one `flush_pending` cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub attempted: usize,
    pub confirmed: usize,
    pub rescheduled: usize,
    pub conflicted: usize,
    pub rolled_back: usize,
}

/// Pre-mutation image kept for rollback.
enum Snapshot<E> {
    /// The record did not exist before; rollback removes it.
    Created,
    /// Rollback restores this image.
    Mutated(E),
}

pub struct LocalFirstRepository<E: Syncable> {
    store: Arc<dyn EntityStore<E>>,
    remote: Arc<dyn RemoteApi<E>>,
    network: Arc<NetworkMonitor>,
    events: Arc<EventBus>,
    settings: SyncSettings,
    retry: RetryPolicy,
    snapshots: Mutex<HashMap<String, Snapshot<E>>>,
    refreshed_at: Mutex<HashMap<String, Instant>>,
    /// Per-record mutation locks: a second write to the same id queues
    /// behind the first instead of interleaving with it.
    record_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    self_ref: OnceLock<Weak<Self>>,
}

impl<E: Syncable> LocalFirstRepository<E> {
    pub fn new(
        store: Arc<dyn EntityStore<E>>,
        remote: Arc<dyn RemoteApi<E>>,
        network: Arc<NetworkMonitor>,
        events: Arc<EventBus>,
        settings: SyncSettings,
    ) -> Arc<Self> {
        let retry = RetryPolicy::from_settings(&settings);
        let repository = Arc::new(Self {
            store,
            remote,
            network,
            events,
            settings,
            retry,
            snapshots: Mutex::new(HashMap::new()),
            refreshed_at: Mutex::new(HashMap::new()),
            record_locks: Mutex::new(HashMap::new()),
            self_ref: OnceLock::new(),
        });
        let _ = repository.self_ref.set(Arc::downgrade(&repository));
        repository
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    pub fn network(&self) -> Arc<NetworkMonitor> {
        Arc::clone(&self.network)
    }

    // ---- reads ---------------------------------------------------------

    pub async fn find_all(&self, owner_id: &str, filter: &EntityFilter) -> Result<Vec<E>> {
        self.find_all_with(owner_id, filter, ReadOptions::default())
            .await
    }

    pub async fn find_all_with(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        opts: ReadOptions,
    ) -> Result<Vec<E>> {
        let order = E::default_order();
        let local = self.read_local_degraded(owner_id, filter, order).await;
        if !self.should_augment(owner_id, &opts) {
            return Ok(local);
        }

        match self.pull_remote(owner_id, filter).await {
            Ok(applied) => {
                self.after_successful_pull(owner_id).await;
                debug!("Reconciled {} remote {} records", applied, E::KIND);
                Ok(self.read_local_degraded(owner_id, filter, order).await)
            }
            Err(err) => {
                warn!(
                    "Remote {} listing failed, serving cached data: {}",
                    E::KIND,
                    err
                );
                Ok(local)
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Option<E>> {
        self.store.get(id).await
    }

    /// One page of a stable range scan. Remote augmentation runs only when
    /// a scan starts from the beginning, so an in-progress scan is never
    /// reordered under its own cursor.
    pub async fn find_page(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        order: SortOrder,
        page: &PageRequest,
        opts: ReadOptions,
    ) -> Result<ScanPage<E>> {
        let fresh_scan = matches!(
            page.position,
            ScanPosition::Start | ScanPosition::Offset { offset: 0 }
        );
        if fresh_scan && self.should_augment(owner_id, &opts) {
            match self.pull_remote(owner_id, filter).await {
                Ok(_) => self.after_successful_pull(owner_id).await,
                Err(err) => warn!(
                    "Remote {} listing failed, paging cached data: {}",
                    E::KIND,
                    err
                ),
            }
        }

        match self.store.query(owner_id, filter, order, page).await {
            Ok(scanned) => Ok(scanned),
            Err(err) => {
                warn!("Local {} scan degraded to empty: {}", E::KIND, err);
                Ok(ScanPage::empty())
            }
        }
    }

    /// Offset-style paged read (`page` is 1-based).
    pub async fn find_by_range_paginated(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        page: u32,
        page_size: u32,
    ) -> Result<ScanPage<E>> {
        let offset = i64::from(page.max(1) - 1) * i64::from(page_size);
        self.find_page(
            owner_id,
            filter,
            E::default_order(),
            &PageRequest {
                limit: page_size,
                position: ScanPosition::Offset { offset },
            },
            ReadOptions::default(),
        )
        .await
    }

    /// Summary recomputed from the local effective set.
    pub async fn summary(&self, owner_id: &str) -> Result<E::Summary> {
        self.store.summary(owner_id).await
    }

    /// Summary from the backend aggregation endpoint when reachable,
    /// recomputed locally otherwise.
    pub async fn remote_summary(&self, owner_id: &str) -> Result<E::Summary> {
        if self.network.is_online() {
            match self.remote.summary(owner_id).await {
                Ok(summary) => return Ok(summary),
                Err(err) => warn!(
                    "Remote {} summary failed, recomputing locally: {}",
                    E::KIND,
                    err
                ),
            }
        }
        self.store.summary(owner_id).await
    }

    // ---- writes --------------------------------------------------------

    /// Apply a create locally and return the optimistic result immediately.
    /// The backend push runs in the background.
    pub async fn create(&self, owner_id: &str, draft: E::Draft) -> Result<E> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let entity = E::from_draft(id.clone(), owner_id, draft, now);
        let stored = self.store.put(entity).await?;

        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Snapshot::Created);
        self.events.emit(&DomainEvent::Created {
            kind: E::KIND,
            id: id.clone(),
        });
        self.spawn_push(id);
        Ok(stored)
    }

    pub async fn update(&self, id: &str, patch: E::Patch) -> Result<E> {
        let stored = {
            let _guard = self.record_guard(id).await;
            let mut record = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| Error::not_found(id))?;
            if record.sync_state() == SyncState::PendingDelete {
                return Err(Error::validation("record is pending deletion"));
            }

            self.remember_snapshot(&record);
            record.apply_patch(&patch);
            record.touch_local(Utc::now());
            let next_state = if record.remote_id().is_some() {
                SyncState::PendingUpdate
            } else {
                SyncState::PendingCreate
            };
            record.set_sync_state(next_state);
            record.set_push_attempts(0);
            record.set_next_push_at(None);
            self.store.put(record).await?
        };

        self.events.emit(&DomainEvent::Updated {
            kind: E::KIND,
            id: id.to_string(),
        });
        self.spawn_push(id.to_string());
        Ok(stored)
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let outcome = {
            let _guard = self.record_guard(id).await;
            let record = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| Error::not_found(id))?;
            self.remember_snapshot(&record);
            self.store.delete(id, Utc::now()).await?
        };

        match outcome {
            DeleteOutcome::NotFound => Err(Error::not_found(id)),
            DeleteOutcome::Hard => {
                self.clear_snapshot(id);
                self.events.emit(&DomainEvent::Deleted {
                    kind: E::KIND,
                    id: id.to_string(),
                });
                Ok(())
            }
            DeleteOutcome::Soft => {
                self.events.emit(&DomainEvent::Deleted {
                    kind: E::KIND,
                    id: id.to_string(),
                });
                self.spawn_push(id.to_string());
                Ok(())
            }
        }
    }

    /// Resolve a record flagged `Conflict`.
    ///
    /// `KeepLocal` re-queues the local copy for push; `KeepRemote` refetches
    /// the backend copy (or discards the record when the backend never had
    /// it). Returns the surviving record, if any.
    pub async fn resolve_conflict(
        &self,
        id: &str,
        resolution: ConflictResolution,
    ) -> Result<Option<E>> {
        let _guard = self.record_guard(id).await;
        let mut record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found(id))?;
        if record.sync_state() != SyncState::Conflict {
            return Err(Error::validation("record is not in conflict"));
        }

        match resolution {
            ConflictResolution::KeepLocal => {
                let next_state = if record.remote_id().is_some() {
                    SyncState::PendingUpdate
                } else {
                    SyncState::PendingCreate
                };
                record.set_sync_state(next_state);
                record.set_push_attempts(0);
                record.set_next_push_at(None);
                let stored = self.store.put(record).await?;
                self.spawn_push(id.to_string());
                Ok(Some(stored))
            }
            ConflictResolution::KeepRemote => {
                let Some(remote_id) = record.remote_id().map(str::to_string) else {
                    self.store.remove(id).await?;
                    self.clear_snapshot(id);
                    return Ok(None);
                };
                match self.remote.fetch(&remote_id).await.map_err(Error::from)? {
                    Some(mut fresh) => {
                        fresh.set_id(id.to_string());
                        fresh.set_sync_state(SyncState::Clean);
                        let stored = self.store.put(fresh).await?;
                        self.clear_snapshot(id);
                        Ok(Some(stored))
                    }
                    None => {
                        self.store.remove(id).await?;
                        self.clear_snapshot(id);
                        Ok(None)
                    }
                }
            }
        }
    }

    // ---- background sync ----------------------------------------------

    /// Drain due pending records, one push at a time.
    pub async fn flush_pending(&self) -> Result<FlushReport> {
        let mut report = FlushReport::default();
        if !self.network.is_online() {
            return Ok(report);
        }

        let due = self
            .store
            .list_pending_push(Utc::now(), FLUSH_BATCH_LIMIT)
            .await?;
        for record in due {
            report.attempted += 1;
            match self.push_record(record.id()).await? {
                PushStatus::Confirmed => report.confirmed += 1,
                PushStatus::Rescheduled => report.rescheduled += 1,
                PushStatus::Conflicted => report.conflicted += 1,
                PushStatus::RolledBack => report.rolled_back += 1,
                PushStatus::Skipped => {}
            }
        }
        Ok(report)
    }

    /// Register the offline→online flush trigger on the network monitor.
    pub fn attach_connectivity(&self) -> SubscriptionGuard {
        let weak = self.self_ref.get().cloned();
        self.network.on_transition(move |status| {
            if status != NetworkStatus::Online {
                return;
            }
            let Some(repository) = weak.as_ref().and_then(Weak::upgrade) else {
                return;
            };
            tokio::spawn(async move {
                match repository.flush_pending().await {
                    Ok(report) if report.attempted > 0 => {
                        debug!(
                            "Reconnect flush for {}: {} attempted, {} confirmed",
                            E::KIND,
                            report.attempted,
                            report.confirmed
                        );
                    }
                    Ok(_) => {}
                    Err(err) => warn!("Flush after reconnect failed: {}", err),
                }
            });
        })
    }

    /// Evict clean records older than the retention window.
    pub async fn evict_stale(&self, owner_id: &str) -> Result<usize> {
        let retention = chrono::Duration::from_std(self.settings.retention)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        self.store
            .prune_clean_before(owner_id, Utc::now() - retention)
            .await
    }

    /// Push one record now. Exposed for the flush loop and tests; UI code
    /// goes through `create`/`update`/`delete` and lets pushes run in the
    /// background.
    pub async fn push_record(&self, id: &str) -> Result<PushStatus> {
        let _guard = self.record_guard(id).await;
        let Some(record) = self.store.get(id).await? else {
            self.clear_snapshot(id);
            return Ok(PushStatus::Skipped);
        };
        if !record.sync_state().is_pending_push() || !self.network.is_online() {
            return Ok(PushStatus::Skipped);
        }

        let attempt = match record.sync_state() {
            SyncState::PendingCreate => self.remote.create(&record).await.map(Some),
            SyncState::PendingUpdate => match record.remote_id() {
                Some(remote_id) => self.remote.update(remote_id, &record).await.map(Some),
                None => self.remote.create(&record).await.map(Some),
            },
            SyncState::PendingDelete => match record.remote_id() {
                Some(remote_id) => self.remote.delete(remote_id).await.map(|_| None),
                None => {
                    // Never pushed; nothing to reconcile.
                    self.store.remove(id).await?;
                    self.clear_snapshot(id);
                    return Ok(PushStatus::Confirmed);
                }
            },
            _ => return Ok(PushStatus::Skipped),
        };

        match attempt {
            Ok(Some(ack)) => {
                let mut confirmed = record;
                confirmed.set_remote_id(Some(ack.remote_id.clone()));
                confirmed.set_updated_at_remote(Some(ack.updated_at_remote));
                confirmed.set_sync_state(SyncState::Clean);
                confirmed.set_push_attempts(0);
                confirmed.set_next_push_at(None);
                self.store.put(confirmed).await?;
                self.clear_snapshot(id);
                self.events.emit(&DomainEvent::SyncCompleted {
                    kind: E::KIND,
                    id: id.to_string(),
                    remote_id: ack.remote_id,
                });
                Ok(PushStatus::Confirmed)
            }
            Ok(None) => {
                let remote_id = record.remote_id().unwrap_or_default().to_string();
                self.store.remove(id).await?;
                self.clear_snapshot(id);
                self.events.emit(&DomainEvent::SyncCompleted {
                    kind: E::KIND,
                    id: id.to_string(),
                    remote_id,
                });
                Ok(PushStatus::Confirmed)
            }
            Err(err) => self.handle_push_failure(record, err).await,
        }
    }

    // ---- internals -----------------------------------------------------

    async fn handle_push_failure(&self, mut record: E, err: RemoteError) -> Result<PushStatus> {
        let id = record.id().to_string();
        match err.retry_class() {
            RetryClass::Retryable => {
                let attempts = record.push_attempts() + 1;
                if self.retry.allows(attempts) {
                    let due = self.retry.next_attempt_at(attempts, Utc::now());
                    record.set_push_attempts(attempts);
                    record.set_next_push_at(Some(due));
                    self.store.put(record).await?;
                    debug!(
                        "Push of {} {} failed ({}), retry {}/{} due {}",
                        E::KIND,
                        id,
                        err,
                        attempts,
                        self.retry.max_attempts(),
                        due
                    );
                    Ok(PushStatus::Rescheduled)
                } else {
                    record.set_push_attempts(attempts);
                    record.set_next_push_at(None);
                    record.set_sync_state(SyncState::Conflict);
                    self.store.put(record).await?;
                    self.clear_snapshot(&id);
                    warn!(
                        "Push of {} {} exhausted {} attempts, flagged as conflict",
                        E::KIND,
                        id,
                        attempts
                    );
                    self.events
                        .emit(&DomainEvent::ConflictFlagged { kind: E::KIND, id });
                    Ok(PushStatus::Conflicted)
                }
            }
            RetryClass::Permanent | RetryClass::ReauthRequired => {
                self.rollback(&id, &err).await?;
                Ok(PushStatus::RolledBack)
            }
        }
    }

    async fn rollback(&self, id: &str, err: &RemoteError) -> Result<()> {
        let snapshot = self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);

        match snapshot {
            Some(Snapshot::Created) => {
                self.store.remove(id).await?;
            }
            Some(Snapshot::Mutated(prior)) => {
                self.store.put(prior).await?;
            }
            None => {
                // No pre-image survives a restart; keep the failure visible
                // instead of guessing at one.
                if let Some(mut record) = self.store.get(id).await? {
                    record.set_sync_state(SyncState::Conflict);
                    record.set_next_push_at(None);
                    self.store.put(record).await?;
                }
                self.events.emit(&DomainEvent::ConflictFlagged {
                    kind: E::KIND,
                    id: id.to_string(),
                });
                return Ok(());
            }
        }

        warn!(
            "Rolled back {} {} after non-retryable failure: {}",
            E::KIND,
            id,
            err
        );
        self.events.emit(&DomainEvent::SyncRolledBack {
            kind: E::KIND,
            id: id.to_string(),
            reason: err.to_string(),
        });
        Ok(())
    }

    async fn pull_remote(&self, owner_id: &str, filter: &EntityFilter) -> Result<usize> {
        let mut page = RemotePage::first(self.settings.default_page_size.max(1));
        let mut applied = 0usize;
        for _ in 0..MAX_PULL_PAGES {
            let batch = self
                .remote
                .list_by_owner(owner_id, filter, page)
                .await
                .map_err(Error::from)?;
            for record in batch.items {
                applied += usize::from(self.reconcile_record(record).await?);
            }
            match batch.next_page {
                Some(next) => page.page = next,
                None => return Ok(applied),
            }
        }
        warn!(
            "Remote {} listing exceeded {} pages, stopping early",
            E::KIND,
            MAX_PULL_PAGES
        );
        Ok(applied)
    }

    /// Reconcile one remote record into the local store.
    ///
    /// Unknown remote records are adopted as `Clean`. Known ones are
    /// overwritten only when last-writer-wins says so; any local pending
    /// intent survives and resolves through the push queue.
    async fn reconcile_record(&self, mut incoming: E) -> Result<bool> {
        let Some(remote_id) = incoming.remote_id().map(str::to_string) else {
            return Ok(false);
        };
        incoming.set_sync_state(SyncState::Clean);
        incoming.set_push_attempts(0);
        incoming.set_next_push_at(None);

        match self.store.get_by_remote_id(&remote_id).await? {
            None => {
                let _guard = self.record_guard(incoming.id()).await;
                self.store.put(incoming).await?;
                Ok(true)
            }
            Some(local) => {
                let Some(remote_ts) = incoming.updated_at_remote() else {
                    return Ok(false);
                };
                if !remote_wins_lww(&local, remote_ts) {
                    return Ok(false);
                }
                let local_id = local.id().to_string();
                let _guard = self.record_guard(&local_id).await;
                // Re-check under the lock; a local write may have landed.
                let Some(current) = self.store.get(&local_id).await? else {
                    return Ok(false);
                };
                if !remote_wins_lww(&current, remote_ts) {
                    return Ok(false);
                }
                incoming.set_id(local_id);
                self.store.put(incoming).await?;
                Ok(true)
            }
        }
    }

    async fn read_local_degraded(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        order: SortOrder,
    ) -> Vec<E> {
        match self.store.list_effective(owner_id, filter, order).await {
            Ok(items) => items,
            Err(err) => {
                warn!("Local {} read degraded to empty: {}", E::KIND, err);
                Vec::new()
            }
        }
    }

    fn should_augment(&self, owner_id: &str, opts: &ReadOptions) -> bool {
        if !opts.augment || !self.network.is_online() {
            return false;
        }
        if opts.force_refresh {
            return true;
        }
        let refreshed = self
            .refreshed_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(owner_id)
            .copied();
        refreshed.map_or(true, |at| at.elapsed() >= self.settings.read_refresh_interval)
    }

    async fn after_successful_pull(&self, owner_id: &str) {
        self.refreshed_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(owner_id.to_string(), Instant::now());
        if let Err(err) = self.evict_stale(owner_id).await {
            warn!("Eviction after refresh failed: {}", err);
        }
    }

    fn spawn_push(&self, id: String) {
        if !self.network.is_online() {
            debug!(
                "{} {} queued for push until connectivity returns",
                E::KIND,
                id
            );
            return;
        }
        let Some(repository) = self.self_ref.get().and_then(Weak::upgrade) else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = repository.push_record(&id).await {
                warn!("Background push of {} failed: {}", id, err);
            }
        });
    }

    fn remember_snapshot(&self, record: &E) {
        let mut snapshots = self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        snapshots.entry(record.id().to_string()).or_insert_with(|| {
            if record.sync_state() == SyncState::PendingCreate && record.remote_id().is_none() {
                Snapshot::Created
            } else {
                Snapshot::Mutated(record.clone())
            }
        });
    }

    fn clear_snapshot(&self, id: &str) {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    async fn record_guard(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .record_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                locks
                    .entry(id.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::{CreditCard, CreditCardPatch, NewCreditCard};
    use crate::store::MemoryStore;
    use crate::testsupport::{card, MockRemote};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Harness {
        repository: Arc<LocalFirstRepository<CreditCard>>,
        store: Arc<MemoryStore<CreditCard>>,
        remote: Arc<MockRemote<CreditCard>>,
        network: Arc<NetworkMonitor>,
        events: Arc<EventBus>,
    }

    fn harness(initial: NetworkStatus) -> Harness {
        harness_with(initial, SyncSettings {
            backoff_base: Duration::ZERO,
            read_refresh_interval: Duration::ZERO,
            ..SyncSettings::default()
        })
    }

    fn harness_with(initial: NetworkStatus, settings: SyncSettings) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let remote = MockRemote::new();
        let network = Arc::new(NetworkMonitor::new(initial));
        let events = Arc::new(EventBus::new());
        let repository = LocalFirstRepository::new(
            Arc::clone(&store) as Arc<dyn EntityStore<CreditCard>>,
            Arc::clone(&remote) as Arc<dyn RemoteApi<CreditCard>>,
            Arc::clone(&network),
            Arc::clone(&events),
            settings,
        );
        Harness {
            repository,
            store,
            remote,
            network,
            events,
        }
    }

    fn draft(name: &str) -> NewCreditCard {
        NewCreditCard {
            name: name.to_string(),
            issuer: None,
            currency: "USD".to_string(),
            credit_limit: dec!(1000),
            balance: dec!(200),
        }
    }

    #[tokio::test]
    async fn offline_create_is_local_only_and_immediately_visible() {
        let h = harness(NetworkStatus::Offline);

        let created = h
            .repository
            .create("owner-1", draft("Card A"))
            .await
            .unwrap();

        assert_eq!(created.sync_state, SyncState::PendingCreate);
        assert!(created.remote_id.is_none());
        assert_eq!(h.remote.call_count(), 0);

        let all = h
            .repository
            .find_all("owner-1", &EntityFilter::none())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Card A");
    }

    #[tokio::test]
    async fn offline_reads_never_touch_the_remote() {
        let h = harness(NetworkStatus::Offline);
        h.remote
            .fail_always(RemoteError::Network("unreachable".to_string()));

        let all = h
            .repository
            .find_all("owner-1", &EntityFilter::none())
            .await
            .unwrap();
        assert!(all.is_empty());
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn local_only_reads_skip_the_remote_even_when_online() {
        let h = harness(NetworkStatus::Online);
        h.store.put(card("card-1", "owner-1")).await.unwrap();

        let all = h
            .repository
            .find_all_with("owner-1", &EntityFilter::none(), ReadOptions::local_only())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(h.remote.call_count(), 0);
        assert!(h.repository.get("card-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remote_summary_falls_back_to_the_local_recompute() {
        let h = harness(NetworkStatus::Online);
        let mut existing = card("card-a", "owner-1");
        existing.sync_state = SyncState::Clean;
        h.store.put(existing).await.unwrap();
        h.remote
            .fail_always(RemoteError::Network("down".to_string()));

        let summary = h.repository.remote_summary("owner-1").await.unwrap();
        assert_eq!(summary.card_count, 1);
    }

    #[tokio::test]
    async fn reads_degrade_to_cache_when_the_remote_fails() {
        let h = harness(NetworkStatus::Online);
        h.store.put(card("card-1", "owner-1")).await.unwrap();
        h.remote
            .fail_always(RemoteError::Network("flaky".to_string()));

        let all = h
            .repository
            .find_all("owner-1", &EntityFilter::none())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn reconnect_flush_confirms_pending_create() {
        let h = harness(NetworkStatus::Offline);

        let sync_completed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sync_completed);
        let _sub = h.events.subscribe(move |event| {
            if matches!(event, DomainEvent::SyncCompleted { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let created = h
            .repository
            .create("owner-1", draft("Card A"))
            .await
            .unwrap();

        h.network.set_status(NetworkStatus::Online);
        let report = h.repository.flush_pending().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.confirmed, 1);

        let synced = h.store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(synced.sync_state, SyncState::Clean);
        assert_eq!(synced.remote_id.as_deref(), Some("rc_1"));
        assert_eq!(sync_completed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_update_failure_rolls_back_to_pre_mutation_state() {
        let h = harness(NetworkStatus::Offline);

        let mut existing = card("card-1", "owner-1");
        existing.sync_state = SyncState::Clean;
        existing.remote_id = Some("rc_9".to_string());
        existing.balance = dec!(200);
        h.store.put(existing).await.unwrap();

        h.repository
            .update(
                "card-1",
                CreditCardPatch {
                    balance: Some(dec!(999)),
                    ..CreditCardPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            h.store.get("card-1").await.unwrap().unwrap().balance,
            dec!(999)
        );

        h.remote
            .fail_always(RemoteError::Validation("balance rejected".to_string()));
        h.network.set_status(NetworkStatus::Online);
        let report = h.repository.flush_pending().await.unwrap();
        assert_eq!(report.rolled_back, 1);

        let restored = h.store.get("card-1").await.unwrap().unwrap();
        assert_eq!(restored.balance, dec!(200));
        assert_eq!(restored.sync_state, SyncState::Clean);

        let all = h
            .repository
            .find_all("owner-1", &EntityFilter::none())
            .await
            .unwrap();
        assert_eq!(all[0].balance, dec!(200));
    }

    #[tokio::test]
    async fn failed_create_rollback_removes_the_record() {
        let h = harness(NetworkStatus::Offline);
        let created = h
            .repository
            .create("owner-1", draft("Card A"))
            .await
            .unwrap();

        h.remote
            .fail_always(RemoteError::Validation("limit rejected".to_string()));
        h.network.set_status(NetworkStatus::Online);
        h.repository.flush_pending().await.unwrap();

        assert!(h.store.get(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_rollback_on_auth_error_restores_visibility() {
        let h = harness(NetworkStatus::Offline);

        let mut existing = card("card-1", "owner-1");
        existing.sync_state = SyncState::Clean;
        existing.remote_id = Some("rc_9".to_string());
        h.store.put(existing).await.unwrap();

        h.repository.delete("card-1").await.unwrap();
        let hidden = h
            .repository
            .find_all("owner-1", &EntityFilter::none())
            .await
            .unwrap();
        assert!(hidden.is_empty());

        h.remote
            .fail_always(RemoteError::Auth("token expired".to_string()));
        h.network.set_status(NetworkStatus::Online);
        h.repository.flush_pending().await.unwrap();

        let visible = h
            .repository
            .find_all("owner-1", &EntityFilter::none())
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].sync_state, SyncState::Clean);
    }

    #[tokio::test]
    async fn a_transient_failure_reschedules_and_the_next_flush_succeeds() {
        let h = harness(NetworkStatus::Offline);
        let created = h
            .repository
            .create("owner-1", draft("Card A"))
            .await
            .unwrap();

        h.remote.fail_next(RemoteError::Network("blip".to_string()));
        h.network.set_status(NetworkStatus::Online);

        let first = h.repository.flush_pending().await.unwrap();
        assert_eq!(first.rescheduled, 1);
        let still_pending = h.store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(still_pending.sync_state, SyncState::PendingCreate);
        assert_eq!(still_pending.push_attempts, 1);

        // Zero base backoff keeps the retry due almost immediately.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = h.repository.flush_pending().await.unwrap();
        assert_eq!(second.confirmed, 1);
        let synced = h.store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(synced.sync_state, SyncState::Clean);
    }

    #[tokio::test]
    async fn exhausted_retries_flag_a_conflict_instead_of_dropping_the_record() {
        let h = harness_with(
            NetworkStatus::Online,
            SyncSettings {
                max_push_attempts: 2,
                backoff_base: Duration::ZERO,
                read_refresh_interval: Duration::ZERO,
                ..SyncSettings::default()
            },
        );
        h.remote
            .fail_always(RemoteError::Network("still down".to_string()));

        let conflicts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&conflicts);
        let _sub = h.events.subscribe(move |event| {
            if matches!(event, DomainEvent::ConflictFlagged { .. }) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut pending = card("card-1", "owner-1");
        pending.sync_state = SyncState::PendingUpdate;
        pending.remote_id = Some("rc_9".to_string());
        h.store.put(pending).await.unwrap();

        assert_eq!(
            h.repository.push_record("card-1").await.unwrap(),
            PushStatus::Rescheduled
        );
        assert_eq!(
            h.repository.push_record("card-1").await.unwrap(),
            PushStatus::Conflicted
        );

        let flagged = h.store.get("card-1").await.unwrap().unwrap();
        assert_eq!(flagged.sync_state, SyncState::Conflict);
        assert_eq!(conflicts.load(Ordering::SeqCst), 1);

        // Conflicts are out of the push queue until resolved.
        let report = h.repository.flush_pending().await.unwrap();
        assert_eq!(report.attempted, 0);
    }

    #[tokio::test]
    async fn keep_local_resolution_requeues_the_push() {
        let h = harness(NetworkStatus::Online);
        let mut conflicted = card("card-1", "owner-1");
        conflicted.sync_state = SyncState::Conflict;
        conflicted.remote_id = Some("rc_9".to_string());
        h.store.put(conflicted).await.unwrap();

        let resolved = h
            .repository
            .resolve_conflict("card-1", ConflictResolution::KeepLocal)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.sync_state, SyncState::PendingUpdate);
    }

    #[tokio::test]
    async fn keep_remote_resolution_adopts_the_backend_copy() {
        let h = harness(NetworkStatus::Online);
        let mut conflicted = card("card-1", "owner-1");
        conflicted.sync_state = SyncState::Conflict;
        conflicted.remote_id = Some("rc_9".to_string());
        conflicted.balance = dec!(999);
        h.store.put(conflicted).await.unwrap();

        let mut backend_copy = card("any", "owner-1");
        backend_copy.remote_id = Some("rc_9".to_string());
        backend_copy.sync_state = SyncState::Clean;
        backend_copy.balance = dec!(300);
        h.remote.set_listing(vec![backend_copy]);

        let resolved = h
            .repository
            .resolve_conflict("card-1", ConflictResolution::KeepRemote)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.id, "card-1");
        assert_eq!(resolved.balance, dec!(300));
        assert_eq!(resolved.sync_state, SyncState::Clean);
    }

    #[tokio::test]
    async fn reconcile_respects_pending_local_intent() {
        let h = harness(NetworkStatus::Online);

        let mut local = card("card-1", "owner-1");
        local.sync_state = SyncState::PendingUpdate;
        local.remote_id = Some("rc_1".to_string());
        local.balance = dec!(500);
        local.updated_at_remote = Some(Utc::now() - chrono::Duration::hours(1));
        h.store.put(local).await.unwrap();

        let mut remote_copy = card("rc_1", "owner-1");
        remote_copy.remote_id = Some("rc_1".to_string());
        remote_copy.sync_state = SyncState::Clean;
        remote_copy.balance = dec!(300);
        remote_copy.updated_at_remote = Some(Utc::now());
        h.remote.set_listing(vec![remote_copy]);

        let all = h
            .repository
            .find_all("owner-1", &EntityFilter::none())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].balance, dec!(500));
        assert_eq!(all[0].sync_state, SyncState::PendingUpdate);
    }

    #[tokio::test]
    async fn reconcile_overwrites_stale_clean_records_and_adopts_new_ones() {
        let h = harness(NetworkStatus::Online);

        let mut stale = card("card-1", "owner-1");
        stale.sync_state = SyncState::Clean;
        stale.remote_id = Some("rc_1".to_string());
        stale.balance = dec!(100);
        stale.updated_at_remote = Some(Utc::now() - chrono::Duration::hours(1));
        h.store.put(stale).await.unwrap();

        let mut newer = card("rc_1", "owner-1");
        newer.remote_id = Some("rc_1".to_string());
        newer.sync_state = SyncState::Clean;
        newer.balance = dec!(150);
        newer.updated_at_remote = Some(Utc::now());

        let mut unseen = card("rc_2", "owner-1");
        unseen.remote_id = Some("rc_2".to_string());
        unseen.sync_state = SyncState::Clean;
        unseen.updated_at_remote = Some(Utc::now());

        h.remote.set_listing(vec![newer, unseen]);

        let all = h
            .repository
            .find_all("owner-1", &EntityFilter::none())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        let updated = all.iter().find(|c| c.id == "card-1").unwrap();
        assert_eq!(updated.balance, dec!(150));
        assert!(all.iter().any(|c| c.remote_id.as_deref() == Some("rc_2")));
    }

    #[tokio::test]
    async fn fresh_reads_skip_the_remote_within_the_refresh_interval() {
        let h = harness_with(
            NetworkStatus::Online,
            SyncSettings {
                read_refresh_interval: Duration::from_secs(3600),
                ..SyncSettings::default()
            },
        );

        h.repository
            .find_all("owner-1", &EntityFilter::none())
            .await
            .unwrap();
        let after_first = h.remote.call_count();
        assert!(after_first >= 1);

        h.repository
            .find_all("owner-1", &EntityFilter::none())
            .await
            .unwrap();
        assert_eq!(h.remote.call_count(), after_first);
    }

    #[tokio::test]
    async fn second_update_queues_behind_the_first() {
        let h = harness(NetworkStatus::Offline);
        let mut existing = card("card-1", "owner-1");
        existing.sync_state = SyncState::Clean;
        existing.remote_id = Some("rc_1".to_string());
        h.store.put(existing).await.unwrap();

        let repo_a = Arc::clone(&h.repository);
        let repo_b = Arc::clone(&h.repository);
        let (a, b) = tokio::join!(
            repo_a.update(
                "card-1",
                CreditCardPatch {
                    balance: Some(dec!(10)),
                    ..CreditCardPatch::default()
                },
            ),
            repo_b.update(
                "card-1",
                CreditCardPatch {
                    credit_limit: Some(dec!(5000)),
                    ..CreditCardPatch::default()
                },
            ),
        );
        a.unwrap();
        b.unwrap();

        // Both patches land; neither is lost to interleaving.
        let merged = h.store.get("card-1").await.unwrap().unwrap();
        assert_eq!(merged.balance, dec!(10));
        assert_eq!(merged.credit_limit, dec!(5000));
    }

    #[tokio::test]
    async fn updating_a_pending_delete_record_is_rejected() {
        let h = harness(NetworkStatus::Offline);
        let mut existing = card("card-1", "owner-1");
        existing.sync_state = SyncState::Clean;
        existing.remote_id = Some("rc_1".to_string());
        h.store.put(existing).await.unwrap();
        h.repository.delete("card-1").await.unwrap();

        let result = h
            .repository
            .update("card-1", CreditCardPatch::default())
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn summary_is_recomputed_from_the_effective_set() {
        let h = harness(NetworkStatus::Offline);
        let mut a = card("card-a", "owner-1");
        a.sync_state = SyncState::Clean;
        a.remote_id = Some("rc_1".to_string());
        h.store.put(a).await.unwrap();
        let mut b = card("card-b", "owner-1");
        b.sync_state = SyncState::Clean;
        b.remote_id = Some("rc_2".to_string());
        h.store.put(b).await.unwrap();

        let before = h.repository.summary("owner-1").await.unwrap();
        assert_eq!(before.card_count, 2);

        h.repository.delete("card-b").await.unwrap();
        let after = h.repository.summary("owner-1").await.unwrap();
        assert_eq!(after.card_count, 1);
    }
}
