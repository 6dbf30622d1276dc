//! Cursor-based and page-number pagination over repository range scans.
//!
//! A cursor is an opaque base64(JSON) token binding a scan position to a
//! fingerprint of the filter and sort order it was issued for; replaying it
//! against a different query is rejected rather than silently misread.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::{Error, Result};
use crate::repository::{LocalFirstRepository, ReadOptions};
use crate::store::{EntityFilter, PageRequest, ScanPosition, SortOrder};
use crate::sync::Syncable;

const CURSOR_VERSION: u8 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CursorToken {
    v: u8,
    fingerprint: String,
    position: ScanPosition,
}

fn query_fingerprint(filter: &EntityFilter, order: SortOrder) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(filter).unwrap_or_default());
    hasher.update(serde_json::to_vec(&order).unwrap_or_default());
    hasher
        .finalize()
        .iter()
        .take(16)
        .map(|byte| format!("{:02x}", byte))
        .collect()
}

/// Encode a scan position as an opaque cursor bound to `(filter, order)`.
pub fn encode_cursor(filter: &EntityFilter, order: SortOrder, position: &ScanPosition) -> String {
    let token = CursorToken {
        v: CURSOR_VERSION,
        fingerprint: query_fingerprint(filter, order),
        position: position.clone(),
    };
    BASE64_STANDARD.encode(serde_json::to_vec(&token).unwrap_or_default())
}

/// Decode a cursor, rejecting tokens issued for a different filter or order.
pub fn decode_cursor(
    cursor: &str,
    filter: &EntityFilter,
    order: SortOrder,
) -> Result<ScanPosition> {
    let bytes = BASE64_STANDARD
        .decode(cursor)
        .map_err(|_| Error::validation("malformed pagination cursor"))?;
    let token: CursorToken = serde_json::from_slice(&bytes)
        .map_err(|_| Error::validation("malformed pagination cursor"))?;
    if token.v != CURSOR_VERSION {
        return Err(Error::validation("unsupported pagination cursor version"));
    }
    if token.fingerprint != query_fingerprint(filter, order) {
        return Err(Error::validation(
            "pagination cursor does not match the active filter",
        ));
    }
    Ok(token.position)
}

/// One page of a cursor-driven fetch.
#[derive(Debug, Clone)]
pub struct CursorPage<E> {
    pub items: Vec<E>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// One-shot cursor fetch: decode, scan, re-encode.
pub async fn fetch_cursor_page<E: Syncable>(
    repository: &LocalFirstRepository<E>,
    owner_id: &str,
    filter: &EntityFilter,
    order: SortOrder,
    limit: u32,
    cursor: Option<&str>,
) -> Result<CursorPage<E>> {
    let position = match cursor {
        Some(cursor) => decode_cursor(cursor, filter, order)?,
        None => ScanPosition::Start,
    };
    let page = repository
        .find_page(
            owner_id,
            filter,
            order,
            &PageRequest { limit, position },
            ReadOptions::default(),
        )
        .await?;
    let next_cursor = page
        .next
        .as_ref()
        .map(|next| encode_cursor(filter, order, next));
    Ok(CursorPage {
        items: page.items,
        next_cursor,
        has_more: page.has_more,
    })
}

/// Outcome of a `load_more` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was fetched and appended.
    Loaded { appended: usize, has_more: bool },
    /// A fetch was already in flight; this call was a no-op.
    Suppressed,
    /// The scan is exhausted.
    End,
    /// The list was reset while the fetch was in flight; the late result
    /// was discarded on arrival.
    Superseded,
}

struct PagerState<E> {
    items: Vec<E>,
    next: Option<ScanPosition>,
    started: bool,
    has_more: bool,
    in_flight: bool,
    epoch: u64,
}

impl<E> PagerState<E> {
    fn fresh(epoch: u64) -> Self {
        Self {
            items: Vec::new(),
            next: None,
            started: false,
            has_more: true,
            in_flight: false,
            epoch,
        }
    }
}

/// Stateful infinite-scroll accumulator over a fixed `(filter, order)`.
///
/// `load_more` appends to a growing list with an at-most-one-fetch-in-flight
/// guarantee; `reset` discards the list immediately and any in-flight fetch
/// on arrival (epoch guard).
pub struct CursorPager<E: Syncable> {
    repository: Arc<LocalFirstRepository<E>>,
    owner_id: String,
    filter: EntityFilter,
    order: SortOrder,
    page_size: u32,
    state: AsyncMutex<PagerState<E>>,
}

impl<E: Syncable> CursorPager<E> {
    pub fn new(
        repository: Arc<LocalFirstRepository<E>>,
        owner_id: impl Into<String>,
        filter: EntityFilter,
        order: SortOrder,
        page_size: u32,
    ) -> Self {
        Self {
            repository,
            owner_id: owner_id.into(),
            filter,
            order,
            page_size: page_size.max(1),
            state: AsyncMutex::new(PagerState::fresh(0)),
        }
    }

    /// Snapshot of the materialized list.
    pub async fn items(&self) -> Vec<E> {
        self.state.lock().await.items.clone()
    }

    pub async fn has_more(&self) -> bool {
        self.state.lock().await.has_more
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.in_flight
    }

    /// Fetch and append the next page. While a fetch is in flight any
    /// further call observes `Suppressed` — exactly one underlying fetch is
    /// issued.
    pub async fn load_more(&self) -> Result<LoadOutcome> {
        let (epoch, position) = {
            let mut state = self.state.lock().await;
            if state.in_flight {
                return Ok(LoadOutcome::Suppressed);
            }
            if state.started && !state.has_more {
                return Ok(LoadOutcome::End);
            }
            let position = state.next.clone().unwrap_or(ScanPosition::Start);
            state.in_flight = true;
            (state.epoch, position)
        };

        let fetched = self
            .repository
            .find_page(
                &self.owner_id,
                &self.filter,
                self.order,
                &PageRequest {
                    limit: self.page_size,
                    position,
                },
                ReadOptions::default(),
            )
            .await;

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            // A reset superseded this fetch; drop the late result.
            return Ok(LoadOutcome::Superseded);
        }
        state.in_flight = false;
        let page = fetched?;
        let appended = page.items.len();
        state.items.extend(page.items);
        state.next = page.next;
        state.has_more = page.has_more;
        state.started = true;
        Ok(LoadOutcome::Loaded {
            appended,
            has_more: state.has_more,
        })
    }

    /// Clear the list and reload page one.
    pub async fn refresh(&self) -> Result<LoadOutcome> {
        self.reset().await;
        self.load_more().await
    }

    /// Clear list and cursor immediately. Any in-flight fetch is logically
    /// cancelled: its late response is discarded on arrival.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let epoch = state.epoch + 1;
        *state = PagerState::fresh(epoch);
    }

    /// Prefetch trigger: the consumer signals proximity to the end of the
    /// materialized list. A no-op while loading or exhausted.
    pub async fn on_near_end(&self) -> Result<LoadOutcome> {
        self.load_more().await
    }
}

/// One numbered page. `has_more` is authoritative when it disagrees with a
/// page count derived from `total`.
#[derive(Debug, Clone)]
pub struct NumberedPage<E> {
    pub items: Vec<E>,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
    pub total: Option<i64>,
    pub has_more: bool,
}

impl<E> NumberedPage<E> {
    /// Derived page count; approximate when the backend total is.
    pub fn page_count(&self) -> Option<u32> {
        self.total.map(|total| {
            let size = i64::from(self.page_size.max(1));
            ((total + size - 1) / size).max(0) as u32
        })
    }
}

/// Stateless page-number pager; every call recomputes from `(page, size)`.
pub struct PagePager<E: Syncable> {
    repository: Arc<LocalFirstRepository<E>>,
    owner_id: String,
    filter: EntityFilter,
    page_size: u32,
}

impl<E: Syncable> PagePager<E> {
    pub fn new(
        repository: Arc<LocalFirstRepository<E>>,
        owner_id: impl Into<String>,
        filter: EntityFilter,
        page_size: u32,
    ) -> Self {
        Self {
            repository,
            owner_id: owner_id.into(),
            filter,
            page_size: page_size.max(1),
        }
    }

    pub async fn fetch_page(&self, page: u32) -> Result<NumberedPage<E>> {
        let page = page.max(1);
        let scanned = self
            .repository
            .find_by_range_paginated(&self.owner_id, &self.filter, page, self.page_size)
            .await?;
        Ok(NumberedPage {
            items: scanned.items,
            page,
            page_size: self.page_size,
            total: scanned.total,
            has_more: scanned.has_more,
        })
    }

    pub async fn next_page(&self, current: &NumberedPage<E>) -> Result<NumberedPage<E>> {
        self.fetch_page(current.page + 1).await
    }

    pub async fn previous_page(&self, current: &NumberedPage<E>) -> Result<NumberedPage<E>> {
        self.fetch_page(current.page.saturating_sub(1).max(1)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::CreditCard;
    use crate::errors::Result as CoreResult;
    use crate::events::EventBus;
    use crate::network::{NetworkMonitor, NetworkStatus};
    use crate::remote::RemoteApi;
    use crate::settings::SyncSettings;
    use crate::store::{
        DeleteOutcome, EntityStore, MemoryStore, ScanPage, SortDirection, SortField,
    };
    use crate::sync::SyncState;
    use crate::testsupport::{transaction_on, MockRemote};
    use crate::transactions::Transaction;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Store wrapper that counts queries and can slow them down, to open an
    /// observable in-flight window.
    struct SlowStore {
        inner: MemoryStore<Transaction>,
        query_delay: Duration,
        queries: AtomicUsize,
    }

    #[async_trait]
    impl EntityStore<Transaction> for SlowStore {
        async fn get(&self, id: &str) -> CoreResult<Option<Transaction>> {
            self.inner.get(id).await
        }

        async fn get_by_remote_id(&self, remote_id: &str) -> CoreResult<Option<Transaction>> {
            self.inner.get_by_remote_id(remote_id).await
        }

        async fn list_effective(
            &self,
            owner_id: &str,
            filter: &EntityFilter,
            order: SortOrder,
        ) -> CoreResult<Vec<Transaction>> {
            self.inner.list_effective(owner_id, filter, order).await
        }

        async fn query(
            &self,
            owner_id: &str,
            filter: &EntityFilter,
            order: SortOrder,
            page: &PageRequest,
        ) -> CoreResult<ScanPage<Transaction>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.query_delay).await;
            self.inner.query(owner_id, filter, order, page).await
        }

        async fn put(&self, entity: Transaction) -> CoreResult<Transaction> {
            self.inner.put(entity).await
        }

        async fn delete(&self, id: &str, now: DateTime<Utc>) -> CoreResult<DeleteOutcome> {
            self.inner.delete(id, now).await
        }

        async fn remove(&self, id: &str) -> CoreResult<bool> {
            self.inner.remove(id).await
        }

        async fn list_pending_push(
            &self,
            due_before: DateTime<Utc>,
            limit: u32,
        ) -> CoreResult<Vec<Transaction>> {
            self.inner.list_pending_push(due_before, limit).await
        }

        async fn summary(
            &self,
            owner_id: &str,
        ) -> CoreResult<<Transaction as Syncable>::Summary> {
            self.inner.summary(owner_id).await
        }

        async fn prune_clean_before(
            &self,
            owner_id: &str,
            cutoff: DateTime<Utc>,
        ) -> CoreResult<usize> {
            self.inner.prune_clean_before(owner_id, cutoff).await
        }
    }

    async fn seeded_repository(
        count: usize,
        query_delay: Duration,
    ) -> (Arc<LocalFirstRepository<Transaction>>, Arc<SlowStore>) {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            query_delay,
            queries: AtomicUsize::new(0),
        });
        for i in 0..count {
            let day = (i % 28) + 1;
            let mut record =
                transaction_on(&format!("tx-{:02}", i), "owner-1", &format!("2026-01-{:02}", day));
            record.sync_state = SyncState::Clean;
            record.remote_id = Some(format!("rc_{}", i));
            store.inner.put(record).await.unwrap();
        }
        let repository = LocalFirstRepository::new(
            Arc::clone(&store) as Arc<dyn EntityStore<Transaction>>,
            MockRemote::new() as Arc<dyn RemoteApi<Transaction>>,
            Arc::new(NetworkMonitor::new(NetworkStatus::Offline)),
            Arc::new(EventBus::new()),
            SyncSettings::default(),
        );
        (repository, store)
    }

    #[tokio::test]
    async fn successive_pages_cover_every_record_exactly_once() {
        let (repository, _store) = seeded_repository(45, Duration::ZERO).await;
        let pager = CursorPager::new(
            repository,
            "owner-1",
            EntityFilter::none(),
            SortOrder::date_desc(),
            20,
        );

        let mut lengths = Vec::new();
        loop {
            match pager.load_more().await.unwrap() {
                LoadOutcome::Loaded { appended, has_more } => {
                    lengths.push(appended);
                    if !has_more {
                        break;
                    }
                }
                outcome => panic!("unexpected outcome {:?}", outcome),
            }
        }

        assert_eq!(lengths, vec![20, 20, 5]);
        let items = pager.items().await;
        let mut ids: Vec<String> = items.iter().map(|t| t.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 45);
        assert_eq!(pager.load_more().await.unwrap(), LoadOutcome::End);
    }

    #[tokio::test]
    async fn concurrent_load_more_issues_exactly_one_fetch() {
        let (repository, store) = seeded_repository(30, Duration::from_millis(50)).await;
        let pager = Arc::new(CursorPager::new(
            repository,
            "owner-1",
            EntityFilter::none(),
            SortOrder::date_desc(),
            20,
        ));

        let first = Arc::clone(&pager);
        let second = Arc::clone(&pager);
        let (a, b) = tokio::join!(
            tokio::spawn(async move { first.load_more().await.unwrap() }),
            async move {
                // Land inside the first call's fetch window.
                tokio::time::sleep(Duration::from_millis(10)).await;
                second.load_more().await.unwrap()
            }
        );

        let outcomes = [a.unwrap(), b];
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, LoadOutcome::Loaded { .. })));
        assert!(outcomes.iter().any(|o| *o == LoadOutcome::Suppressed));
        assert_eq!(store.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reset_discards_a_late_fetch() {
        let (repository, _store) = seeded_repository(30, Duration::from_millis(50)).await;
        let pager = Arc::new(CursorPager::new(
            repository,
            "owner-1",
            EntityFilter::none(),
            SortOrder::date_desc(),
            20,
        ));

        let loading = Arc::clone(&pager);
        let in_flight = tokio::spawn(async move { loading.load_more().await.unwrap() });
        tokio::time::sleep(Duration::from_millis(10)).await;
        pager.reset().await;

        assert_eq!(in_flight.await.unwrap(), LoadOutcome::Superseded);
        assert!(pager.items().await.is_empty());

        // The pager is immediately usable after the reset.
        let outcome = pager.load_more().await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { appended: 20, .. }));
    }

    #[tokio::test]
    async fn refresh_clears_the_list_and_reloads_page_one() {
        let (repository, _store) = seeded_repository(25, Duration::ZERO).await;
        let pager = CursorPager::new(
            repository,
            "owner-1",
            EntityFilter::none(),
            SortOrder::date_desc(),
            20,
        );

        pager.load_more().await.unwrap();
        pager.load_more().await.unwrap();
        assert_eq!(pager.items().await.len(), 25);

        let outcome = pager.refresh().await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { appended: 20, .. }));
        assert_eq!(pager.items().await.len(), 20);
    }

    #[tokio::test]
    async fn near_end_prefetch_loads_until_exhausted() {
        let (repository, _store) = seeded_repository(25, Duration::ZERO).await;
        let pager = CursorPager::new(
            repository,
            "owner-1",
            EntityFilter::none(),
            SortOrder::date_desc(),
            20,
        );

        assert!(matches!(
            pager.on_near_end().await.unwrap(),
            LoadOutcome::Loaded { appended: 20, .. }
        ));
        assert!(matches!(
            pager.on_near_end().await.unwrap(),
            LoadOutcome::Loaded { appended: 5, .. }
        ));
        assert_eq!(pager.on_near_end().await.unwrap(), LoadOutcome::End);
        assert!(!pager.has_more().await);
        assert!(!pager.is_loading().await);
    }

    #[tokio::test]
    async fn cursor_is_rejected_against_a_different_filter() {
        let order = SortOrder::date_desc();
        let issued_for = EntityFilter::none();
        let cursor = encode_cursor(
            &issued_for,
            order,
            &ScanPosition::After {
                sort_key: "2026-01-10".to_string(),
                id: "tx-07".to_string(),
            },
        );

        let replayed_against = EntityFilter {
            card_id: Some("card-1".to_string()),
            ..EntityFilter::default()
        };
        assert!(decode_cursor(&cursor, &issued_for, order).is_ok());
        assert!(matches!(
            decode_cursor(&cursor, &replayed_against, order),
            Err(Error::Validation(_))
        ));

        let other_order = SortOrder {
            field: SortField::Date,
            direction: SortDirection::Asc,
        };
        assert!(decode_cursor(&cursor, &issued_for, other_order).is_err());
        assert!(decode_cursor("not-base64!", &issued_for, order).is_err());
    }

    #[tokio::test]
    async fn one_shot_cursor_fetch_round_trips() {
        let (repository, _store) = seeded_repository(25, Duration::ZERO).await;
        let filter = EntityFilter::none();
        let order = SortOrder::date_desc();

        let first = fetch_cursor_page(&repository, "owner-1", &filter, order, 20, None)
            .await
            .unwrap();
        assert_eq!(first.items.len(), 20);
        assert!(first.has_more);
        let cursor = first.next_cursor.expect("cursor for page two");

        let second =
            fetch_cursor_page(&repository, "owner-1", &filter, order, 20, Some(&cursor))
                .await
                .unwrap();
        assert_eq!(second.items.len(), 5);
        assert!(!second.has_more);
        assert!(second.next_cursor.is_none());
    }

    #[tokio::test]
    async fn numbered_pages_report_totals_and_bounds() {
        let (repository, _store) = seeded_repository(45, Duration::ZERO).await;
        let pager = PagePager::new(repository, "owner-1", EntityFilter::none(), 20);

        let first = pager.fetch_page(1).await.unwrap();
        assert_eq!(first.items.len(), 20);
        assert_eq!(first.total, Some(45));
        assert_eq!(first.page_count(), Some(3));
        assert!(first.has_more);

        let last = pager.fetch_page(3).await.unwrap();
        assert_eq!(last.items.len(), 5);
        assert!(!last.has_more);

        // Previous from page one clamps instead of underflowing.
        let clamped = pager.previous_page(&first).await.unwrap();
        assert_eq!(clamped.page, 1);
    }
}
