//! In-memory store backend.
//!
//! Shares query semantics with the SQLite backend through
//! `Syncable::matches` / `Syncable::sort_key`, which keeps the two from
//! drifting apart and makes it the reference implementation for policy
//! tests.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::store::{
    DeleteOutcome, EntityFilter, EntityStore, PageRequest, ScanPage, ScanPosition, SortDirection,
    SortOrder,
};
use crate::sync::{SyncState, Syncable};

#[derive(Default)]
pub struct MemoryStore<E: Syncable> {
    records: Mutex<HashMap<String, E>>,
}

impl<E: Syncable> MemoryStore<E> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    fn with_records<T>(&self, f: impl FnOnce(&mut HashMap<String, E>) -> T) -> T {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut records)
    }

    fn effective(records: &HashMap<String, E>, owner_id: &str, filter: &EntityFilter) -> Vec<E> {
        records
            .values()
            .filter(|record| record.owner_id() == owner_id)
            .filter(|record| record.sync_state() != SyncState::PendingDelete)
            .filter(|record| record.matches(filter))
            .cloned()
            .collect()
    }

    fn scan_cmp(order: SortOrder, a: &(String, String), b: &(String, String)) -> CmpOrdering {
        let by_key = a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1));
        match order.direction {
            SortDirection::Asc => by_key,
            SortDirection::Desc => by_key.reverse(),
        }
    }

    fn sorted(mut items: Vec<E>, order: SortOrder) -> Vec<E> {
        items.sort_by(|a, b| {
            Self::scan_cmp(
                order,
                &(a.sort_key(order.field), a.id().to_string()),
                &(b.sort_key(order.field), b.id().to_string()),
            )
        });
        items
    }
}

#[async_trait]
impl<E: Syncable> EntityStore<E> for MemoryStore<E> {
    async fn get(&self, id: &str) -> Result<Option<E>> {
        Ok(self.with_records(|records| records.get(id).cloned()))
    }

    async fn get_by_remote_id(&self, remote_id: &str) -> Result<Option<E>> {
        Ok(self.with_records(|records| {
            records
                .values()
                .find(|record| record.remote_id() == Some(remote_id))
                .cloned()
        }))
    }

    async fn list_effective(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        order: SortOrder,
    ) -> Result<Vec<E>> {
        let items = self.with_records(|records| Self::effective(records, owner_id, filter));
        Ok(Self::sorted(items, order))
    }

    async fn query(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        order: SortOrder,
        page: &PageRequest,
    ) -> Result<ScanPage<E>> {
        let items = self.with_records(|records| Self::effective(records, owner_id, filter));
        let sorted = Self::sorted(items, order);
        let total = sorted.len() as i64;
        let limit = page.limit.max(1) as usize;

        match &page.position {
            ScanPosition::Offset { offset } => {
                let start = (*offset).max(0) as usize;
                let items: Vec<E> = sorted.into_iter().skip(start).take(limit).collect();
                let consumed = start + items.len();
                let has_more = (consumed as i64) < total;
                Ok(ScanPage {
                    items,
                    next: has_more.then_some(ScanPosition::Offset {
                        offset: consumed as i64,
                    }),
                    has_more,
                    total: Some(total),
                })
            }
            position => {
                let remaining: Vec<E> = match position {
                    ScanPosition::After { sort_key, id } => {
                        let after = (sort_key.clone(), id.clone());
                        sorted
                            .into_iter()
                            .filter(|record| {
                                let key = (record.sort_key(order.field), record.id().to_string());
                                Self::scan_cmp(order, &key, &after) == CmpOrdering::Greater
                            })
                            .collect()
                    }
                    _ => sorted,
                };
                let has_more = remaining.len() > limit;
                let items: Vec<E> = remaining.into_iter().take(limit).collect();
                let next = if has_more {
                    items.last().map(|last| ScanPosition::After {
                        sort_key: last.sort_key(order.field),
                        id: last.id().to_string(),
                    })
                } else {
                    None
                };
                Ok(ScanPage {
                    items,
                    next,
                    has_more,
                    total: None,
                })
            }
        }
    }

    async fn put(&self, entity: E) -> Result<E> {
        self.with_records(|records| {
            records.insert(entity.id().to_string(), entity.clone());
        });
        Ok(entity)
    }

    async fn delete(&self, id: &str, now: DateTime<Utc>) -> Result<DeleteOutcome> {
        Ok(self.with_records(|records| match records.get_mut(id) {
            None => DeleteOutcome::NotFound,
            Some(record) if record.remote_id().is_some() => {
                record.set_sync_state(SyncState::PendingDelete);
                record.touch_local(now);
                record.set_push_attempts(0);
                record.set_next_push_at(None);
                DeleteOutcome::Soft
            }
            Some(_) => {
                records.remove(id);
                DeleteOutcome::Hard
            }
        }))
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.with_records(|records| records.remove(id).is_some()))
    }

    async fn list_pending_push(&self, due_before: DateTime<Utc>, limit: u32) -> Result<Vec<E>> {
        let mut pending = self.with_records(|records| {
            records
                .values()
                .filter(|record| record.sync_state().is_pending_push())
                .filter(|record| {
                    record
                        .next_push_at()
                        .map_or(true, |due| due <= due_before)
                })
                .cloned()
                .collect::<Vec<E>>()
        });
        pending.sort_by_key(|record| record.updated_at_local());
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn summary(&self, owner_id: &str) -> Result<E::Summary> {
        let items =
            self.with_records(|records| Self::effective(records, owner_id, &EntityFilter::none()));
        Ok(E::summarize(items.iter()))
    }

    async fn prune_clean_before(&self, owner_id: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        Ok(self.with_records(|records| {
            let before = records.len();
            records.retain(|_, record| {
                !(record.owner_id() == owner_id
                    && record.sync_state() == SyncState::Clean
                    && record.updated_at_local() < cutoff)
            });
            before - records.len()
        }))
    }
}
