//! Shared fixtures and doubles for core policy tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;

use crate::cards::CreditCard;
use crate::errors::RemoteError;
use crate::remote::{RemoteAck, RemoteApi, RemoteBatch, RemotePage, RemoteResult};
use crate::store::EntityFilter;
use crate::sync::{SyncState, Syncable};
use crate::transactions::Transaction;

pub fn card(id: &str, owner_id: &str) -> CreditCard {
    let now = Utc::now();
    CreditCard {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        name: format!("Card {}", id),
        issuer: None,
        currency: "USD".to_string(),
        credit_limit: dec!(1000),
        balance: dec!(200),
        remote_id: None,
        sync_state: SyncState::PendingCreate,
        updated_at_local: now,
        updated_at_remote: None,
        push_attempts: 0,
        next_push_at: None,
        created_at: now,
    }
}

pub fn transaction_on(id: &str, owner_id: &str, date: &str) -> Transaction {
    let now = Utc::now();
    Transaction {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        card_id: None,
        name: format!("Purchase {}", id),
        amount: dec!(-10),
        currency: "USD".to_string(),
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("fixture date"),
        category_id: None,
        remote_id: None,
        sync_state: SyncState::PendingCreate,
        updated_at_local: now,
        updated_at_remote: None,
        push_attempts: 0,
        next_push_at: None,
        created_at: now,
    }
}

/// Scripted remote double: acknowledges writes with generated remote ids,
/// serves a configurable listing, and fails on demand.
pub struct MockRemote<E: Syncable> {
    calls: AtomicUsize,
    next_remote_id: AtomicUsize,
    fail_once: Mutex<VecDeque<RemoteError>>,
    fail_always: Mutex<Option<RemoteError>>,
    listing: Mutex<Vec<E>>,
}

impl<E: Syncable> MockRemote<E> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            next_remote_id: AtomicUsize::new(0),
            fail_once: Mutex::new(VecDeque::new()),
            fail_always: Mutex::new(None),
            listing: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, err: RemoteError) {
        self.fail_once
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(err);
    }

    pub fn fail_always(&self, err: RemoteError) {
        *self
            .fail_always
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(err);
    }

    pub fn set_listing(&self, items: Vec<E>) {
        *self.listing.lock().unwrap_or_else(PoisonError::into_inner) = items;
    }

    fn record_call(&self) -> Option<RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self
            .fail_once
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return Some(err);
        }
        self.fail_always
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl<E: Syncable> RemoteApi<E> for MockRemote<E> {
    async fn create(&self, _entity: &E) -> RemoteResult<RemoteAck> {
        if let Some(err) = self.record_call() {
            return Err(err);
        }
        let n = self.next_remote_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RemoteAck {
            remote_id: format!("rc_{}", n),
            updated_at_remote: Utc::now(),
        })
    }

    async fn update(&self, remote_id: &str, _entity: &E) -> RemoteResult<RemoteAck> {
        if let Some(err) = self.record_call() {
            return Err(err);
        }
        Ok(RemoteAck {
            remote_id: remote_id.to_string(),
            updated_at_remote: Utc::now(),
        })
    }

    async fn delete(&self, _remote_id: &str) -> RemoteResult<()> {
        match self.record_call() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn fetch(&self, remote_id: &str) -> RemoteResult<Option<E>> {
        if let Some(err) = self.record_call() {
            return Err(err);
        }
        Ok(self
            .listing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|item| item.remote_id() == Some(remote_id))
            .cloned())
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        _page: RemotePage,
    ) -> RemoteResult<RemoteBatch<E>> {
        if let Some(err) = self.record_call() {
            return Err(err);
        }
        let items: Vec<E> = self
            .listing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|item| item.owner_id() == owner_id && item.matches(filter))
            .cloned()
            .collect();
        let total = items.len() as i64;
        Ok(RemoteBatch {
            items,
            next_page: None,
            total: Some(total),
        })
    }

    async fn summary(&self, _owner_id: &str) -> RemoteResult<E::Summary> {
        if let Some(err) = self.record_call() {
            return Err(err);
        }
        Ok(E::Summary::default())
    }
}
