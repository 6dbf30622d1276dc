//! Transaction domain model.
//!
//! Amounts are signed: charges are negative, payments and refunds positive.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::{EntityFilter, SortField, SortOrder};
use crate::sync::{time, EntityKind, SyncState, Syncable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub owner_id: String,
    pub card_id: Option<String>,
    pub name: String,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub category_id: Option<String>,
    pub remote_id: Option<String>,
    pub sync_state: SyncState,
    pub updated_at_local: DateTime<Utc>,
    pub updated_at_remote: Option<DateTime<Utc>>,
    pub push_attempts: u32,
    pub next_push_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Creation payload for a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub card_id: Option<String>,
    pub name: String,
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub category_id: Option<String>,
}

/// Partial update; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPatch {
    pub name: Option<String>,
    pub amount: Option<Decimal>,
    pub date: Option<NaiveDate>,
    pub category_id: Option<String>,
}

/// Aggregate over the effective transaction set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub transaction_count: usize,
    /// Signed sum of all amounts.
    pub net_total: Decimal,
    /// Magnitude of charges only.
    pub spend_total: Decimal,
}

impl Syncable for Transaction {
    type Draft = NewTransaction;
    type Patch = TransactionPatch;
    type Summary = TransactionSummary;

    const KIND: EntityKind = EntityKind::Transaction;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    fn set_remote_id(&mut self, remote_id: Option<String>) {
        self.remote_id = remote_id;
    }

    fn sync_state(&self) -> SyncState {
        self.sync_state
    }

    fn set_sync_state(&mut self, state: SyncState) {
        self.sync_state = state;
    }

    fn updated_at_local(&self) -> DateTime<Utc> {
        self.updated_at_local
    }

    fn touch_local(&mut self, at: DateTime<Utc>) {
        self.updated_at_local = at;
    }

    fn updated_at_remote(&self) -> Option<DateTime<Utc>> {
        self.updated_at_remote
    }

    fn set_updated_at_remote(&mut self, at: Option<DateTime<Utc>>) {
        self.updated_at_remote = at;
    }

    fn push_attempts(&self) -> u32 {
        self.push_attempts
    }

    fn set_push_attempts(&mut self, attempts: u32) {
        self.push_attempts = attempts;
    }

    fn next_push_at(&self) -> Option<DateTime<Utc>> {
        self.next_push_at
    }

    fn set_next_push_at(&mut self, at: Option<DateTime<Utc>>) {
        self.next_push_at = at;
    }

    fn from_draft(id: String, owner_id: &str, draft: NewTransaction, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: owner_id.to_string(),
            card_id: draft.card_id,
            name: draft.name,
            amount: draft.amount,
            currency: draft.currency,
            date: draft.date,
            category_id: draft.category_id,
            remote_id: None,
            sync_state: SyncState::PendingCreate,
            updated_at_local: now,
            updated_at_remote: None,
            push_attempts: 0,
            next_push_at: None,
            created_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &TransactionPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(category_id) = &patch.category_id {
            self.category_id = Some(category_id.clone());
        }
    }

    fn matches(&self, filter: &EntityFilter) -> bool {
        if let Some(from) = filter.date_from {
            if self.date < from {
                return false;
            }
        }
        if let Some(to) = filter.date_to {
            if self.date > to {
                return false;
            }
        }
        if let Some(card_id) = &filter.card_id {
            if self.card_id.as_deref() != Some(card_id.as_str()) {
                return false;
            }
        }
        if let Some(category_id) = &filter.category_id {
            if self.category_id.as_deref() != Some(category_id.as_str()) {
                return false;
            }
        }
        if let Some(needle) = &filter.search {
            if !self.name.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }

    fn sort_key(&self, field: SortField) -> String {
        match field {
            SortField::Date => time::encode_date(self.date),
            SortField::Name => self.name.clone(),
        }
    }

    fn default_order() -> SortOrder {
        SortOrder::date_desc()
    }

    fn summarize<'a, I>(items: I) -> TransactionSummary
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut summary = TransactionSummary::default();
        for transaction in items {
            summary.transaction_count += 1;
            summary.net_total += transaction.amount;
            if transaction.amount < Decimal::ZERO {
                summary.spend_total -= transaction.amount;
            }
        }
        summary
    }
}
