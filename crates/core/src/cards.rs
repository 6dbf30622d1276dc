//! Credit card domain model.

use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::{EntityFilter, SortField, SortOrder};
use crate::sync::{time, EntityKind, SyncState, Syncable};

/// A credit card tracked by the app, with its sync envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCard {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub issuer: Option<String>,
    pub currency: String,
    pub credit_limit: Decimal,
    pub balance: Decimal,
    pub remote_id: Option<String>,
    pub sync_state: SyncState,
    pub updated_at_local: DateTime<Utc>,
    pub updated_at_remote: Option<DateTime<Utc>>,
    pub push_attempts: u32,
    pub next_push_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Creation payload for a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCreditCard {
    pub name: String,
    pub issuer: Option<String>,
    pub currency: String,
    pub credit_limit: Decimal,
    pub balance: Decimal,
}

/// Partial update; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCardPatch {
    pub name: Option<String>,
    pub issuer: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub balance: Option<Decimal>,
}

/// Aggregate over the effective card set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    pub card_count: usize,
    pub total_limit: Decimal,
    pub total_balance: Decimal,
    /// Share of the combined limit in use; `None` when no limit is known.
    pub utilization_pct: Option<f64>,
}

impl Syncable for CreditCard {
    type Draft = NewCreditCard;
    type Patch = CreditCardPatch;
    type Summary = CardSummary;

    const KIND: EntityKind = EntityKind::CreditCard;

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

    fn from_draft(id: String, owner_id: &str, draft: NewCreditCard, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: owner_id.to_string(),
            name: draft.name,
            issuer: draft.issuer,
            currency: draft.currency,
            credit_limit: draft.credit_limit,
            balance: draft.balance,
            remote_id: None,
            sync_state: SyncState::PendingCreate,
            updated_at_local: now,
            updated_at_remote: None,
            push_attempts: 0,
            next_push_at: None,
            created_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &CreditCardPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(issuer) = &patch.issuer {
            self.issuer = Some(issuer.clone());
        }
        if let Some(credit_limit) = patch.credit_limit {
            self.credit_limit = credit_limit;
        }
        if let Some(balance) = patch.balance {
            self.balance = balance;
        }
    }

    fn matches(&self, filter: &EntityFilter) -> bool {
        match &filter.search {
            Some(needle) => self.name.contains(needle.as_str()),
            None => true,
        }
    }

    fn sort_key(&self, field: SortField) -> String {
        match field {
            SortField::Name => self.name.clone(),
            SortField::Date => time::encode_timestamp(self.created_at),
        }
    }

    fn default_order() -> SortOrder {
        SortOrder::name_asc()
    }

    fn summarize<'a, I>(items: I) -> CardSummary
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut summary = CardSummary::default();
        for card in items {
            summary.card_count += 1;
            summary.total_limit += card.credit_limit;
            summary.total_balance += card.balance;
        }
        if summary.total_limit > Decimal::ZERO {
            summary.utilization_pct =
                (summary.total_balance / summary.total_limit * Decimal::ONE_HUNDRED).to_f64();
        }
        summary
    }
}
