//! Budget category domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::store::{EntityFilter, SortField, SortOrder};
use crate::sync::{time, EntityKind, SyncState, Syncable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCategory {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub monthly_limit: Decimal,
    pub currency: String,
    pub remote_id: Option<String>,
    pub sync_state: SyncState,
    pub updated_at_local: DateTime<Utc>,
    pub updated_at_remote: Option<DateTime<Utc>>,
    pub push_attempts: u32,
    pub next_push_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBudgetCategory {
    pub name: String,
    pub monthly_limit: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCategoryPatch {
    pub name: Option<String>,
    pub monthly_limit: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSummary {
    pub category_count: usize,
    pub total_monthly_limit: Decimal,
}

impl Syncable for BudgetCategory {
    type Draft = NewBudgetCategory;
    type Patch = BudgetCategoryPatch;
    type Summary = BudgetSummary;

    const KIND: EntityKind = EntityKind::BudgetCategory;

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

    fn from_draft(id: String, owner_id: &str, draft: NewBudgetCategory, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: owner_id.to_string(),
            name: draft.name,
            monthly_limit: draft.monthly_limit,
            currency: draft.currency,
            remote_id: None,
            sync_state: SyncState::PendingCreate,
            updated_at_local: now,
            updated_at_remote: None,
            push_attempts: 0,
            next_push_at: None,
            created_at: now,
        }
    }

    fn apply_patch(&mut self, patch: &BudgetCategoryPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(monthly_limit) = patch.monthly_limit {
            self.monthly_limit = monthly_limit;
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

    fn summarize<'a, I>(items: I) -> BudgetSummary
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut summary = BudgetSummary::default();
        for category in items {
            summary.category_count += 1;
            summary.total_monthly_limit += category.monthly_limit;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn category(name: &str, limit: Decimal) -> BudgetCategory {
        BudgetCategory::from_draft(
            format!("cat-{}", name),
            "owner-1",
            NewBudgetCategory {
                name: name.to_string(),
                monthly_limit: limit,
                currency: "USD".to_string(),
            },
            Utc::now(),
        )
    }

    #[test]
    fn drafts_start_as_local_only_pending_creates() {
        let subject = category("Groceries", dec!(400));
        assert_eq!(subject.sync_state, SyncState::PendingCreate);
        assert!(subject.remote_id.is_none());
    }

    #[test]
    fn summary_totals_monthly_limits() {
        let groceries = category("Groceries", dec!(400));
        let travel = category("Travel", dec!(250));
        let summary = BudgetCategory::summarize([&groceries, &travel]);
        assert_eq!(summary.category_count, 2);
        assert_eq!(summary.total_monthly_limit, dec!(650));
    }
}
