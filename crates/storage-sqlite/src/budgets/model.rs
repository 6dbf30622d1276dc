//! Database row model for budget categories.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use pocketledger_core::budgets::BudgetCategory;

use crate::errors::StorageError;
use crate::row::{
    decimal_from_db, decimal_to_db, enum_from_db, enum_to_db, opt_timestamp_from_db,
    opt_timestamp_to_db, timestamp_from_db, timestamp_to_db,
};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::budget_categories)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BudgetCategoryRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub monthly_limit: String,
    pub currency: String,
    pub remote_id: Option<String>,
    pub sync_state: String,
    pub updated_at_local: String,
    pub updated_at_remote: Option<String>,
    pub push_attempts: i32,
    pub next_push_at: Option<String>,
    pub created_at: String,
}

impl BudgetCategoryRow {
    pub fn from_domain(category: &BudgetCategory) -> Result<Self, StorageError> {
        Ok(Self {
            id: category.id.clone(),
            owner_id: category.owner_id.clone(),
            name: category.name.clone(),
            monthly_limit: decimal_to_db(category.monthly_limit),
            currency: category.currency.clone(),
            remote_id: category.remote_id.clone(),
            sync_state: enum_to_db(&category.sync_state)?,
            updated_at_local: timestamp_to_db(category.updated_at_local),
            updated_at_remote: opt_timestamp_to_db(category.updated_at_remote),
            push_attempts: category.push_attempts as i32,
            next_push_at: opt_timestamp_to_db(category.next_push_at),
            created_at: timestamp_to_db(category.created_at),
        })
    }

    pub fn into_domain(self) -> Result<BudgetCategory, StorageError> {
        Ok(BudgetCategory {
            monthly_limit: decimal_from_db(&self.monthly_limit)?,
            sync_state: enum_from_db(&self.sync_state)?,
            updated_at_local: timestamp_from_db(&self.updated_at_local)?,
            updated_at_remote: opt_timestamp_from_db(self.updated_at_remote.as_deref())?,
            push_attempts: self.push_attempts.max(0) as u32,
            next_push_at: opt_timestamp_from_db(self.next_push_at.as_deref())?,
            created_at: timestamp_from_db(&self.created_at)?,
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            currency: self.currency,
            remote_id: self.remote_id,
        })
    }
}
