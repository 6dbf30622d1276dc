//! Database row model for transactions.
//!
//! The domain `date` field persists as the `posted_on` column.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use pocketledger_core::transactions::Transaction;

use crate::errors::StorageError;
use crate::row::{
    date_from_db, date_to_db, decimal_from_db, decimal_to_db, enum_from_db, enum_to_db,
    opt_timestamp_from_db, opt_timestamp_to_db, timestamp_from_db, timestamp_to_db,
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
#[diesel(table_name = crate::schema::transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TransactionRow {
    pub id: String,
    pub owner_id: String,
    pub card_id: Option<String>,
    pub name: String,
    pub amount: String,
    pub currency: String,
    pub posted_on: String,
    pub category_id: Option<String>,
    pub remote_id: Option<String>,
    pub sync_state: String,
    pub updated_at_local: String,
    pub updated_at_remote: Option<String>,
    pub push_attempts: i32,
    pub next_push_at: Option<String>,
    pub created_at: String,
}

impl TransactionRow {
    pub fn from_domain(transaction: &Transaction) -> Result<Self, StorageError> {
        Ok(Self {
            id: transaction.id.clone(),
            owner_id: transaction.owner_id.clone(),
            card_id: transaction.card_id.clone(),
            name: transaction.name.clone(),
            amount: decimal_to_db(transaction.amount),
            currency: transaction.currency.clone(),
            posted_on: date_to_db(transaction.date),
            category_id: transaction.category_id.clone(),
            remote_id: transaction.remote_id.clone(),
            sync_state: enum_to_db(&transaction.sync_state)?,
            updated_at_local: timestamp_to_db(transaction.updated_at_local),
            updated_at_remote: opt_timestamp_to_db(transaction.updated_at_remote),
            push_attempts: transaction.push_attempts as i32,
            next_push_at: opt_timestamp_to_db(transaction.next_push_at),
            created_at: timestamp_to_db(transaction.created_at),
        })
    }

    pub fn into_domain(self) -> Result<Transaction, StorageError> {
        Ok(Transaction {
            amount: decimal_from_db(&self.amount)?,
            date: date_from_db(&self.posted_on)?,
            sync_state: enum_from_db(&self.sync_state)?,
            updated_at_local: timestamp_from_db(&self.updated_at_local)?,
            updated_at_remote: opt_timestamp_from_db(self.updated_at_remote.as_deref())?,
            push_attempts: self.push_attempts.max(0) as u32,
            next_push_at: opt_timestamp_from_db(self.next_push_at.as_deref())?,
            created_at: timestamp_from_db(&self.created_at)?,
            id: self.id,
            owner_id: self.owner_id,
            card_id: self.card_id,
            name: self.name,
            currency: self.currency,
            category_id: self.category_id,
            remote_id: self.remote_id,
        })
    }
}
