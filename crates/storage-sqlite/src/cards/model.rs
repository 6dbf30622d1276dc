//! Database row model for credit cards.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use pocketledger_core::cards::CreditCard;

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
#[diesel(table_name = crate::schema::credit_cards)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CreditCardRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub issuer: Option<String>,
    pub currency: String,
    pub credit_limit: String,
    pub balance: String,
    pub remote_id: Option<String>,
    pub sync_state: String,
    pub updated_at_local: String,
    pub updated_at_remote: Option<String>,
    pub push_attempts: i32,
    pub next_push_at: Option<String>,
    pub created_at: String,
}

impl CreditCardRow {
    pub fn from_domain(card: &CreditCard) -> Result<Self, StorageError> {
        Ok(Self {
            id: card.id.clone(),
            owner_id: card.owner_id.clone(),
            name: card.name.clone(),
            issuer: card.issuer.clone(),
            currency: card.currency.clone(),
            credit_limit: decimal_to_db(card.credit_limit),
            balance: decimal_to_db(card.balance),
            remote_id: card.remote_id.clone(),
            sync_state: enum_to_db(&card.sync_state)?,
            updated_at_local: timestamp_to_db(card.updated_at_local),
            updated_at_remote: opt_timestamp_to_db(card.updated_at_remote),
            push_attempts: card.push_attempts as i32,
            next_push_at: opt_timestamp_to_db(card.next_push_at),
            created_at: timestamp_to_db(card.created_at),
        })
    }

    pub fn into_domain(self) -> Result<CreditCard, StorageError> {
        Ok(CreditCard {
            credit_limit: decimal_from_db(&self.credit_limit)?,
            balance: decimal_from_db(&self.balance)?,
            sync_state: enum_from_db(&self.sync_state)?,
            updated_at_local: timestamp_from_db(&self.updated_at_local)?,
            updated_at_remote: opt_timestamp_from_db(self.updated_at_remote.as_deref())?,
            push_attempts: self.push_attempts.max(0) as u32,
            next_push_at: opt_timestamp_from_db(self.next_push_at.as_deref())?,
            created_at: timestamp_from_db(&self.created_at)?,
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            issuer: self.issuer,
            currency: self.currency,
            remote_id: self.remote_id,
        })
    }
}
