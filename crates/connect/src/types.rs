//! Wire DTOs and the local↔remote field mapping pairs.
//!
//! The backend speaks camelCase with its own field names (`displayName`,
//! `postedOn`, `limitPerMonth`) and decimal-string money. Each DTO carries a
//! total `from_domain` and a fallible `into_domain`, unit-tested for
//! reversibility, so the renaming lives here and nowhere else.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pocketledger_core::budgets::BudgetCategory;
use pocketledger_core::cards::CreditCard;
use pocketledger_core::remote::RemoteAck;
use pocketledger_core::sync::SyncState;
use pocketledger_core::transactions::Transaction;

use crate::error::RemoteApiError;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the connect API client.
///
/// Passed explicitly into the constructor; the client reads no environment.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub base_url: String,
    pub access_token: String,
    pub timeout: Duration,
}

impl ConnectConfig {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Acknowledgement payload returned by every write endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckDto {
    pub remote_id: String,
    pub updated_at: DateTime<Utc>,
}

impl AckDto {
    pub fn into_ack(self) -> RemoteAck {
        RemoteAck {
            remote_id: self.remote_id,
            updated_at_remote: self.updated_at,
        }
    }
}

/// Paged listing envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
    pub total: Option<i64>,
}

fn parse_money(value: &str, field: &str) -> Result<Decimal, RemoteApiError> {
    value
        .parse::<Decimal>()
        .map_err(|_| RemoteApiError::invalid_request(format!("Bad decimal in '{}'", field)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub owner_id: String,
    pub display_name: String,
    pub issuer: Option<String>,
    pub currency: String,
    pub credit_limit: String,
    pub balance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CardDto {
    pub fn from_domain(card: &CreditCard) -> Self {
        Self {
            remote_id: card.remote_id.clone(),
            owner_id: card.owner_id.clone(),
            display_name: card.name.clone(),
            issuer: card.issuer.clone(),
            currency: card.currency.clone(),
            credit_limit: card.credit_limit.to_string(),
            balance: card.balance.to_string(),
            updated_at: card.updated_at_remote,
        }
    }

    /// Map a backend record into the domain. Pulled records arrive `Clean`
    /// with the remote id doubling as the local id until reconcile matches
    /// them up.
    pub fn into_domain(self) -> Result<CreditCard, RemoteApiError> {
        let remote_id = self
            .remote_id
            .ok_or_else(|| RemoteApiError::invalid_request("Record is missing remoteId"))?;
        let seen_at = self.updated_at.unwrap_or_else(Utc::now);
        Ok(CreditCard {
            id: remote_id.clone(),
            owner_id: self.owner_id,
            name: self.display_name,
            issuer: self.issuer,
            currency: self.currency,
            credit_limit: parse_money(&self.credit_limit, "creditLimit")?,
            balance: parse_money(&self.balance, "balance")?,
            remote_id: Some(remote_id),
            sync_state: SyncState::Clean,
            updated_at_local: seen_at,
            updated_at_remote: self.updated_at,
            push_attempts: 0,
            next_push_at: None,
            created_at: seen_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub owner_id: String,
    pub card_id: Option<String>,
    pub display_name: String,
    pub amount: String,
    pub currency: String,
    pub posted_on: NaiveDate,
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TransactionDto {
    pub fn from_domain(transaction: &Transaction) -> Self {
        Self {
            remote_id: transaction.remote_id.clone(),
            owner_id: transaction.owner_id.clone(),
            card_id: transaction.card_id.clone(),
            display_name: transaction.name.clone(),
            amount: transaction.amount.to_string(),
            currency: transaction.currency.clone(),
            posted_on: transaction.date,
            category_id: transaction.category_id.clone(),
            updated_at: transaction.updated_at_remote,
        }
    }

    pub fn into_domain(self) -> Result<Transaction, RemoteApiError> {
        let remote_id = self
            .remote_id
            .ok_or_else(|| RemoteApiError::invalid_request("Record is missing remoteId"))?;
        let seen_at = self.updated_at.unwrap_or_else(Utc::now);
        Ok(Transaction {
            id: remote_id.clone(),
            owner_id: self.owner_id,
            card_id: self.card_id,
            name: self.display_name,
            amount: parse_money(&self.amount, "amount")?,
            currency: self.currency,
            date: self.posted_on,
            category_id: self.category_id,
            remote_id: Some(remote_id),
            sync_state: SyncState::Clean,
            updated_at_local: seen_at,
            updated_at_remote: self.updated_at,
            push_attempts: 0,
            next_push_at: None,
            created_at: seen_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCategoryDto {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub owner_id: String,
    pub display_name: String,
    pub limit_per_month: String,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BudgetCategoryDto {
    pub fn from_domain(category: &BudgetCategory) -> Self {
        Self {
            remote_id: category.remote_id.clone(),
            owner_id: category.owner_id.clone(),
            display_name: category.name.clone(),
            limit_per_month: category.monthly_limit.to_string(),
            currency: category.currency.clone(),
            updated_at: category.updated_at_remote,
        }
    }

    pub fn into_domain(self) -> Result<BudgetCategory, RemoteApiError> {
        let remote_id = self
            .remote_id
            .ok_or_else(|| RemoteApiError::invalid_request("Record is missing remoteId"))?;
        let seen_at = self.updated_at.unwrap_or_else(Utc::now);
        Ok(BudgetCategory {
            id: remote_id.clone(),
            owner_id: self.owner_id,
            name: self.display_name,
            monthly_limit: parse_money(&self.limit_per_month, "limitPerMonth")?,
            currency: self.currency,
            remote_id: Some(remote_id),
            sync_state: SyncState::Clean,
            updated_at_local: seen_at,
            updated_at_remote: self.updated_at,
            push_attempts: 0,
            next_push_at: None,
            created_at: seen_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn synced_card() -> CreditCard {
        let seen = Utc::now();
        CreditCard {
            id: "rc_77".to_string(),
            owner_id: "owner-1".to_string(),
            name: "Blue Cash".to_string(),
            issuer: Some("Acme Bank".to_string()),
            currency: "USD".to_string(),
            credit_limit: dec!(1500.50),
            balance: dec!(-42.01),
            remote_id: Some("rc_77".to_string()),
            sync_state: SyncState::Clean,
            updated_at_local: seen,
            updated_at_remote: Some(seen),
            push_attempts: 0,
            next_push_at: None,
            created_at: seen,
        }
    }

    #[test]
    fn card_mapping_is_reversible_on_domain_fields() {
        let card = synced_card();
        let round_tripped = CardDto::from_domain(&card).into_domain().unwrap();
        assert_eq!(round_tripped.name, card.name);
        assert_eq!(round_tripped.issuer, card.issuer);
        assert_eq!(round_tripped.credit_limit, card.credit_limit);
        assert_eq!(round_tripped.balance, card.balance);
        assert_eq!(round_tripped.remote_id, card.remote_id);
        assert_eq!(round_tripped.updated_at_remote, card.updated_at_remote);
    }

    #[test]
    fn card_dto_renames_fields_on_the_wire() {
        let encoded = serde_json::to_value(CardDto::from_domain(&synced_card())).unwrap();
        assert!(encoded.get("displayName").is_some());
        assert!(encoded.get("creditLimit").is_some());
        assert!(encoded.get("name").is_none());
    }

    #[test]
    fn records_without_remote_id_are_rejected() {
        let mut dto = CardDto::from_domain(&synced_card());
        dto.remote_id = None;
        assert!(matches!(
            dto.into_domain(),
            Err(RemoteApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn transaction_mapping_round_trips_date_and_amount() {
        let seen = Utc::now();
        let transaction = Transaction {
            id: "rc_5".to_string(),
            owner_id: "owner-1".to_string(),
            card_id: Some("card-1".to_string()),
            name: "Coffee".to_string(),
            amount: dec!(-4.50),
            currency: "USD".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            category_id: Some("cat-1".to_string()),
            remote_id: Some("rc_5".to_string()),
            sync_state: SyncState::Clean,
            updated_at_local: seen,
            updated_at_remote: Some(seen),
            push_attempts: 0,
            next_push_at: None,
            created_at: seen,
        };

        let dto = TransactionDto::from_domain(&transaction);
        let encoded = serde_json::to_value(&dto).unwrap();
        assert_eq!(encoded["postedOn"], "2026-08-06");

        let round_tripped = dto.into_domain().unwrap();
        assert_eq!(round_tripped.date, transaction.date);
        assert_eq!(round_tripped.amount, transaction.amount);
        assert_eq!(round_tripped.card_id, transaction.card_id);
    }

    #[test]
    fn bad_money_strings_fail_the_mapping() {
        let mut dto = CardDto::from_domain(&synced_card());
        dto.balance = "lots".to_string();
        assert!(dto.into_domain().is_err());
    }

    #[test]
    fn budget_mapping_round_trips_the_monthly_limit() {
        let seen = Utc::now();
        let category = BudgetCategory {
            id: "rc_9".to_string(),
            owner_id: "owner-1".to_string(),
            name: "Groceries".to_string(),
            monthly_limit: dec!(400),
            currency: "USD".to_string(),
            remote_id: Some("rc_9".to_string()),
            sync_state: SyncState::Clean,
            updated_at_local: seen,
            updated_at_remote: Some(seen),
            push_attempts: 0,
            next_push_at: None,
            created_at: seen,
        };

        let dto = BudgetCategoryDto::from_domain(&category);
        let encoded = serde_json::to_value(&dto).unwrap();
        assert_eq!(encoded["limitPerMonth"], "400");
        assert_eq!(dto.into_domain().unwrap().monthly_limit, dec!(400));
    }
}
