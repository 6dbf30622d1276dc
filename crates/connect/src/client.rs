//! HTTP client for the pocketledger backend API.

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;

use pocketledger_core::budgets::{BudgetCategory, BudgetSummary};
use pocketledger_core::cards::{CardSummary, CreditCard};
use pocketledger_core::remote::{RemoteAck, RemoteApi, RemoteBatch, RemotePage, RemoteResult};
use pocketledger_core::store::EntityFilter;
use pocketledger_core::sync::time;
use pocketledger_core::transactions::{Transaction, TransactionSummary};

use crate::error::{ApiErrorResponse, RemoteApiError, Result};
use crate::types::{AckDto, BudgetCategoryDto, CardDto, ConnectConfig, ListResponse, TransactionDto};

const MAX_LOG_BODY_CHARS: usize = 512;

/// Client for the pocketledger backend REST API.
///
/// Owns one reqwest client with a request timeout; authentication rides in
/// a bearer header built from the injected config.
#[derive(Debug, Clone)]
pub struct ConnectClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl ConnectClient {
    pub fn new(config: &ConnectConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|_| RemoteApiError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(RemoteApiError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(RemoteApiError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }

        serde_json::from_str(&body).map_err(|err| {
            RemoteApiError::api(
                status.as_u16(),
                format!("Failed to parse response: {}", err),
            )
        })
    }

    async fn check_status(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);
        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(&body) {
                return Err(RemoteApiError::api(
                    status.as_u16(),
                    format!("{}: {}", error.code, error.message),
                ));
            }
            return Err(RemoteApiError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .headers(self.headers()?)
            .query(query)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn put_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .put(self.url(path))
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn delete_resource(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(path))
            .headers(self.headers()?)
            .send()
            .await?;
        Self::check_status(response).await
    }

    fn list_query(filter: &EntityFilter, page: RemotePage) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("page", page.page.to_string()),
            ("pageSize", page.page_size.to_string()),
        ];
        if let Some(from) = filter.date_from {
            query.push(("dateFrom", time::encode_date(from)));
        }
        if let Some(to) = filter.date_to {
            query.push(("dateTo", time::encode_date(to)));
        }
        if let Some(card_id) = &filter.card_id {
            query.push(("cardId", card_id.clone()));
        }
        if let Some(category_id) = &filter.category_id {
            query.push(("categoryId", category_id.clone()));
        }
        if let Some(search) = &filter.search {
            query.push(("search", search.clone()));
        }
        query
    }

    fn encode_segment(value: &str) -> String {
        urlencoding::encode(value).to_string()
    }

    fn not_found_as_none<T>(result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.status_code() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl RemoteApi<CreditCard> for ConnectClient {
    async fn create(&self, entity: &CreditCard) -> RemoteResult<RemoteAck> {
        let ack: AckDto = self
            .post_json("/cards", &CardDto::from_domain(entity))
            .await?;
        Ok(ack.into_ack())
    }

    async fn update(&self, remote_id: &str, entity: &CreditCard) -> RemoteResult<RemoteAck> {
        let path = format!("/cards/{}", Self::encode_segment(remote_id));
        let ack: AckDto = self.put_json(&path, &CardDto::from_domain(entity)).await?;
        Ok(ack.into_ack())
    }

    async fn delete(&self, remote_id: &str) -> RemoteResult<()> {
        let path = format!("/cards/{}", Self::encode_segment(remote_id));
        Ok(self.delete_resource(&path).await?)
    }

    async fn fetch(&self, remote_id: &str) -> RemoteResult<Option<CreditCard>> {
        let path = format!("/cards/{}", Self::encode_segment(remote_id));
        let dto = Self::not_found_as_none(self.get_json::<CardDto>(&path, &[]).await)?;
        Ok(dto.map(CardDto::into_domain).transpose()?)
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        page: RemotePage,
    ) -> RemoteResult<RemoteBatch<CreditCard>> {
        let path = format!("/owners/{}/cards", Self::encode_segment(owner_id));
        let response: ListResponse<CardDto> = self
            .get_json(&path, &Self::list_query(filter, page))
            .await?;
        let items = response
            .items
            .into_iter()
            .map(CardDto::into_domain)
            .collect::<Result<Vec<_>>>()?;
        Ok(RemoteBatch {
            items,
            next_page: response.next_page,
            total: response.total,
        })
    }

    async fn summary(&self, owner_id: &str) -> RemoteResult<CardSummary> {
        let path = format!("/owners/{}/cards/summary", Self::encode_segment(owner_id));
        Ok(self.get_json(&path, &[]).await?)
    }
}

#[async_trait]
impl RemoteApi<Transaction> for ConnectClient {
    async fn create(&self, entity: &Transaction) -> RemoteResult<RemoteAck> {
        let ack: AckDto = self
            .post_json("/transactions", &TransactionDto::from_domain(entity))
            .await?;
        Ok(ack.into_ack())
    }

    async fn update(&self, remote_id: &str, entity: &Transaction) -> RemoteResult<RemoteAck> {
        let path = format!("/transactions/{}", Self::encode_segment(remote_id));
        let ack: AckDto = self
            .put_json(&path, &TransactionDto::from_domain(entity))
            .await?;
        Ok(ack.into_ack())
    }

    async fn delete(&self, remote_id: &str) -> RemoteResult<()> {
        let path = format!("/transactions/{}", Self::encode_segment(remote_id));
        Ok(self.delete_resource(&path).await?)
    }

    async fn fetch(&self, remote_id: &str) -> RemoteResult<Option<Transaction>> {
        let path = format!("/transactions/{}", Self::encode_segment(remote_id));
        let dto = Self::not_found_as_none(self.get_json::<TransactionDto>(&path, &[]).await)?;
        Ok(dto.map(TransactionDto::into_domain).transpose()?)
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        page: RemotePage,
    ) -> RemoteResult<RemoteBatch<Transaction>> {
        let path = format!("/owners/{}/transactions", Self::encode_segment(owner_id));
        let response: ListResponse<TransactionDto> = self
            .get_json(&path, &Self::list_query(filter, page))
            .await?;
        let items = response
            .items
            .into_iter()
            .map(TransactionDto::into_domain)
            .collect::<Result<Vec<_>>>()?;
        Ok(RemoteBatch {
            items,
            next_page: response.next_page,
            total: response.total,
        })
    }

    async fn summary(&self, owner_id: &str) -> RemoteResult<TransactionSummary> {
        let path = format!(
            "/owners/{}/transactions/summary",
            Self::encode_segment(owner_id)
        );
        Ok(self.get_json(&path, &[]).await?)
    }
}

#[async_trait]
impl RemoteApi<BudgetCategory> for ConnectClient {
    async fn create(&self, entity: &BudgetCategory) -> RemoteResult<RemoteAck> {
        let ack: AckDto = self
            .post_json("/budget-categories", &BudgetCategoryDto::from_domain(entity))
            .await?;
        Ok(ack.into_ack())
    }

    async fn update(&self, remote_id: &str, entity: &BudgetCategory) -> RemoteResult<RemoteAck> {
        let path = format!("/budget-categories/{}", Self::encode_segment(remote_id));
        let ack: AckDto = self
            .put_json(&path, &BudgetCategoryDto::from_domain(entity))
            .await?;
        Ok(ack.into_ack())
    }

    async fn delete(&self, remote_id: &str) -> RemoteResult<()> {
        let path = format!("/budget-categories/{}", Self::encode_segment(remote_id));
        Ok(self.delete_resource(&path).await?)
    }

    async fn fetch(&self, remote_id: &str) -> RemoteResult<Option<BudgetCategory>> {
        let path = format!("/budget-categories/{}", Self::encode_segment(remote_id));
        let dto = Self::not_found_as_none(self.get_json::<BudgetCategoryDto>(&path, &[]).await)?;
        Ok(dto.map(BudgetCategoryDto::into_domain).transpose()?)
    }

    async fn list_by_owner(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        page: RemotePage,
    ) -> RemoteResult<RemoteBatch<BudgetCategory>> {
        let path = format!(
            "/owners/{}/budget-categories",
            Self::encode_segment(owner_id)
        );
        let response: ListResponse<BudgetCategoryDto> = self
            .get_json(&path, &Self::list_query(filter, page))
            .await?;
        let items = response
            .items
            .into_iter()
            .map(BudgetCategoryDto::into_domain)
            .collect::<Result<Vec<_>>>()?;
        Ok(RemoteBatch {
            items,
            next_page: response.next_page,
            total: response.total,
        })
    }

    async fn summary(&self, owner_id: &str) -> RemoteResult<BudgetSummary> {
        let path = format!(
            "/owners/{}/budget-categories/summary",
            Self::encode_segment(owner_id)
        );
        Ok(self.get_json(&path, &[]).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn client() -> ConnectClient {
        ConnectClient::new(&ConnectConfig::new(
            "https://api.pocketledger.test/",
            "token-123",
        ))
    }

    #[test]
    fn base_url_is_normalized_and_versioned() {
        let subject = client();
        assert_eq!(
            subject.url("/cards"),
            "https://api.pocketledger.test/v1/cards"
        );
    }

    #[test]
    fn owner_segments_are_percent_encoded() {
        assert_eq!(
            ConnectClient::encode_segment("owner/1 a"),
            "owner%2F1%20a"
        );
    }

    #[test]
    fn list_query_carries_the_filter() {
        let filter = EntityFilter {
            date_from: NaiveDate::from_ymd_opt(2026, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2026, 1, 31),
            card_id: Some("card-1".to_string()),
            category_id: None,
            search: Some("coffee".to_string()),
        };
        let query = ConnectClient::list_query(&filter, RemotePage::first(20));
        assert!(query.contains(&("page", "1".to_string())));
        assert!(query.contains(&("pageSize", "20".to_string())));
        assert!(query.contains(&("dateFrom", "2026-01-01".to_string())));
        assert!(query.contains(&("cardId", "card-1".to_string())));
        assert!(query.contains(&("search", "coffee".to_string())));
        assert!(!query.iter().any(|(key, _)| *key == "categoryId"));
    }

    #[test]
    fn missing_resources_map_to_none() {
        let found: Result<u8> = Ok(7);
        assert_eq!(ConnectClient::not_found_as_none(found).unwrap(), Some(7));

        let missing: Result<u8> = Err(RemoteApiError::api(404, "no such record"));
        assert_eq!(ConnectClient::not_found_as_none(missing).unwrap(), None);

        let broken: Result<u8> = Err(RemoteApiError::api(500, "boom"));
        assert!(ConnectClient::not_found_as_none(broken).is_err());
    }

    #[test]
    fn bearer_header_is_attached() {
        let headers = client().headers().unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer token-123");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }
}
