//! The RemoteService boundary: backend CRUD plus owner-scoped listing and
//! aggregation.
//!
//! No retry lives behind this trait. Implementations surface every failure
//! as a classified `RemoteError`; the repository owns the retry policy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::RemoteError;
use crate::store::EntityFilter;
use crate::sync::Syncable;

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Acknowledgement for a remote write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAck {
    pub remote_id: String,
    pub updated_at_remote: DateTime<Utc>,
}

/// Page selector for remote listings (the backend pages by number).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemotePage {
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl RemotePage {
    pub fn first(page_size: u32) -> Self {
        Self { page: 1, page_size }
    }
}

/// One page of an owner-scoped remote listing, mapped to domain records.
#[derive(Debug, Clone)]
pub struct RemoteBatch<E> {
    pub items: Vec<E>,
    pub next_page: Option<u32>,
    pub total: Option<i64>,
}

#[async_trait]
pub trait RemoteApi<E: Syncable>: Send + Sync {
    async fn create(&self, entity: &E) -> RemoteResult<RemoteAck>;

    async fn update(&self, remote_id: &str, entity: &E) -> RemoteResult<RemoteAck>;

    async fn delete(&self, remote_id: &str) -> RemoteResult<()>;

    /// `Ok(None)` when the backend no longer knows the record.
    async fn fetch(&self, remote_id: &str) -> RemoteResult<Option<E>>;

    async fn list_by_owner(
        &self,
        owner_id: &str,
        filter: &EntityFilter,
        page: RemotePage,
    ) -> RemoteResult<RemoteBatch<E>>;

    /// Backend-side aggregate over the owner's records.
    async fn summary(&self, owner_id: &str) -> RemoteResult<E::Summary>;
}
