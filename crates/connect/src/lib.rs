//! HTTP remote service client for the pocketledger backend.
//!
//! Implements the core `RemoteApi` boundary over a resource-oriented REST
//! API. No retry lives here; every failure maps to the core's classified
//! `RemoteError` and the repository decides what to do with it.

mod client;
mod error;
mod types;

pub use client::ConnectClient;
pub use error::{ApiErrorResponse, RemoteApiError, Result};
pub use types::{AckDto, BudgetCategoryDto, CardDto, ConnectConfig, ListResponse, TransactionDto};
