//! Error types for the connect client.

use pocketledger_core::errors::RemoteError;
use serde::Deserialize;
use thiserror::Error;

/// Result type alias for connect operations.
pub type Result<T> = std::result::Result<T, RemoteApiError>;

/// Structured error body returned by the backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}

/// Errors raised while talking to the backend API.
#[derive(Debug, Error)]
pub enum RemoteApiError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API error response from the backend
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid request (missing required data, unmappable payload)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteApiError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<RemoteApiError> for RemoteError {
    fn from(err: RemoteApiError) -> Self {
        match err {
            RemoteApiError::Http(inner) => RemoteError::Network(inner.to_string()),
            RemoteApiError::Json(inner) => {
                RemoteError::Validation(format!("Malformed response: {}", inner))
            }
            RemoteApiError::Api { status, message } => match status {
                401 | 403 => RemoteError::Auth(message),
                400 | 422 => RemoteError::Validation(message),
                _ => RemoteError::Api { status, message },
            },
            RemoteApiError::InvalidRequest(message) => RemoteError::Validation(message),
            RemoteApiError::Auth(message) => RemoteError::Auth(message),
        }
    }
}
