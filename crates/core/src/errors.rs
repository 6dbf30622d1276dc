//! Error taxonomy for the cache and sync core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Retry policy class for remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Local storage failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("Storage query failed: {0}")]
    QueryFailed(String),

    #[error("Storage connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("Storage internal error: {0}")]
    Internal(String),
}

/// Remote service failures, classified for the repository's retry policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Transient transport failure (timeout, connection refused).
    #[error("Network error: {0}")]
    Network(String),

    /// Missing or rejected credentials.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The backend rejected the payload; retrying cannot help.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Any other API error response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl RemoteError {
    /// Classify for the bounded-retry push policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Network(_) => RetryClass::Retryable,
            Self::Auth(_) => RetryClass::ReauthRequired,
            Self::Validation(_) => RetryClass::Permanent,
            Self::Api { status, .. } => match *status {
                401 | 403 => RetryClass::ReauthRequired,
                408 | 409 | 423 | 425 | 429 => RetryClass::Retryable,
                500..=599 => RetryClass::Retryable,
                _ => RetryClass::Permanent,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class() == RetryClass::Retryable
    }
}

/// Top-level error for repository, store and pagination operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Unexpected(format!("Serialization failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_partitions_http_statuses() {
        let retryable = RemoteError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        let permanent = RemoteError::Api {
            status: 400,
            message: "bad request".to_string(),
        };
        let reauth = RemoteError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(retryable.retry_class(), RetryClass::Retryable);
        assert_eq!(permanent.retry_class(), RetryClass::Permanent);
        assert_eq!(reauth.retry_class(), RetryClass::ReauthRequired);
    }

    #[test]
    fn network_errors_are_retryable_and_validation_is_not() {
        assert!(RemoteError::Network("timeout".to_string()).is_retryable());
        assert!(!RemoteError::Validation("bad amount".to_string()).is_retryable());
        assert!(!RemoteError::Auth("expired".to_string()).is_retryable());
    }
}
