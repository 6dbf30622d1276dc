//! Storage error types and conversion into the core taxonomy.

use pocketledger_core::errors::{DatabaseError, Error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),

    #[error("Writer unavailable: {0}")]
    Writer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let database = match err {
            StorageError::Query(inner) => DatabaseError::QueryFailed(inner.to_string()),
            StorageError::Pool(inner) => DatabaseError::ConnectionUnavailable(inner.to_string()),
            StorageError::Corrupt(message) => DatabaseError::Corrupt(message),
            StorageError::Migration(message) | StorageError::Writer(message) => {
                DatabaseError::Internal(message)
            }
            StorageError::Io(inner) => DatabaseError::Internal(inner.to_string()),
        };
        Error::Database(database)
    }
}
