//! Storage-level errors and their mapping into core errors.

use thiserror::Error;
use wellsync_core::errors::{DatabaseError, Error};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Connection failed: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value that no longer parses into a domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        let db_error = match err {
            StorageError::Query(diesel::result::Error::NotFound) => {
                DatabaseError::NotFound("Record not found".to_string())
            }
            StorageError::Query(e) => DatabaseError::QueryFailed(e.to_string()),
            StorageError::Pool(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::Connection(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::Migration(message) => DatabaseError::MigrationFailed(message),
            StorageError::Serialization(e) => DatabaseError::Internal(e.to_string()),
            StorageError::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            StorageError::Corrupt(message) => DatabaseError::Internal(message),
        };
        Error::Database(db_error)
    }
}
