//! Error types for storage operations

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] redb::Error),

    #[error("Database creation error: {0}")]
    DatabaseCreation(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Compaction error: {0}")]
    Compaction(#[from] redb::CompactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Version conflict: expected {expected}, found {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Unsupported by this backend: {0}")]
    Unsupported(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// Classify a SQLite failure, surfacing constraint violations as such
    pub fn from_sqlite(error: rusqlite::Error) -> Self {
        if error.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            return StorageError::UniqueViolation(error.to_string());
        }
        StorageError::Sqlite(error)
    }
}
