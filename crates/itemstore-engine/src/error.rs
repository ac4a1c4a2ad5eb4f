//! Engine error taxonomy

use itemstore_model::ModelError;
use itemstore_query::ParseError;
use itemstore_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Errors surfaced by the persistence engine
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Item not found: {0}")]
    ModelNotFound(String),

    #[error("Could not save item: {message}")]
    ModelSave {
        message: String,
        #[source]
        cause: Option<StorageError>,
    },

    #[error("Item is not unique: {0}")]
    ModelNotUnique(String),

    #[error("Query failed: {message}")]
    Query {
        message: String,
        #[source]
        cause: Option<StorageError>,
    },

    #[error("Invalid query: {0}")]
    Parse(#[from] ParseError),

    #[error("Cannot create proxy: {0}")]
    CannotCreateModelProxy(String),

    #[error("Invalid item: {0}")]
    Model(ModelError),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),
}

impl PersistenceError {
    /// Get the error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            PersistenceError::UnknownType(_) => "E-PS-001",
            PersistenceError::ModelNotFound(_) => "E-PS-002",
            PersistenceError::ModelSave { .. } => "E-PS-003",
            PersistenceError::ModelNotUnique(_) => "E-PS-004",
            PersistenceError::Query { .. } => "E-PS-005",
            PersistenceError::Parse(_) => "E-PS-006",
            PersistenceError::CannotCreateModelProxy(_) => "E-PS-007",
            PersistenceError::Model(_) => "E-PS-008",
            PersistenceError::Transaction(_) => "E-PS-009",
            PersistenceError::Config(_) => "E-PS-010",
            PersistenceError::Storage(_) => "E-PS-999",
        }
    }

    pub fn save(message: impl Into<String>) -> Self {
        PersistenceError::ModelSave {
            message: message.into(),
            cause: None,
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        PersistenceError::Query {
            message: message.into(),
            cause: None,
        }
    }

    /// Classify a backend failure raised while writing
    pub fn on_write(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(what) => PersistenceError::ModelNotFound(what),
            StorageError::UniqueViolation(what) => PersistenceError::ModelNotUnique(what),
            other => PersistenceError::ModelSave {
                message: other.to_string(),
                cause: Some(other),
            },
        }
    }

    /// Classify a backend failure raised while reading or querying
    pub fn on_query(error: StorageError) -> Self {
        match error {
            StorageError::NotFound(what) => PersistenceError::ModelNotFound(what),
            StorageError::UniqueViolation(what) => PersistenceError::ModelNotUnique(what),
            other => PersistenceError::Query {
                message: other.to_string(),
                cause: Some(other),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::ModelNotFound(_))
    }
}

impl From<ModelError> for PersistenceError {
    fn from(error: ModelError) -> Self {
        match error {
            ModelError::UnknownType(name) => PersistenceError::UnknownType(name),
            ModelError::Removed(pk) => PersistenceError::ModelNotFound(format!("{} was removed", pk)),
            other => PersistenceError::Model(other),
        }
    }
}
