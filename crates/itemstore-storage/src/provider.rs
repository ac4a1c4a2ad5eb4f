//! Storage provider trait and transaction interface

use crate::{CacheMode, Predicate, Result, Row, Selection, StoredRecord, StoredValue};
use itemstore_model::{Pk, TypeCode, TypeDefinition};
use std::collections::BTreeMap;

/// Pluggable storage provider interface
///
/// Every data operation runs inside a [`Transaction`]; the provider itself
/// only opens transactions and maintains storage structures.
pub trait StorageProvider: Send {
    // ========== Transactions ==========

    /// Begin a unit of work; writes become visible to others on commit
    fn begin_transaction(&mut self) -> Result<Box<dyn Transaction + '_>>;

    // ========== Schema ==========

    /// Drop and recreate the structures for the given types
    fn initialize_schema(&mut self, types: &[&TypeDefinition]) -> Result<()>;

    /// Create whatever structures are missing, keeping existing data
    fn update_schema(&mut self, types: &[&TypeDefinition]) -> Result<()>;

    /// Report structures the given types need but storage lacks
    fn validate_schema(&self, types: &[&TypeDefinition]) -> Result<Vec<SchemaIssue>>;

    // ========== Maintenance Operations ==========

    /// Drop every cached record
    fn evict_cache(&mut self);

    /// Compact storage (remove deleted entries, optimize layout)
    fn compact(&mut self) -> Result<()>;

    /// Get storage statistics
    fn stats(&self) -> Result<StorageStats>;

    /// Short description for log lines, e.g. `sqlite:/var/data/items.db`
    fn describe(&self) -> String;
}

/// A unit of work against a backend
///
/// Reads observe every write made earlier in the same transaction.
pub trait Transaction {
    // ========== Records ==========

    fn get(&self, pk: &Pk) -> Result<Option<StoredRecord>>;

    /// Insert or replace a record
    fn put(&mut self, record: StoredRecord) -> Result<()>;

    /// Delete a record; `false` when it did not exist
    fn delete(&mut self, pk: &Pk) -> Result<bool>;

    /// Number of stored records of a type
    fn count(&self, type_code: &TypeCode) -> Result<u64>;

    // ========== Identity ==========

    /// Highest id ever recorded for a type, zero if none
    fn high_water(&self, type_code: &TypeCode) -> Result<u64>;

    /// Raise the high-water mark of a type; never lowers it
    fn set_high_water(&mut self, type_code: &TypeCode, id: u64) -> Result<()>;

    // ========== Queries ==========

    /// Ids of the matching records, ordered and windowed
    fn select_ids(&self, selection: &Selection) -> Result<Vec<u64>>;

    /// Matching rows, ordered and windowed, projected as requested
    fn fetch(&self, selection: &Selection) -> Result<Vec<Row>>;

    /// Number of matching root records, ignoring the window
    fn count_matching(&self, selection: &Selection) -> Result<u64>;

    /// Assign values on every matching record; returns the affected count
    fn update_matching(
        &mut self,
        type_code: &TypeCode,
        predicate: Option<&Predicate>,
        assignments: &[(String, StoredValue)],
    ) -> Result<u64>;

    /// Delete every matching record; returns the affected count
    fn delete_matching(&mut self, type_code: &TypeCode, predicate: Option<&Predicate>)
        -> Result<u64>;

    // ========== Session ==========

    fn set_cache_mode(&mut self, mode: CacheMode);

    fn cache_mode(&self) -> CacheMode;

    /// Drop every entry of the shared record cache
    fn clear_cache(&mut self);

    /// Push buffered writes to the backend without committing
    fn flush(&mut self) -> Result<()>;

    /// Commit the transaction atomically
    fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction (discard all changes)
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// A storage structure a registered type needs but storage lacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub type_code: Option<TypeCode>,
    pub description: String,
}

impl SchemaIssue {
    pub fn new(type_code: Option<&TypeCode>, description: impl Into<String>) -> Self {
        Self {
            type_code: type_code.cloned(),
            description: description.into(),
        }
    }
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.type_code {
            Some(code) => write!(f, "[{}] {}", code, self.description),
            None => write!(f, "{}", self.description),
        }
    }
}

/// Storage statistics
#[derive(Debug, Clone, Default)]
pub struct StorageStats {
    pub records_by_type: BTreeMap<TypeCode, u64>,
}

impl StorageStats {
    pub fn total(&self) -> u64 {
        self.records_by_type.values().sum()
    }
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Storage Statistics:")?;
        writeln!(f, "  Total records: {}", self.total())?;
        for (code, count) in &self.records_by_type {
            writeln!(f, "  {}: {}", code, count)?;
        }
        Ok(())
    }
}
