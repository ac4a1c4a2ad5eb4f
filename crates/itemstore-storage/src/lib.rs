//! Itemstore Storage - Pluggable record storage for the persistence engine
//!
//! Backends store flattened item records keyed by primary key:
//! - In-memory (for testing)
//! - redb (embedded key-value store, one table per type code)
//! - SQLite (relational store with JSON record bodies and a link table)
//!
//! ## Architecture
//!
//! All reads and writes go through a [`Transaction`] opened on a
//! [`StorageProvider`]. A transaction sees its own uncommitted writes and
//! applies them atomically on commit. Queries are expressed as a
//! [`Selection`] over one type: predicate, ordering, window, projection
//! and eagerly fetched relation properties.

mod cache;
mod error;
mod kv;
mod memory;
mod predicate;
mod provider;
mod record;
mod redb_storage;
mod selection;
mod sqlite;

pub use cache::{CacheMode, RecordCache};
pub use error::{Result, StorageError};
pub use memory::InMemoryStorage;
pub use predicate::{compare_values, sort_values, CompareOp, Predicate};
pub use provider::{SchemaIssue, StorageProvider, StorageStats, Transaction};
pub use record::{now_millis, StoredRecord, StoredValue};
pub use redb_storage::RedbStorage;
pub use selection::{Column, Direction, FetchedRecord, Projection, Row, Selection, SortOrder, Window};
pub use sqlite::SqliteStorage;
