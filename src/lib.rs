//! Itemstore - A generic persistence engine for typed items
//!
//! This is the root workspace crate that hosts the cross-backend
//! integration tests. The implementation lives in the member crates.

// Re-export main crates for convenience
pub use itemstore_engine as engine;
pub use itemstore_model as model;
pub use itemstore_query as query;
pub use itemstore_storage as storage;

pub use itemstore_engine::{PersistenceConfig, PersistenceError, PersistenceService, QueryRequest};
