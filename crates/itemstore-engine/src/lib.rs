//! Itemstore Engine - Persistence of typed item graphs
//!
//! The engine saves, loads and queries items over a pluggable storage
//! backend:
//! - [`ItemStore`] cascades saves through item graphs and rebuilds items
//!   from stored records
//! - [`QueryEngine`] compiles statements and filters onto backend
//!   selections, handling pagination and eager fetching
//! - [`TransactionCoordinator`] binds one backend session per unit of work
//! - [`PersistenceService`] ties them together behind one facade
//!
//! ## Example
//!
//! ```ignore
//! let service = PersistenceService::in_memory(registry)?;
//! let user = service.create("user")?;
//! user.set("email", "ada@example.com")?;
//! service.save(&user)?;
//!
//! let page: QueryResult<ItemRef> = service.query(
//!     &QueryRequest::statement("SELECT * FROM user WHERE email LIKE :domain")
//!         .param("domain", "%@example.com")
//!         .page(1, 20),
//! )?;
//! ```

mod config;
mod error;
mod identity;
pub mod logging;
mod mapping;
mod proxy;
pub mod query;
mod service;
mod session;
mod store;
mod transaction;
mod unique;

pub use config::{
    BackendKind, EngineSettings, LoggingConfig, PersistenceConfig, SchemaConfig, StorageConfig,
};
pub use error::{PersistenceError, Result};
pub use identity::IdentityAllocator;
pub use proxy::ProxyManager;
pub use query::{FromQueryRow, QueryEngine, QueryRequest, QueryResult, QueryRow, Record, Tuple};
pub use service::PersistenceService;
pub use session::Session;
pub use store::ItemStore;
pub use transaction::{Context, TransactionCoordinator, UnitOfWork};
pub use unique::UniquenessValidator;
