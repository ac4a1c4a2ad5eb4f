//! The engine facade

use crate::logging::{logged, LogSpec};
use crate::query::{FromQueryRow, QueryRequest, QueryResult};
use crate::transaction::{Context, TransactionCoordinator, UnitOfWork};
use crate::{
    EngineSettings, IdentityAllocator, PersistenceConfig, PersistenceError, Result, SchemaConfig,
};
use itemstore_model::{ItemRef, TypeRegistry, Value};
use itemstore_storage::{SchemaIssue, StorageProvider, StorageStats};
use std::collections::BTreeMap;
use tracing::Level;

/// Persistence engine over one storage backend
///
/// Every method runs as its own unit of work. Use [`execute`] to group
/// several operations into one transaction.
///
/// [`execute`]: PersistenceService::execute
pub struct PersistenceService {
    registry: TypeRegistry,
    allocator: IdentityAllocator,
    coordinator: TransactionCoordinator,
    settings: EngineSettings,
    backend: String,
}

impl PersistenceService {
    /// Open the configured backend and provision its schema
    pub fn open(config: &PersistenceConfig, registry: TypeRegistry) -> Result<Self> {
        Self::with_provider(config.open_backend()?, registry, config)
    }

    pub fn in_memory(registry: TypeRegistry) -> Result<Self> {
        Self::open(&PersistenceConfig::memory(), registry)
    }

    pub fn with_provider(
        provider: Box<dyn StorageProvider>,
        registry: TypeRegistry,
        config: &PersistenceConfig,
    ) -> Result<Self> {
        let backend = provider.describe();
        let service = Self {
            registry,
            allocator: IdentityAllocator::new(),
            coordinator: TransactionCoordinator::new(provider),
            settings: config.settings(),
            backend,
        };

        let spec = LogSpec::new(Level::INFO)
            .message("$classSimpleName starting on {} with {} types")
            .arg(&service.backend)
            .arg(service.registry.len());
        logged(&spec, Self::component(), "open", || {
            service.provision(&config.schema)
        })?;
        Ok(service)
    }

    fn component() -> &'static str {
        std::any::type_name::<Self>()
    }

    fn context(&self) -> Context<'_> {
        Context {
            registry: &self.registry,
            allocator: &self.allocator,
            settings: self.settings,
        }
    }

    fn timed(&self) -> LogSpec {
        LogSpec::timed(Level::DEBUG, self.settings.slow_operation)
    }

    fn provision(&self, schema: &SchemaConfig) -> Result<()> {
        let defs = self.registry.definitions();
        self.coordinator.with_provider(|provider| -> Result<()> {
            if schema.initialize {
                provider
                    .initialize_schema(&defs)
                    .map_err(PersistenceError::Storage)?;
                self.allocator.reset();
                tracing::info!("Initialized schema for {} types on {}", defs.len(), self.backend);
            } else if schema.update {
                provider
                    .update_schema(&defs)
                    .map_err(PersistenceError::Storage)?;
                tracing::debug!("Updated schema for {} types", defs.len());
            }

            if schema.validate {
                let issues = provider
                    .validate_schema(&defs)
                    .map_err(PersistenceError::Storage)?;
                for issue in &issues {
                    if schema.initialize {
                        tracing::debug!("Schema issue after initialization: {}", issue);
                    } else {
                        tracing::warn!("Schema issue: {}", issue);
                    }
                }
                if issues.is_empty() {
                    tracing::debug!("Schema is valid");
                }
            }
            Ok(())
        })
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Backend description, e.g. `sqlite:/var/data/items.db`
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Run `f` as one unit of work: committed if it succeeds, rolled back
    /// otherwise
    ///
    /// Inside `f`, go through the [`UnitOfWork`] methods. The shortcuts on
    /// this service open a unit of work of their own, so calling one from
    /// `f` fails with [`PersistenceError::Transaction`] instead of joining
    /// the bound session.
    pub fn execute<T>(&self, f: impl FnOnce(&mut UnitOfWork<'_, '_>) -> Result<T>) -> Result<T> {
        let ctx = self.context();
        self.coordinator
            .run(|session| f(&mut UnitOfWork::new(ctx, session)))
    }

    pub fn create(&self, type_code: &str) -> Result<ItemRef> {
        crate::ItemStore::new(self.context()).create(type_code)
    }

    pub fn save(&self, item: &ItemRef) -> Result<()> {
        logged(&self.timed(), Self::component(), "save", || {
            self.execute(|uow| uow.save(item))
        })
    }

    pub fn save_all(&self, items: &[ItemRef]) -> Result<()> {
        logged(&self.timed(), Self::component(), "save_all", || {
            self.execute(|uow| uow.save_all(items))
        })
    }

    pub fn get(&self, type_code: &str, id: u64) -> Result<ItemRef> {
        self.execute(|uow| uow.get(type_code, id))
    }

    /// A proxy for a stored item, resolved on first use
    pub fn get_proxy(&self, type_code: &str, id: u64) -> Result<ItemRef> {
        crate::ItemStore::new(self.context()).load_proxy(type_code, id)
    }

    /// Items whose properties equal every value in `filter`
    pub fn find(&self, type_code: &str, filter: &BTreeMap<String, Value>) -> Result<Vec<ItemRef>> {
        self.execute(|uow| uow.find(type_code, filter))
    }

    pub fn query<T: FromQueryRow>(&self, request: &QueryRequest) -> Result<QueryResult<T>> {
        self.execute(|uow| uow.query(request))
    }

    pub fn remove(&self, item: &ItemRef) -> Result<()> {
        self.execute(|uow| uow.remove(item))
    }

    pub fn remove_by_pk(&self, type_code: &str, id: u64) -> Result<()> {
        self.execute(|uow| uow.remove_by_pk(type_code, id))
    }

    /// Remove every item, or none of them
    pub fn remove_all(&self, items: &[ItemRef]) -> Result<()> {
        self.execute(|uow| uow.remove_all(items))
    }

    pub fn attach(&self, item: &ItemRef) -> Result<bool> {
        self.execute(|uow| uow.attach(item))
    }

    pub fn refresh(&self, item: &ItemRef) -> Result<()> {
        self.execute(|uow| uow.refresh(item))
    }

    /// Reload every item from storage in one unit of work
    ///
    /// Stops at the first item without a stored record; items before it
    /// keep their reloaded state.
    pub fn refresh_all(&self, items: &[ItemRef]) -> Result<()> {
        self.execute(|uow| uow.refresh_all(items))
    }

    pub fn load_proxy_model(&self, item: &ItemRef) -> Result<()> {
        self.execute(|uow| uow.load_proxy_model(item))
    }

    /// Drop every record the backend has cached
    pub fn evict_caches(&self) {
        self.coordinator.with_provider(|provider| provider.evict_cache());
    }

    pub fn stats(&self) -> Result<StorageStats> {
        self.coordinator
            .with_provider(|provider| provider.stats())
            .map_err(PersistenceError::Storage)
    }

    pub fn validate_schema(&self) -> Result<Vec<SchemaIssue>> {
        let defs = self.registry.definitions();
        self.coordinator
            .with_provider(|provider| provider.validate_schema(&defs))
            .map_err(PersistenceError::Storage)
    }

    /// Drop all stored items and recreate storage structures
    pub fn initialize_schema(&self) -> Result<()> {
        self.provision(&SchemaConfig {
            initialize: true,
            update: false,
            validate: false,
        })
    }

    pub fn compact(&self) -> Result<()> {
        self.coordinator
            .with_provider(|provider| provider.compact())
            .map_err(PersistenceError::Storage)
    }
}
