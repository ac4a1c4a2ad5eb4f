//! Units of work and the coordinator that binds them to a backend session

use crate::query::{FromQueryRow, QueryEngine, QueryRequest, QueryResult};
use crate::session::Session;
use crate::store::ItemStore;
use crate::{EngineSettings, IdentityAllocator, PersistenceError, ProxyManager, Result};
use itemstore_model::{ItemRef, TypeRegistry, Value};
use itemstore_storage::StorageProvider;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};

/// Shared engine state every component of a unit of work reads
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub registry: &'a TypeRegistry,
    pub allocator: &'a IdentityAllocator,
    pub settings: EngineSettings,
}

/// Runs units of work, one bound session at a time
///
/// The provider lock serializes units of work across threads. A thread
/// that already has a session bound may not open a second one; nested
/// work goes through [`UnitOfWork::nested`] instead.
pub struct TransactionCoordinator {
    provider: Mutex<Box<dyn StorageProvider>>,
    bound: Mutex<Option<ThreadId>>,
}

struct Binding<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for Binding<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TransactionCoordinator {
    pub fn new(provider: Box<dyn StorageProvider>) -> Self {
        Self {
            provider: Mutex::new(provider),
            bound: Mutex::new(None),
        }
    }

    /// Bind a session, run `f`, then commit or roll back
    ///
    /// The session commits only when `f` succeeds and no write failed
    /// along the way; otherwise every change is discarded.
    pub fn run<T>(&self, f: impl FnOnce(&mut Session<'_>) -> Result<T>) -> Result<T> {
        let current = thread::current().id();
        if *self.bound.lock().unwrap_or_else(PoisonError::into_inner) == Some(current) {
            return Err(PersistenceError::Transaction(
                "a unit of work is already bound to this thread; use nested()".into(),
            ));
        }

        let mut provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        *self.bound.lock().unwrap_or_else(PoisonError::into_inner) = Some(current);
        let _binding = Binding(&self.bound);

        let txn = provider
            .begin_transaction()
            .map_err(PersistenceError::Storage)?;
        let mut session = Session::new(txn);
        match f(&mut session) {
            Ok(value) if !session.is_rollback_only() => {
                session.commit()?;
                Ok(value)
            }
            Ok(_) => {
                session.rollback();
                Err(PersistenceError::Transaction(
                    "unit of work was marked rollback-only after a failed write".into(),
                ))
            }
            Err(e) => {
                session.rollback();
                Err(e)
            }
        }
    }

    /// Exclusive access to the provider outside any unit of work
    pub fn with_provider<T>(&self, f: impl FnOnce(&mut dyn StorageProvider) -> T) -> T {
        let mut provider = self.provider.lock().unwrap_or_else(PoisonError::into_inner);
        f(provider.as_mut())
    }
}

/// The explicit handle every engine operation runs through
pub struct UnitOfWork<'s, 't> {
    ctx: Context<'s>,
    session: &'s mut Session<'t>,
}

impl<'s, 't> UnitOfWork<'s, 't> {
    pub fn new(ctx: Context<'s>, session: &'s mut Session<'t>) -> Self {
        Self { ctx, session }
    }

    fn store(&self) -> ItemStore<'s> {
        ItemStore::new(self.ctx)
    }

    pub fn create(&self, type_code: &str) -> Result<ItemRef> {
        self.store().create(type_code)
    }

    pub fn save(&mut self, item: &ItemRef) -> Result<()> {
        self.store().save(self.session, item)
    }

    pub fn save_all(&mut self, items: &[ItemRef]) -> Result<()> {
        self.store().save_all(self.session, items)
    }

    pub fn get(&mut self, type_code: &str, id: u64) -> Result<ItemRef> {
        self.store().load(self.session, type_code, id)
    }

    /// A lazy reference to a stored item; see [`ItemStore::load_proxy`]
    pub fn get_proxy(&self, type_code: &str, id: u64) -> Result<ItemRef> {
        self.store().load_proxy(type_code, id)
    }

    pub fn find(&mut self, type_code: &str, filter: &BTreeMap<String, Value>) -> Result<Vec<ItemRef>> {
        self.store().find(self.session, type_code, filter)
    }

    pub fn query<T: FromQueryRow>(&mut self, request: &QueryRequest) -> Result<QueryResult<T>> {
        QueryEngine::new(self.ctx).execute(self.session, request)
    }

    pub fn remove(&mut self, item: &ItemRef) -> Result<()> {
        self.store().remove(self.session, item)
    }

    pub fn remove_by_pk(&mut self, type_code: &str, id: u64) -> Result<()> {
        self.store().remove_by_pk(self.session, type_code, id)
    }

    pub fn remove_all(&mut self, items: &[ItemRef]) -> Result<()> {
        items.iter().try_for_each(|item| self.remove(item))
    }

    pub fn attach(&mut self, item: &ItemRef) -> Result<bool> {
        self.store().attach(self.session, item)
    }

    pub fn detach(&mut self, item: &ItemRef) -> bool {
        match item.pk() {
            Some(pk) => self.session.detach(&pk),
            None => false,
        }
    }

    pub fn is_attached(&self, item: &ItemRef) -> bool {
        item.pk().is_some_and(|pk| self.session.is_attached(&pk))
    }

    pub fn refresh(&mut self, item: &ItemRef) -> Result<()> {
        self.store().refresh(self.session, item)
    }

    pub fn refresh_all(&mut self, items: &[ItemRef]) -> Result<()> {
        items.iter().try_for_each(|item| self.refresh(item))
    }

    pub fn load_proxy_model(&mut self, item: &ItemRef) -> Result<()> {
        ProxyManager::resolve(self.session, item)?;
        if let Some(pk) = item.pk() {
            self.session.attach(pk);
        }
        Ok(())
    }

    /// Push buffered writes to the backend without committing
    pub fn flush(&mut self) -> Result<()> {
        self.session.flush()
    }

    /// Run more work inside this unit of work's session
    pub fn nested<T>(&mut self, f: impl FnOnce(&mut UnitOfWork<'s, 't>) -> Result<T>) -> Result<T> {
        f(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemstore_model::Pk;
    use itemstore_storage::{InMemoryStorage, StoredRecord};

    fn coordinator() -> TransactionCoordinator {
        TransactionCoordinator::new(Box::new(InMemoryStorage::new()))
    }

    #[test]
    fn test_commit_on_success() {
        let coordinator = coordinator();
        coordinator
            .run(|session| session.write(|txn| txn.put(StoredRecord::new(Pk::new(1, "user")))))
            .unwrap();
        let found = coordinator
            .run(|session| session.read(|txn| txn.get(&Pk::new(1, "user"))))
            .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_error_rolls_back() {
        let coordinator = coordinator();
        let result: Result<()> = coordinator.run(|session| {
            session.write(|txn| txn.put(StoredRecord::new(Pk::new(1, "user"))))?;
            Err(PersistenceError::save("boom"))
        });
        assert!(result.is_err());
        let found = coordinator
            .run(|session| session.read(|txn| txn.get(&Pk::new(1, "user"))))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_swallowed_write_failure_still_rolls_back() {
        let coordinator = coordinator();
        let result = coordinator.run(|session| {
            session.write(|txn| txn.put(StoredRecord::new(Pk::new(1, "user"))))?;
            session.mark_rollback_only();
            Ok(())
        });
        assert!(matches!(result, Err(PersistenceError::Transaction(_))));
    }

    #[test]
    fn test_reentrant_run_is_rejected() {
        let coordinator = coordinator();
        let inner = coordinator.run(|_| Ok(coordinator.run(|_| Ok(()))));
        assert!(matches!(inner, Ok(Err(PersistenceError::Transaction(_)))));
        // The binding is released afterwards
        assert!(coordinator.run(|_| Ok(())).is_ok());
    }
}
