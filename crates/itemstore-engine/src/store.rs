//! Cascading save, load, refresh and removal of items

use crate::mapping::{self, Related};
use crate::session::Session;
use crate::transaction::Context;
use crate::unique::UniquenessValidator;
use crate::{PersistenceError, Result};
use itemstore_model::{Item, ItemRef, Lifecycle, Pk, TypeDefinition, Value};
use itemstore_storage::{
    now_millis, Predicate, Row, Selection, SortOrder, StorageError, StoredRecord,
};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

pub struct ItemStore<'a> {
    ctx: Context<'a>,
}

impl<'a> ItemStore<'a> {
    pub fn new(ctx: Context<'a>) -> Self {
        Self { ctx }
    }

    /// Transient item with every collection-valued property set empty
    pub fn create(&self, type_code: &str) -> Result<ItemRef> {
        let def = self.ctx.registry.resolve(type_code)?;
        let item = def
            .properties()
            .iter()
            .filter_map(|p| p.value_type.empty_collection().map(|empty| (&p.name, empty)))
            .fold(Item::new(def.type_code()), |item, (name, empty)| {
                item.with(name, empty)
            });
        Ok(ItemRef::new(item))
    }

    /// Save an item and every unsaved item it references
    ///
    /// Any failure leaves the session rollback-only; rolling back restores
    /// the in-memory state of every item touched here.
    pub fn save(&self, session: &mut Session<'_>, item: &ItemRef) -> Result<()> {
        let mut in_progress = HashSet::new();
        let result = self.save_graph(session, item, &mut in_progress);
        if result.is_err() {
            session.mark_rollback_only();
        }
        result
    }

    pub fn save_all(&self, session: &mut Session<'_>, items: &[ItemRef]) -> Result<()> {
        let batch_size = self.ctx.settings.batch_size;
        let start = Instant::now();
        for (index, item) in items.iter().enumerate() {
            self.save(session, item)?;
            if (index + 1) % batch_size == 0 {
                session.flush()?;
                tracing::debug!("Flushed {} of {} items", index + 1, items.len());
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            tracing::debug!(
                "Saved {} items in {} ms ({:.0} items/s)",
                items.len(),
                elapsed.as_millis(),
                items.len() as f64 / elapsed.as_secs_f64()
            );
        }
        Ok(())
    }

    fn save_graph(
        &self,
        session: &mut Session<'_>,
        item: &ItemRef,
        in_progress: &mut HashSet<usize>,
    ) -> Result<()> {
        // Cycles come back here through an item already being saved
        if !in_progress.insert(item.identity()) {
            return Ok(());
        }

        let (type_code, lifecycle, is_proxy, dirty, pk) = {
            let guard = item.read();
            (
                guard.type_code().clone(),
                guard.lifecycle(),
                guard.is_proxy(),
                guard.is_dirty(),
                guard.pk().cloned(),
            )
        };
        match lifecycle {
            Lifecycle::Removed => {
                return Err(PersistenceError::ModelNotFound(format!(
                    "{} was removed",
                    describe(&type_code, pk.as_ref())
                )))
            }
            Lifecycle::Persisted if is_proxy || !dirty => return Ok(()),
            _ => {}
        }

        let def = self.ctx.registry.resolve(&type_code)?;
        let properties = item.read().properties().cloned().unwrap_or_default();
        mapping::validate(def, &properties)?;

        if lifecycle == Lifecycle::Transient {
            if let Some(set) = UniquenessValidator::new(def).find_collision(session.txn(), &properties)? {
                return Err(PersistenceError::ModelNotUnique(format!(
                    "{} with the same {} already exists",
                    def.name(),
                    set.join(", ")
                )));
            }
        }

        session.remember(item);
        let pk = match pk {
            Some(pk) => pk,
            None => {
                let pk = self.ctx.allocator.next_pk(session.txn_mut(), def.type_code())?;
                item.write().assign_pk(pk.clone())?;
                pk
            }
        };

        for (name, value) in &properties {
            let writable = def.property(name).is_some_and(|p| p.flags.writable);
            if !writable {
                continue;
            }
            match value {
                Value::Item(child) => self.save_graph(session, child, in_progress)?,
                Value::List(values) => {
                    for child in values.iter().filter_map(Value::as_item) {
                        self.save_graph(session, child, in_progress)?;
                    }
                }
                // Map values are not cascaded
                _ => {}
            }
        }

        let stored = mapping::flatten(def, &properties)?;
        let record = match lifecycle {
            Lifecycle::Persisted => {
                let existing = session
                    .read(|txn| txn.get(&pk))?
                    .ok_or_else(|| PersistenceError::ModelNotFound(pk.to_string()))?;
                let current = item.read().version();
                if current != Some(existing.version) {
                    return Err(PersistenceError::ModelSave {
                        message: format!("{} was modified concurrently", pk),
                        cause: Some(StorageError::VersionConflict {
                            expected: current.unwrap_or(0),
                            actual: existing.version,
                        }),
                    });
                }
                check_initial(def, &existing, &stored)?;
                StoredRecord {
                    pk: pk.clone(),
                    version: existing.version + 1,
                    created_at: existing.created_at,
                    modified_at: now_millis(),
                    properties: stored,
                }
            }
            _ => {
                let mut record = StoredRecord::new(pk.clone());
                record.properties = stored;
                record
            }
        };

        let (version, created_at, modified_at) =
            (record.version, record.created_at, record.modified_at);
        session.write(|txn| txn.put(record))?;
        item.write().mark_persisted(
            version,
            mapping::timestamp_from_millis(created_at)?,
            mapping::timestamp_from_millis(modified_at)?,
        );
        session.attach(pk);
        Ok(())
    }

    /// Load one item by primary key
    pub fn load(&self, session: &mut Session<'_>, type_code: &str, id: u64) -> Result<ItemRef> {
        let def = self.ctx.registry.resolve(type_code)?;
        let pk = Pk::new(id, def.type_code());
        let record = session
            .read(|txn| txn.get(&pk))?
            .ok_or_else(|| PersistenceError::ModelNotFound(pk.to_string()))?;
        let item = ItemRef::new(mapping::rehydrate(&record, &Related::new())?);
        session.attach(pk);
        Ok(item)
    }

    /// A proxy for `type_code`/`id` without touching storage
    ///
    /// Whether the record exists is only known once the proxy is resolved.
    pub fn load_proxy(&self, type_code: &str, id: u64) -> Result<ItemRef> {
        let def = self.ctx.registry.resolve(type_code)?;
        Ok(ItemRef::new(Item::proxy(Pk::new(id, def.type_code()))))
    }

    /// Every item whose properties equal all the given values
    ///
    /// Records that fail to rehydrate are skipped with a warning.
    pub fn find(
        &self,
        session: &mut Session<'_>,
        type_code: &str,
        filter: &BTreeMap<String, Value>,
    ) -> Result<Vec<ItemRef>> {
        let def = self.ctx.registry.resolve(type_code)?;
        let mut conditions = Vec::with_capacity(filter.len());
        for (name, value) in filter {
            check_filter_property(def, name)?;
            let stored = mapping::stored_scalar(value).ok_or_else(|| {
                PersistenceError::query(format!(
                    "filter value for '{}' must be a scalar or a saved item",
                    name
                ))
            })?;
            conditions.push((name.clone(), stored));
        }

        let selection = Selection::new(def.type_code())
            .with_predicate(Some(Predicate::all_equal(conditions)))
            .with_order(SortOrder::default_order());
        let rows = session.read(|txn| txn.fetch(&selection))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let Row::Record(fetched) = row else { continue };
            match mapping::rehydrate(&fetched.record, &Related::new()) {
                Ok(item) => {
                    session.attach(fetched.record.pk.clone());
                    items.push(ItemRef::new(item));
                }
                Err(e) => tracing::warn!("Skipping {}: {}", fetched.record.pk, e),
            }
        }
        Ok(items)
    }

    /// Reload an item from storage, discarding in-memory changes
    pub fn refresh(&self, session: &mut Session<'_>, item: &ItemRef) -> Result<()> {
        item.write().clear_dirty();
        crate::ProxyManager::resolve(session, item)?;
        if let Some(pk) = item.pk() {
            session.attach(pk);
        }
        Ok(())
    }

    pub fn remove(&self, session: &mut Session<'_>, item: &ItemRef) -> Result<()> {
        let (pk, lifecycle) = {
            let guard = item.read();
            (guard.pk().cloned(), guard.lifecycle())
        };
        let pk = match (pk, lifecycle) {
            (Some(pk), Lifecycle::Persisted) => pk,
            (pk, _) => {
                return Err(PersistenceError::ModelNotFound(format!(
                    "{} has no stored record",
                    describe(&item.type_code(), pk.as_ref())
                )))
            }
        };

        session.remember(item);
        self.delete(session, &pk)?;
        item.write().mark_removed();
        Ok(())
    }

    pub fn remove_by_pk(&self, session: &mut Session<'_>, type_code: &str, id: u64) -> Result<()> {
        let def = self.ctx.registry.resolve(type_code)?;
        self.delete(session, &Pk::new(id, def.type_code()))
    }

    fn delete(&self, session: &mut Session<'_>, pk: &Pk) -> Result<()> {
        if !session.write(|txn| txn.delete(pk))? {
            return Err(PersistenceError::ModelNotFound(pk.to_string()));
        }
        session.detach(pk);
        Ok(())
    }

    /// Re-associate an instance with the session
    ///
    /// Returns `true` when it was not attached already.
    pub fn attach(&self, session: &mut Session<'_>, item: &ItemRef) -> Result<bool> {
        let (pk, lifecycle) = {
            let guard = item.read();
            (guard.pk().cloned(), guard.lifecycle())
        };
        let pk = match (pk, lifecycle) {
            (Some(pk), Lifecycle::Persisted) => pk,
            (pk, _) => {
                return Err(PersistenceError::ModelNotFound(format!(
                    "{} cannot be attached",
                    describe(&item.type_code(), pk.as_ref())
                )))
            }
        };
        if session.read(|txn| txn.get(&pk))?.is_none() {
            return Err(PersistenceError::ModelNotFound(pk.to_string()));
        }
        Ok(session.attach(pk))
    }
}

fn describe(type_code: &str, pk: Option<&Pk>) -> String {
    match pk {
        Some(pk) => pk.to_string(),
        None => format!("unsaved {} item", type_code),
    }
}

fn check_filter_property(def: &TypeDefinition, name: &str) -> Result<()> {
    if itemstore_model::RESERVED_PROPERTIES.contains(&name) || def.property(name).is_some() {
        return Ok(());
    }
    Err(PersistenceError::query(format!(
        "unknown property '{}' on {}",
        name,
        def.name()
    )))
}

/// Set-once properties must keep their first saved value
fn check_initial(
    def: &TypeDefinition,
    existing: &StoredRecord,
    updated: &BTreeMap<String, itemstore_storage::StoredValue>,
) -> Result<()> {
    for property in def.properties().iter().filter(|p| p.flags.initial) {
        let before = existing.field(&property.name);
        let after = updated
            .get(&property.name)
            .cloned()
            .unwrap_or(itemstore_storage::StoredValue::Null);
        if before != after {
            return Err(PersistenceError::save(format!(
                "{}.{} cannot change after the first save",
                def.name(),
                property.name
            )));
        }
    }
    Ok(())
}
