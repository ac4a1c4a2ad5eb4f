//! In-memory storage implementation for testing

use crate::kv::{Changes, KvBackend, KvTransaction};
use crate::{
    RecordCache, Result, SchemaIssue, StorageProvider, StorageStats, StoredRecord, Transaction,
};
use itemstore_model::{Pk, TypeCode, TypeDefinition};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

type Tables = HashMap<TypeCode, BTreeMap<u64, StoredRecord>>;

/// In-memory storage implementation
///
/// Fast, non-persistent storage primarily for testing.
/// All data is lost when the storage is dropped.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
    sequences: Arc<RwLock<HashMap<TypeCode, u64>>>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn tables_mut(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvBackend for InMemoryStorage {
    fn load(&self, pk: &Pk) -> Result<Option<StoredRecord>> {
        Ok(self
            .tables()
            .get(&pk.type_code)
            .and_then(|table| table.get(&pk.id))
            .cloned())
    }

    fn load_all(&self, type_code: &TypeCode) -> Result<Vec<StoredRecord>> {
        Ok(self
            .tables()
            .get(type_code)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    fn count(&self, type_code: &TypeCode) -> Result<u64> {
        Ok(self
            .tables()
            .get(type_code)
            .map(|table| table.len() as u64)
            .unwrap_or(0))
    }

    fn high_water(&self, type_code: &TypeCode) -> Result<u64> {
        Ok(self
            .sequences
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_code)
            .copied()
            .unwrap_or(0))
    }

    fn apply(&self, changes: Changes) -> Result<()> {
        let mut tables = self.tables_mut();
        let mut sequences = self.sequences.write().unwrap_or_else(PoisonError::into_inner);
        for pk in changes.deletes {
            if let Some(table) = tables.get_mut(&pk.type_code) {
                table.remove(&pk.id);
            }
        }
        for (pk, record) in changes.puts {
            tables.entry(pk.type_code).or_default().insert(pk.id, record);
        }
        for (code, id) in changes.high_water {
            let entry = sequences.entry(code).or_insert(0);
            *entry = (*entry).max(id);
        }
        Ok(())
    }

    fn cache(&self) -> Option<&RecordCache> {
        None
    }
}

impl StorageProvider for InMemoryStorage {
    fn begin_transaction(&mut self) -> Result<Box<dyn Transaction + '_>> {
        Ok(Box::new(KvTransaction::new(&*self)))
    }

    fn initialize_schema(&mut self, types: &[&TypeDefinition]) -> Result<()> {
        let mut tables = self.tables_mut();
        tables.clear();
        self.sequences
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        for def in types {
            tables.insert(def.type_code().clone(), BTreeMap::new());
        }
        Ok(())
    }

    fn update_schema(&mut self, types: &[&TypeDefinition]) -> Result<()> {
        let mut tables = self.tables_mut();
        for def in types {
            tables.entry(def.type_code().clone()).or_default();
        }
        Ok(())
    }

    fn validate_schema(&self, types: &[&TypeDefinition]) -> Result<Vec<SchemaIssue>> {
        let tables = self.tables();
        Ok(types
            .iter()
            .filter(|def| !tables.contains_key(def.type_code()))
            .map(|def| SchemaIssue::new(Some(def.type_code()), "no record table"))
            .collect())
    }

    fn evict_cache(&mut self) {}

    fn compact(&mut self) -> Result<()> {
        // Nothing to compact for in-memory storage
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            records_by_type: self
                .tables()
                .iter()
                .map(|(code, table)| (code.clone(), table.len() as u64))
                .collect(),
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompareOp, Predicate, Selection, SortOrder, StoredValue, Window, Row};

    fn user(id: u64, name: &str) -> StoredRecord {
        StoredRecord::new(Pk::new(id, "user")).with("name", StoredValue::Text(name.into()))
    }

    #[test]
    fn test_basic_crud() {
        let mut storage = InMemoryStorage::new();
        {
            let mut txn = storage.begin_transaction().unwrap();
            txn.put(user(1, "ada")).unwrap();
            txn.commit().unwrap();
        }

        let txn = storage.begin_transaction().unwrap();
        let retrieved = txn.get(&Pk::new(1, "user")).unwrap();
        assert_eq!(retrieved.unwrap().field("name"), StoredValue::Text("ada".into()));
        drop(txn);

        let mut txn = storage.begin_transaction().unwrap();
        assert!(txn.delete(&Pk::new(1, "user")).unwrap());
        assert!(!txn.delete(&Pk::new(1, "user")).unwrap());
        txn.commit().unwrap();

        let txn = storage.begin_transaction().unwrap();
        assert!(txn.get(&Pk::new(1, "user")).unwrap().is_none());
    }

    #[test]
    fn test_reads_see_own_writes_and_rollback_discards() {
        let mut storage = InMemoryStorage::new();
        let mut txn = storage.begin_transaction().unwrap();
        txn.put(user(1, "ada")).unwrap();
        assert_eq!(txn.count(&TypeCode::new("user")).unwrap(), 1);
        assert!(txn.get(&Pk::new(1, "user")).unwrap().is_some());
        txn.rollback().unwrap();

        let txn = storage.begin_transaction().unwrap();
        assert_eq!(txn.count(&TypeCode::new("user")).unwrap(), 0);
    }

    #[test]
    fn test_selection_orders_and_windows() {
        let mut storage = InMemoryStorage::new();
        let mut txn = storage.begin_transaction().unwrap();
        for (id, name) in [(1, "carol"), (2, "alice"), (3, "bob"), (4, "dave")] {
            txn.put(user(id, name)).unwrap();
        }

        let selection = Selection::new("user")
            .with_predicate(Some(Predicate::Compare {
                property: "name".into(),
                op: CompareOp::Ne,
                value: StoredValue::Text("dave".into()),
            }))
            .with_order(vec![SortOrder::asc("name")])
            .with_window(Some(Window { offset: 1, limit: 5 }));
        assert_eq!(txn.select_ids(&selection).unwrap(), vec![3, 1]);
        assert_eq!(txn.count_matching(&selection).unwrap(), 3);

        match &txn.fetch(&selection).unwrap()[0] {
            Row::Record(fetched) => assert_eq!(fetched.record.pk.id, 3),
            other => panic!("unexpected row {:?}", other),
        }
    }

    #[test]
    fn test_high_water_never_lowers() {
        let mut storage = InMemoryStorage::new();
        let code = TypeCode::new("user");
        let mut txn = storage.begin_transaction().unwrap();
        txn.set_high_water(&code, 7).unwrap();
        txn.set_high_water(&code, 3).unwrap();
        txn.commit().unwrap();

        let txn = storage.begin_transaction().unwrap();
        assert_eq!(txn.high_water(&code).unwrap(), 7);
    }

    #[test]
    fn test_update_and_delete_matching() {
        let mut storage = InMemoryStorage::new();
        let code = TypeCode::new("user");
        let mut txn = storage.begin_transaction().unwrap();
        txn.put(user(1, "ada")).unwrap();
        txn.put(user(2, "bob")).unwrap();

        let only_ada = Predicate::equals("name", StoredValue::Text("ada".into()));
        let updated = txn
            .update_matching(&code, Some(&only_ada), &[("age".into(), StoredValue::Int(36))])
            .unwrap();
        assert_eq!(updated, 1);
        let ada = txn.get(&Pk::new(1, "user")).unwrap().unwrap();
        assert_eq!(ada.field("age"), StoredValue::Int(36));
        assert_eq!(ada.version, 2);

        assert_eq!(txn.delete_matching(&code, None).unwrap(), 2);
        assert_eq!(txn.count(&code).unwrap(), 0);
    }

    #[test]
    fn test_schema_validation() {
        use itemstore_model::{TypeDefinition, TypeDescriptor};
        let def = TypeDefinition::from_descriptor(TypeDescriptor::new("User")).unwrap();
        let mut storage = InMemoryStorage::new();
        assert_eq!(storage.validate_schema(&[&def]).unwrap().len(), 1);
        storage.update_schema(&[&def]).unwrap();
        assert!(storage.validate_schema(&[&def]).unwrap().is_empty());
    }
}
