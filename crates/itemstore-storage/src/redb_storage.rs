//! redb-based persistent storage implementation

use crate::kv::{Changes, KvBackend, KvTransaction};
use crate::{
    RecordCache, Result, SchemaIssue, StorageProvider, StorageStats, StoredRecord, Transaction,
};
use itemstore_model::{Pk, TypeCode, TypeDefinition};
use redb::{
    Database, ReadableTable, ReadableTableMetadata, TableDefinition, TableError, TableHandle,
};
use std::path::{Path, PathBuf};

// Table definitions
const SEQUENCES_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequences");
const RECORD_TABLE_PREFIX: &str = "records:";

fn record_table_name(type_code: &TypeCode) -> String {
    format!("{}{}", RECORD_TABLE_PREFIX, type_code)
}

fn record_table(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

/// redb-based persistent storage
///
/// Provides ACID-compliant persistent storage using redb embedded database.
/// Each type code gets its own table of bincode-encoded records keyed by id.
pub struct RedbStorage {
    db: Database,
    path: PathBuf,
    cache: RecordCache,
}

impl RedbStorage {
    /// Create or open a redb storage at the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(&path)?;

        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(SEQUENCES_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            path,
            cache: RecordCache::new(),
        })
    }

    /// Get the file path of this storage
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let names = read_txn
            .list_tables()?
            .map(|handle| handle.name().to_string())
            .collect();
        Ok(names)
    }
}

impl KvBackend for RedbStorage {
    fn load(&self, pk: &Pk) -> Result<Option<StoredRecord>> {
        let read_txn = self.db.begin_read()?;
        let name = record_table_name(&pk.type_code);
        let table = match read_txn.open_table(record_table(&name)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match table.get(pk.id)? {
            Some(bytes) => {
                let record: StoredRecord = bincode::deserialize(bytes.value())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn load_all(&self, type_code: &TypeCode) -> Result<Vec<StoredRecord>> {
        let read_txn = self.db.begin_read()?;
        let name = record_table_name(type_code);
        let table = match read_txn.open_table(record_table(&name)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(bincode::deserialize(value.value())?);
        }
        Ok(records)
    }

    fn count(&self, type_code: &TypeCode) -> Result<u64> {
        let read_txn = self.db.begin_read()?;
        let name = record_table_name(type_code);
        match read_txn.open_table(record_table(&name)) {
            Ok(table) => Ok(table.len()?),
            Err(TableError::TableDoesNotExist(_)) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn high_water(&self, type_code: &TypeCode) -> Result<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SEQUENCES_TABLE)?;
        Ok(table
            .get(type_code.as_str())?
            .map(|value| value.value())
            .unwrap_or(0))
    }

    fn apply(&self, changes: Changes) -> Result<()> {
        // All buffered changes land in a single write transaction
        let write_txn = self.db.begin_write()?;
        {
            for pk in &changes.deletes {
                let name = record_table_name(&pk.type_code);
                let mut table = write_txn.open_table(record_table(&name))?;
                table.remove(pk.id)?;
            }
            for (pk, record) in &changes.puts {
                let name = record_table_name(&pk.type_code);
                let mut table = write_txn.open_table(record_table(&name))?;
                let bytes = bincode::serialize(record)?;
                table.insert(pk.id, bytes.as_slice())?;
            }
            let mut sequences = write_txn.open_table(SEQUENCES_TABLE)?;
            for (code, id) in &changes.high_water {
                let current = sequences
                    .get(code.as_str())?
                    .map(|value| value.value())
                    .unwrap_or(0);
                if *id > current {
                    sequences.insert(code.as_str(), *id)?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn cache(&self) -> Option<&RecordCache> {
        Some(&self.cache)
    }
}

impl StorageProvider for RedbStorage {
    fn begin_transaction(&mut self) -> Result<Box<dyn Transaction + '_>> {
        Ok(Box::new(KvTransaction::new(&*self)))
    }

    fn initialize_schema(&mut self, types: &[&TypeDefinition]) -> Result<()> {
        let existing = self.table_names()?;
        let write_txn = self.db.begin_write()?;
        {
            for name in existing.iter().filter(|n| n.starts_with(RECORD_TABLE_PREFIX)) {
                write_txn.delete_table(record_table(name))?;
            }
            write_txn.delete_table(SEQUENCES_TABLE)?;
            write_txn.open_table(SEQUENCES_TABLE)?;
            for def in types {
                let name = record_table_name(def.type_code());
                write_txn.open_table(record_table(&name))?;
            }
        }
        write_txn.commit()?;
        self.cache.clear();
        Ok(())
    }

    fn update_schema(&mut self, types: &[&TypeDefinition]) -> Result<()> {
        let write_txn = self.db.begin_write()?;
        {
            write_txn.open_table(SEQUENCES_TABLE)?;
            for def in types {
                let name = record_table_name(def.type_code());
                write_txn.open_table(record_table(&name))?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn validate_schema(&self, types: &[&TypeDefinition]) -> Result<Vec<SchemaIssue>> {
        let existing = self.table_names()?;
        Ok(types
            .iter()
            .filter(|def| !existing.contains(&record_table_name(def.type_code())))
            .map(|def| SchemaIssue::new(Some(def.type_code()), "missing record table"))
            .collect())
    }

    fn evict_cache(&mut self) {
        self.cache.clear();
    }

    fn compact(&mut self) -> Result<()> {
        self.db.compact()?;
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        let mut stats = StorageStats::default();
        for name in self.table_names()? {
            if let Some(code) = name.strip_prefix(RECORD_TABLE_PREFIX) {
                let code = TypeCode::new(code);
                let count = self.count(&code)?;
                stats.records_by_type.insert(code, count);
            }
        }
        Ok(stats)
    }

    fn describe(&self) -> String {
        format!("redb:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheMode, StoredValue};
    use itemstore_model::TypeDescriptor;
    use tempfile::tempdir;

    fn user(id: u64, name: &str) -> StoredRecord {
        StoredRecord::new(Pk::new(id, "user")).with("name", StoredValue::Text(name.into()))
    }

    #[test]
    fn test_basic_crud() {
        let dir = tempdir().unwrap();
        let mut storage = RedbStorage::new(dir.path().join("test.redb")).unwrap();

        let mut txn = storage.begin_transaction().unwrap();
        txn.put(user(1, "ada")).unwrap();
        txn.commit().unwrap();

        let txn = storage.begin_transaction().unwrap();
        let retrieved = txn.get(&Pk::new(1, "user")).unwrap();
        assert_eq!(retrieved.unwrap().field("name"), StoredValue::Text("ada".into()));
        drop(txn);

        let mut txn = storage.begin_transaction().unwrap();
        assert!(txn.delete(&Pk::new(1, "user")).unwrap());
        txn.commit().unwrap();

        let txn = storage.begin_transaction().unwrap();
        assert!(txn.get(&Pk::new(1, "user")).unwrap().is_none());
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        let code = TypeCode::new("user");

        {
            let mut storage = RedbStorage::new(&path).unwrap();
            let mut txn = storage.begin_transaction().unwrap();
            txn.put(user(1, "ada")).unwrap();
            txn.put(user(2, "bob")).unwrap();
            txn.set_high_water(&code, 2).unwrap();
            txn.commit().unwrap();
        }

        let mut storage = RedbStorage::new(&path).unwrap();
        let txn = storage.begin_transaction().unwrap();
        assert_eq!(txn.count(&code).unwrap(), 2);
        assert_eq!(txn.high_water(&code).unwrap(), 2);
        drop(txn);
        assert_eq!(storage.stats().unwrap().total(), 2);
    }

    #[test]
    fn test_committed_writes_invalidate_cache() {
        let dir = tempdir().unwrap();
        let mut storage = RedbStorage::new(dir.path().join("test.redb")).unwrap();
        let pk = Pk::new(1, "user");

        let mut txn = storage.begin_transaction().unwrap();
        txn.put(user(1, "ada")).unwrap();
        txn.commit().unwrap();

        let mut txn = storage.begin_transaction().unwrap();
        txn.set_cache_mode(CacheMode::Normal);
        txn.get(&pk).unwrap();
        drop(txn);
        assert_eq!(storage.cache.len(), 1);

        let mut txn = storage.begin_transaction().unwrap();
        txn.put(user(1, "grace")).unwrap();
        txn.commit().unwrap();
        assert!(storage.cache.is_empty());

        let txn = storage.begin_transaction().unwrap();
        let record = txn.get(&pk).unwrap().unwrap();
        assert_eq!(record.field("name"), StoredValue::Text("grace".into()));
    }

    #[test]
    fn test_bulk_delete_invalidates_cached_records() {
        let dir = tempdir().unwrap();
        let mut storage = RedbStorage::new(dir.path().join("test.redb")).unwrap();
        let code = TypeCode::new("user");

        let mut txn = storage.begin_transaction().unwrap();
        txn.put(user(1, "ada")).unwrap();
        txn.put(user(2, "bob")).unwrap();
        txn.commit().unwrap();

        let txn = storage.begin_transaction().unwrap();
        txn.get(&Pk::new(1, "user")).unwrap();
        txn.get(&Pk::new(2, "user")).unwrap();
        drop(txn);
        assert_eq!(storage.cache.len(), 2);

        let mut txn = storage.begin_transaction().unwrap();
        assert_eq!(txn.delete_matching(&code, None).unwrap(), 2);
        txn.commit().unwrap();
        assert!(storage.cache.is_empty());

        let txn = storage.begin_transaction().unwrap();
        assert!(txn.get(&Pk::new(1, "user")).unwrap().is_none());
    }

    #[test]
    fn test_schema_lifecycle() {
        let dir = tempdir().unwrap();
        let mut storage = RedbStorage::new(dir.path().join("test.redb")).unwrap();
        let def = TypeDefinition::from_descriptor(TypeDescriptor::new("User")).unwrap();

        assert_eq!(storage.validate_schema(&[&def]).unwrap().len(), 1);
        storage.update_schema(&[&def]).unwrap();
        assert!(storage.validate_schema(&[&def]).unwrap().is_empty());

        let mut txn = storage.begin_transaction().unwrap();
        txn.put(user(1, "ada")).unwrap();
        txn.commit().unwrap();

        storage.initialize_schema(&[&def]).unwrap();
        let txn = storage.begin_transaction().unwrap();
        assert_eq!(txn.count(&TypeCode::new("user")).unwrap(), 0);
    }
}
