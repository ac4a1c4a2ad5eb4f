//! SQLite storage implementation
//!
//! Records live in one `items` table with their properties encoded as a
//! JSON document. References are mirrored into `item_links` so relation
//! properties can be joined for eager fetches, and each unique-property
//! set gets a partial unique index that is the final uniqueness check.

mod json;
mod schema;
mod sql;

use crate::{
    CacheMode, FetchedRecord, Predicate, Projection, RecordCache, Result, Row, SchemaIssue,
    Selection, StorageError, StorageProvider, StorageStats, StoredRecord, StoredValue,
    Transaction,
};
use itemstore_model::{Pk, TypeCode, TypeDefinition};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_BATCH_SIZE: usize = 100;

const RECORD_COLUMNS: &str = "i.id, i.version, i.created_at, i.modified_at, i.data";

const UPSERT_RECORD: &str = r#"
INSERT INTO items (type_code, id, version, created_at, modified_at, data)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(type_code, id) DO UPDATE SET
    version = excluded.version,
    created_at = excluded.created_at,
    modified_at = excluded.modified_at,
    data = excluded.data
"#;

const INSERT_LINK: &str = r#"
INSERT INTO item_links (owner_type, owner_id, property, position, target_type, target_id)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

const DELETE_LINKS: &str = "DELETE FROM item_links WHERE owner_type = ?1 AND owner_id = ?2";

/// SQLite-backed storage
pub struct SqliteStorage {
    conn: Connection,
    path: Option<PathBuf>,
    cache: RecordCache,
    batch_size: usize,
}

impl SqliteStorage {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        Self::with_connection(conn, Some(path))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, None)
    }

    fn with_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        let storage = Self {
            conn,
            path,
            cache: RecordCache::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        };
        storage.create_base_tables()?;
        Ok(storage)
    }

    /// Number of buffered record writes that triggers a flush
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn create_base_tables(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    fn create_unique_indexes(&self, types: &[&TypeDefinition]) -> Result<()> {
        for def in types {
            for (name, stmt) in schema::unique_index_statements(def) {
                debug!(index = %name, "ensuring unique index");
                self.conn
                    .execute(&stmt, [])
                    .map_err(StorageError::from_sqlite)?;
            }
        }
        Ok(())
    }

    /// Names of the schema objects of one kind (`table`, `index`)
    fn existing_objects(&self, kind: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = ?1")?;
        let names = stmt
            .query_map([kind], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(names)
    }
}

impl StorageProvider for SqliteStorage {
    fn begin_transaction(&mut self) -> Result<Box<dyn Transaction + '_>> {
        let tx = self.conn.transaction()?;
        Ok(Box::new(SqliteTransaction {
            tx,
            cache: &self.cache,
            pending: RefCell::new(Vec::new()),
            touched: HashSet::new(),
            batch_size: self.batch_size,
            cache_mode: CacheMode::default(),
        }))
    }

    fn initialize_schema(&mut self, types: &[&TypeDefinition]) -> Result<()> {
        for stmt in schema::DROP_TABLES {
            self.conn.execute(stmt, [])?;
        }
        self.create_base_tables()?;
        self.create_unique_indexes(types)?;
        self.cache.clear();
        Ok(())
    }

    fn update_schema(&mut self, types: &[&TypeDefinition]) -> Result<()> {
        self.create_base_tables()?;
        self.create_unique_indexes(types)
    }

    fn validate_schema(&self, types: &[&TypeDefinition]) -> Result<Vec<SchemaIssue>> {
        let tables = self.existing_objects("table")?;
        let indexes = self.existing_objects("index")?;

        let mut issues: Vec<SchemaIssue> = schema::TABLES
            .iter()
            .filter(|table| !tables.contains(**table))
            .map(|table| SchemaIssue::new(None, format!("missing table '{}'", table)))
            .collect();
        for def in types {
            for (name, _) in schema::unique_index_statements(def) {
                if !indexes.contains(&name) {
                    issues.push(SchemaIssue::new(
                        Some(def.type_code()),
                        format!("missing unique index '{}'", name),
                    ));
                }
            }
        }
        Ok(issues)
    }

    fn evict_cache(&mut self) {
        self.cache.clear();
    }

    fn compact(&mut self) -> Result<()> {
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }

    fn stats(&self) -> Result<StorageStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT type_code, COUNT(*) FROM items GROUP BY type_code")?;
        let records_by_type: BTreeMap<TypeCode, u64> = stmt
            .query_map([], |row| {
                Ok((TypeCode::new(row.get::<_, String>(0)?), row.get::<_, i64>(1)? as u64))
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(StorageStats { records_by_type })
    }

    fn describe(&self) -> String {
        match &self.path {
            Some(path) => format!("sqlite:{}", path.display()),
            None => "sqlite::memory:".to_string(),
        }
    }
}

/// Columns of one `items` row as read from a result set
struct RawRecord {
    id: i64,
    version: i64,
    created_at: i64,
    modified_at: i64,
    data: String,
}

impl RawRecord {
    fn read(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            version: row.get(offset + 1)?,
            created_at: row.get(offset + 2)?,
            modified_at: row.get(offset + 3)?,
            data: row.get(offset + 4)?,
        })
    }

    fn decode(self, type_code: &TypeCode) -> Result<StoredRecord> {
        Ok(StoredRecord {
            pk: Pk::new(self.id as u64, type_code),
            version: self.version as u64,
            created_at: self.created_at,
            modified_at: self.modified_at,
            properties: json::decode_properties(&self.data)?,
        })
    }
}

struct SqliteTransaction<'a> {
    tx: rusqlite::Transaction<'a>,
    cache: &'a RecordCache,
    /// Record writes not yet sent to SQLite
    pending: RefCell<Vec<StoredRecord>>,
    /// Records written or deleted here; they never go through the cache
    touched: HashSet<Pk>,
    batch_size: usize,
    cache_mode: CacheMode,
}

impl<'a> SqliteTransaction<'a> {
    fn flush_pending(&self) -> Result<()> {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        if pending.is_empty() {
            return Ok(());
        }
        debug!(records = pending.len(), "flushing buffered writes");
        for record in &pending {
            self.write_record(record)?;
        }
        Ok(())
    }

    fn write_record(&self, record: &StoredRecord) -> Result<()> {
        let code = record.pk.type_code.as_str();
        let id = record.pk.id as i64;
        self.tx
            .execute(
                UPSERT_RECORD,
                params![
                    code,
                    id,
                    record.version as i64,
                    record.created_at,
                    record.modified_at,
                    json::encode_properties(&record.properties),
                ],
            )
            .map_err(StorageError::from_sqlite)?;

        self.tx.execute(DELETE_LINKS, params![code, id])?;
        let mut insert = self.tx.prepare_cached(INSERT_LINK)?;
        for (name, value) in &record.properties {
            for (position, target) in value.references() {
                insert.execute(params![
                    code,
                    id,
                    name,
                    position as i64,
                    target.type_code.as_str(),
                    target.id as i64,
                ])?;
            }
        }
        Ok(())
    }

    fn load(&self, pk: &Pk) -> Result<Option<StoredRecord>> {
        let query = format!(
            "SELECT {} FROM items i WHERE i.type_code = ?1 AND i.id = ?2",
            RECORD_COLUMNS
        );
        self.tx
            .query_row(&query, params![pk.type_code.as_str(), pk.id as i64], |row| {
                RawRecord::read(row, 0)
            })
            .optional()?
            .map(|raw| raw.decode(&pk.type_code))
            .transpose()
    }

    /// Matching root records, ordered and windowed
    fn select_records(&self, selection: &Selection) -> Result<Vec<StoredRecord>> {
        let filter = sql::where_clause(selection)?;
        let query = format!(
            "SELECT {} FROM items i WHERE {} ORDER BY {}{}",
            RECORD_COLUMNS,
            filter.sql,
            sql::order_by(&selection.order),
            sql::limit_clause(selection)
        );
        let mut stmt = self.tx.prepare(&query)?;
        let raws = stmt
            .query_map(params_from_iter(filter.params.iter()), |row| {
                RawRecord::read(row, 0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter()
            .map(|raw| raw.decode(&selection.type_code))
            .collect()
    }

    /// Root records joined with the records their eager properties reference
    ///
    /// The window applies to joined rows, so a parent with several linked
    /// children takes several rows of the window. Callers paginating with
    /// eager properties restrict by id instead of windowing.
    fn select_joined(&self, selection: &Selection) -> Result<Vec<FetchedRecord>> {
        let filter = sql::where_clause(selection)?;
        let query = format!(
            "SELECT {}, c.type_code, c.id, c.version, c.created_at, c.modified_at, c.data \
             FROM items i \
             LEFT JOIN item_links l ON l.owner_type = i.type_code AND l.owner_id = i.id \
                 AND l.property IN ({}) \
             LEFT JOIN items c ON c.type_code = l.target_type AND c.id = l.target_id \
             WHERE {} ORDER BY {}, l.property, l.position{}",
            RECORD_COLUMNS,
            vec!["?"; selection.eager.len()].join(", "),
            filter.sql,
            sql::order_by(&selection.order),
            sql::limit_clause(selection)
        );
        let params: Vec<SqlValue> = selection
            .eager
            .iter()
            .map(|p| SqlValue::Text(p.clone()))
            .chain(filter.params)
            .collect();

        let mut stmt = self.tx.prepare(&query)?;
        let joined = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let parent = RawRecord::read(row, 0)?;
                let child = match row.get::<_, Option<i64>>(6)? {
                    Some(_) => Some((row.get::<_, String>(5)?, RawRecord::read(row, 6)?)),
                    None => None,
                };
                Ok((parent, child))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut fetched: Vec<FetchedRecord> = Vec::new();
        for (parent, child) in joined {
            let continues = fetched
                .last()
                .map_or(false, |f| f.record.pk.id == parent.id as u64);
            if !continues {
                fetched.push(FetchedRecord {
                    record: parent.decode(&selection.type_code)?,
                    related: Vec::new(),
                });
            }
            if let (Some((code, raw)), Some(last)) = (child, fetched.last_mut()) {
                last.related.push(raw.decode(&TypeCode::new(code))?);
            }
        }
        Ok(fetched)
    }

    fn absorb<'r>(&self, records: impl IntoIterator<Item = &'r StoredRecord>) {
        self.cache.absorb(
            self.cache_mode,
            records.into_iter().filter(|r| !self.touched.contains(&r.pk)),
        );
    }
}

impl<'a> Transaction for SqliteTransaction<'a> {
    fn get(&self, pk: &Pk) -> Result<Option<StoredRecord>> {
        self.flush_pending()?;
        if self.touched.contains(pk) {
            return self.load(pk);
        }
        self.cache.lookup(self.cache_mode, pk, || self.load(pk))
    }

    fn put(&mut self, record: StoredRecord) -> Result<()> {
        self.touched.insert(record.pk.clone());
        let pending = self.pending.get_mut();
        pending.push(record);
        if pending.len() >= self.batch_size {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn delete(&mut self, pk: &Pk) -> Result<bool> {
        self.flush_pending()?;
        self.touched.insert(pk.clone());
        let code = pk.type_code.as_str();
        let id = pk.id as i64;
        let removed = self.tx.execute(
            "DELETE FROM items WHERE type_code = ?1 AND id = ?2",
            params![code, id],
        )?;
        self.tx.execute(DELETE_LINKS, params![code, id])?;
        Ok(removed > 0)
    }

    fn count(&self, type_code: &TypeCode) -> Result<u64> {
        self.flush_pending()?;
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM items WHERE type_code = ?1",
            [type_code.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn high_water(&self, type_code: &TypeCode) -> Result<u64> {
        let last: Option<i64> = self
            .tx
            .query_row(
                "SELECT last_id FROM sequences WHERE type_code = ?1",
                [type_code.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(last.unwrap_or(0) as u64)
    }

    fn set_high_water(&mut self, type_code: &TypeCode, id: u64) -> Result<()> {
        self.tx.execute(
            "INSERT INTO sequences (type_code, last_id) VALUES (?1, ?2) \
             ON CONFLICT(type_code) DO UPDATE SET last_id = MAX(last_id, excluded.last_id)",
            params![type_code.as_str(), id as i64],
        )?;
        Ok(())
    }

    fn select_ids(&self, selection: &Selection) -> Result<Vec<u64>> {
        self.flush_pending()?;
        let filter = sql::where_clause(selection)?;
        let query = format!(
            "SELECT i.id FROM items i WHERE {} ORDER BY {}{}",
            filter.sql,
            sql::order_by(&selection.order),
            sql::limit_clause(selection)
        );
        let mut stmt = self.tx.prepare(&query)?;
        let ids = stmt
            .query_map(params_from_iter(filter.params.iter()), |row| {
                row.get::<_, i64>(0)
            })?
            .map(|id| id.map(|id| id as u64))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn fetch(&self, selection: &Selection) -> Result<Vec<Row>> {
        self.flush_pending()?;
        match &selection.projection {
            Projection::Records if !selection.eager.is_empty() => {
                let fetched = self.select_joined(selection)?;
                self.absorb(fetched.iter().flat_map(|f| {
                    std::iter::once(&f.record).chain(f.related.iter())
                }));
                Ok(fetched.into_iter().map(Row::Record).collect())
            }
            projection => {
                let records = self.select_records(selection)?;
                self.absorb(&records);
                Ok(records
                    .into_iter()
                    .map(|record| Row::project(record, projection))
                    .collect())
            }
        }
    }

    fn count_matching(&self, selection: &Selection) -> Result<u64> {
        self.flush_pending()?;
        let filter = sql::where_clause(selection)?;
        let query = format!("SELECT COUNT(*) FROM items i WHERE {}", filter.sql);
        let count: i64 = self
            .tx
            .query_row(&query, params_from_iter(filter.params.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn update_matching(
        &mut self,
        type_code: &TypeCode,
        predicate: Option<&Predicate>,
        assignments: &[(String, StoredValue)],
    ) -> Result<u64> {
        self.flush_pending()?;
        let selection = Selection::new(type_code).with_predicate(predicate.cloned());
        let matched = self.select_records(&selection)?;
        let now = crate::now_millis();
        let affected = matched.len() as u64;
        for mut record in matched {
            for (name, value) in assignments {
                record.properties.insert(name.clone(), value.clone());
            }
            record.version += 1;
            record.modified_at = now;
            self.put(record)?;
        }
        Ok(affected)
    }

    fn delete_matching(
        &mut self,
        type_code: &TypeCode,
        predicate: Option<&Predicate>,
    ) -> Result<u64> {
        let selection = Selection::new(type_code).with_predicate(predicate.cloned());
        let ids = self.select_ids(&selection)?;
        for id in &ids {
            self.delete(&Pk::new(*id, type_code))?;
        }
        Ok(ids.len() as u64)
    }

    fn set_cache_mode(&mut self, mode: CacheMode) {
        self.cache_mode = mode;
    }

    fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_pending()
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.flush_pending()?;
        let SqliteTransaction {
            tx, cache, touched, ..
        } = this;
        tx.commit()?;
        for pk in &touched {
            cache.invalidate(pk);
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.rollback()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CompareOp, InMemoryStorage, SortOrder, Window};
    use itemstore_model::{PropertyDescriptor, TypeDescriptor, ValueType};
    use tempfile::tempdir;

    fn user(id: u64, name: &str, email: &str) -> StoredRecord {
        StoredRecord::new(Pk::new(id, "user"))
            .with("name", StoredValue::Text(name.into()))
            .with("email", StoredValue::Text(email.into()))
    }

    fn user_type() -> TypeDefinition {
        TypeDefinition::from_descriptor(
            TypeDescriptor::new("User")
                .field(PropertyDescriptor::new("name", ValueType::Text))
                .field(PropertyDescriptor::new("email", ValueType::Text).unique()),
        )
        .unwrap()
    }

    #[test]
    fn test_basic_crud_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("items.db");
        {
            let mut storage = SqliteStorage::open(&path).unwrap();
            let mut txn = storage.begin_transaction().unwrap();
            txn.put(user(1, "ada", "ada@example.com")).unwrap();
            txn.put(user(2, "bob", "bob@example.com")).unwrap();
            txn.set_high_water(&TypeCode::new("user"), 2).unwrap();
            txn.commit().unwrap();
        }

        let mut storage = SqliteStorage::open(&path).unwrap();
        let mut txn = storage.begin_transaction().unwrap();
        let ada = txn.get(&Pk::new(1, "user")).unwrap().unwrap();
        assert_eq!(ada.field("name"), StoredValue::Text("ada".into()));
        assert_eq!(txn.high_water(&TypeCode::new("user")).unwrap(), 2);

        assert!(txn.delete(&Pk::new(1, "user")).unwrap());
        assert!(!txn.delete(&Pk::new(1, "user")).unwrap());
        txn.commit().unwrap();
        assert_eq!(storage.stats().unwrap().total(), 1);
    }

    #[test]
    fn test_unique_index_rejects_duplicates() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let def = user_type();
        storage.update_schema(&[&def]).unwrap();
        assert!(storage.validate_schema(&[&def]).unwrap().is_empty());

        let mut txn = storage.begin_transaction().unwrap();
        txn.put(user(1, "ada", "same@example.com")).unwrap();
        txn.put(user(2, "bob", "same@example.com")).unwrap();
        assert!(matches!(txn.flush(), Err(StorageError::UniqueViolation(_))));
    }

    #[test]
    fn test_missing_unique_index_is_reported() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let issues = storage.validate_schema(&[&user_type()]).unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].description.contains("uq_user_email"));
    }

    #[test]
    fn test_buffered_writes_are_visible_and_rolled_back() {
        let mut storage = SqliteStorage::open_in_memory().unwrap().with_batch_size(2);
        let code = TypeCode::new("user");
        let mut txn = storage.begin_transaction().unwrap();
        for id in 1..=5 {
            txn.put(user(id, "x", &format!("{}@example.com", id))).unwrap();
        }
        assert_eq!(txn.count(&code).unwrap(), 5);
        txn.rollback().unwrap();

        let txn = storage.begin_transaction().unwrap();
        assert_eq!(txn.count(&code).unwrap(), 0);
    }

    #[test]
    fn test_predicates_agree_with_memory_backend() {
        let records = vec![
            user(1, "Ada", "ada@example.com").with("age", StoredValue::Int(36)),
            user(2, "Bob", "bob@example.com").with("age", StoredValue::Int(17)),
            user(3, "Carol", "carol@example.org"),
            user(4, "Dave", "dave@example.org")
                .with("age", StoredValue::Int(52))
                .with(
                    "tags",
                    StoredValue::List(vec![StoredValue::Text("admin".into())]),
                ),
        ];
        let predicates = vec![
            Predicate::Compare {
                property: "age".into(),
                op: CompareOp::Ge,
                value: StoredValue::Int(18),
            },
            Predicate::Not(Box::new(Predicate::Compare {
                property: "age".into(),
                op: CompareOp::Lt,
                value: StoredValue::Int(40),
            })),
            Predicate::Like {
                property: "email".into(),
                pattern: "%.ORG".into(),
            },
            Predicate::IsNull {
                property: "age".into(),
                negated: false,
            },
            Predicate::Contains {
                property: "tags".into(),
                value: StoredValue::Text("admin".into()),
            },
            Predicate::Or(vec![
                Predicate::equals("name", StoredValue::Text("Bob".into())),
                Predicate::In {
                    property: "pk".into(),
                    values: vec![StoredValue::Int(3), StoredValue::Int(4)],
                },
            ]),
        ];

        let mut sqlite = SqliteStorage::open_in_memory().unwrap();
        let mut memory = InMemoryStorage::new();
        let backends: [&mut dyn StorageProvider; 2] = [&mut sqlite, &mut memory];
        for storage in backends {
            let mut txn = storage.begin_transaction().unwrap();
            for record in &records {
                txn.put(record.clone()).unwrap();
            }
            txn.commit().unwrap();
        }

        let sqlite_txn = sqlite.begin_transaction().unwrap();
        let memory_txn = memory.begin_transaction().unwrap();
        for predicate in predicates {
            let selection = Selection::new("user")
                .with_predicate(Some(predicate.clone()))
                .with_order(vec![SortOrder::asc("pk")]);
            assert_eq!(
                sqlite_txn.select_ids(&selection).unwrap(),
                memory_txn.select_ids(&selection).unwrap(),
                "predicate {:?}",
                predicate
            );
        }
    }

    #[test]
    fn test_eager_join_fans_out_inside_window() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let mut txn = storage.begin_transaction().unwrap();
        for id in 1..=3 {
            txn.put(StoredRecord::new(Pk::new(id, "line"))).unwrap();
        }
        let lines = (1..=3)
            .map(|id| StoredValue::Reference(Pk::new(id, "line")))
            .collect();
        txn.put(StoredRecord::new(Pk::new(1, "order")).with("lines", StoredValue::List(lines)))
            .unwrap();
        txn.put(StoredRecord::new(Pk::new(2, "order"))).unwrap();

        let eager = Selection::new("order")
            .with_order(vec![SortOrder::asc("pk")])
            .with_eager(vec!["lines".to_string()]);

        // three joined rows for order 1 use up a window of two
        let windowed = eager
            .clone()
            .with_window(Some(Window { offset: 0, limit: 2 }));
        let rows = txn.fetch(&windowed).unwrap();
        assert_eq!(rows.len(), 1);
        match &rows[0] {
            Row::Record(fetched) => assert_eq!(fetched.related.len(), 2),
            other => panic!("unexpected row {:?}", other),
        }

        let by_ids = eager.with_ids(vec![1, 2]);
        let rows = txn.fetch(&by_ids).unwrap();
        assert_eq!(rows.len(), 2);
        match &rows[0] {
            Row::Record(fetched) => assert_eq!(fetched.related.len(), 3),
            other => panic!("unexpected row {:?}", other),
        }
    }

    #[test]
    fn test_timestamp_ordering_and_update_matching() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let code = TypeCode::new("event");
        let mut txn = storage.begin_transaction().unwrap();
        for (id, at) in [(1, 3_000), (2, 1_000), (3, 2_000)] {
            txn.put(StoredRecord::new(Pk::new(id, "event")).with("at", StoredValue::Timestamp(at)))
                .unwrap();
        }
        let ordered = Selection::new("event").with_order(vec![SortOrder::asc("at")]);
        assert_eq!(txn.select_ids(&ordered).unwrap(), vec![2, 3, 1]);

        let later = Predicate::Compare {
            property: "at".into(),
            op: CompareOp::Gt,
            value: StoredValue::Timestamp(1_500),
        };
        let updated = txn
            .update_matching(&code, Some(&later), &[("late".into(), StoredValue::Bool(true))])
            .unwrap();
        assert_eq!(updated, 2);
        let late = Selection::new("event")
            .with_predicate(Some(Predicate::equals("late", StoredValue::Bool(true))));
        assert_eq!(txn.count_matching(&late).unwrap(), 2);
        assert_eq!(txn.delete_matching(&code, Some(&later)).unwrap(), 2);
        assert_eq!(txn.count(&code).unwrap(), 1);
    }

    #[test]
    fn test_committed_writes_invalidate_cache() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let pk = Pk::new(1, "user");
        let mut txn = storage.begin_transaction().unwrap();
        txn.put(user(1, "ada", "a@example.com")).unwrap();
        txn.commit().unwrap();

        let txn = storage.begin_transaction().unwrap();
        txn.get(&pk).unwrap();
        drop(txn);
        assert_eq!(storage.cache.len(), 1);

        let mut txn = storage.begin_transaction().unwrap();
        txn.put(user(1, "grace", "a@example.com")).unwrap();
        txn.commit().unwrap();
        assert!(storage.cache.is_empty());
    }
}
