//! Transactions for key-value backends
//!
//! Key-value backends have no query planner, so a transaction buffers its
//! writes in an overlay and answers selections by scanning the records of
//! one type with the overlay applied. Commit hands the overlay to the
//! backend, which applies it in a single atomic step.

use crate::{
    now_millis, sort_values, CacheMode, Direction, FetchedRecord, Predicate, Projection,
    RecordCache, Result, Row, Selection, StoredRecord, StoredValue, Transaction,
};
use itemstore_model::{Pk, TypeCode};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Storage primitives a key-value backend provides
pub(crate) trait KvBackend {
    fn load(&self, pk: &Pk) -> Result<Option<StoredRecord>>;

    /// Every committed record of a type, in id order
    fn load_all(&self, type_code: &TypeCode) -> Result<Vec<StoredRecord>>;

    fn count(&self, type_code: &TypeCode) -> Result<u64>;

    fn high_water(&self, type_code: &TypeCode) -> Result<u64>;

    /// Apply a transaction's changes atomically
    fn apply(&self, changes: Changes) -> Result<()>;

    fn cache(&self) -> Option<&RecordCache>;
}

/// Buffered writes of one transaction
#[derive(Debug, Default)]
pub(crate) struct Changes {
    pub puts: BTreeMap<Pk, StoredRecord>,
    pub deletes: BTreeSet<Pk>,
    pub high_water: BTreeMap<TypeCode, u64>,
}

impl Changes {
    fn touches(&self, type_code: &TypeCode) -> bool {
        self.puts.keys().any(|pk| pk.type_code == *type_code)
            || self.deletes.iter().any(|pk| pk.type_code == *type_code)
    }
}

pub(crate) struct KvTransaction<'a, B: KvBackend> {
    backend: &'a B,
    changes: Changes,
    cache_mode: CacheMode,
}

impl<'a, B: KvBackend> KvTransaction<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            changes: Changes::default(),
            cache_mode: CacheMode::default(),
        }
    }

    /// Records of a type as this transaction sees them, in id order
    fn records_of(&self, type_code: &TypeCode) -> Result<Vec<StoredRecord>> {
        let mut records: BTreeMap<u64, StoredRecord> = self
            .backend
            .load_all(type_code)?
            .into_iter()
            .filter(|r| !self.changes.deletes.contains(&r.pk))
            .map(|r| (r.pk.id, r))
            .collect();
        for (pk, record) in &self.changes.puts {
            if pk.type_code == *type_code {
                records.insert(pk.id, record.clone());
            }
        }
        Ok(records.into_values().collect())
    }

    /// Filtered and ordered, but not windowed
    fn matching(&self, selection: &Selection) -> Result<Vec<StoredRecord>> {
        let mut records: Vec<StoredRecord> = self
            .records_of(&selection.type_code)?
            .into_iter()
            .filter(|r| match &selection.ids {
                Some(ids) => ids.contains(&r.pk.id),
                None => true,
            })
            .filter(|r| match &selection.predicate {
                Some(predicate) => predicate.matches(r),
                None => true,
            })
            .collect();
        records.sort_by(|a, b| compare_records(a, b, selection));
        Ok(records)
    }

    fn windowed(&self, selection: &Selection) -> Result<Vec<StoredRecord>> {
        let records = self.matching(selection)?;
        Ok(match selection.window {
            Some(window) => records
                .into_iter()
                .skip(window.offset)
                .take(window.limit)
                .collect(),
            None => records,
        })
    }
}

/// Order by the selection's sort keys, then by id so ties are stable
fn compare_records(a: &StoredRecord, b: &StoredRecord, selection: &Selection) -> Ordering {
    for order in &selection.order {
        let ord = sort_values(&a.field(&order.property), &b.field(&order.property));
        let ord = match order.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.pk.id.cmp(&b.pk.id)
}

impl<'a, B: KvBackend> Transaction for KvTransaction<'a, B> {
    fn get(&self, pk: &Pk) -> Result<Option<StoredRecord>> {
        if self.changes.deletes.contains(pk) {
            return Ok(None);
        }
        if let Some(record) = self.changes.puts.get(pk) {
            return Ok(Some(record.clone()));
        }
        match self.backend.cache() {
            Some(cache) => cache.lookup(self.cache_mode, pk, || self.backend.load(pk)),
            None => self.backend.load(pk),
        }
    }

    fn put(&mut self, record: StoredRecord) -> Result<()> {
        self.changes.deletes.remove(&record.pk);
        self.changes.puts.insert(record.pk.clone(), record);
        Ok(())
    }

    fn delete(&mut self, pk: &Pk) -> Result<bool> {
        let existed = self.get(pk)?.is_some();
        self.changes.puts.remove(pk);
        if existed {
            self.changes.deletes.insert(pk.clone());
        }
        Ok(existed)
    }

    fn count(&self, type_code: &TypeCode) -> Result<u64> {
        if self.changes.touches(type_code) {
            return Ok(self.records_of(type_code)?.len() as u64);
        }
        self.backend.count(type_code)
    }

    fn high_water(&self, type_code: &TypeCode) -> Result<u64> {
        let stored = self.backend.high_water(type_code)?;
        let pending = self.changes.high_water.get(type_code).copied().unwrap_or(0);
        Ok(stored.max(pending))
    }

    fn set_high_water(&mut self, type_code: &TypeCode, id: u64) -> Result<()> {
        let entry = self.changes.high_water.entry(type_code.clone()).or_insert(0);
        *entry = (*entry).max(id);
        Ok(())
    }

    fn select_ids(&self, selection: &Selection) -> Result<Vec<u64>> {
        Ok(self
            .windowed(selection)?
            .into_iter()
            .map(|r| r.pk.id)
            .collect())
    }

    fn fetch(&self, selection: &Selection) -> Result<Vec<Row>> {
        let records = self.windowed(selection)?;
        if let Some(cache) = self.backend.cache() {
            cache.absorb(
                self.cache_mode,
                records.iter().filter(|r| !self.changes.puts.contains_key(&r.pk)),
            );
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let row = match &selection.projection {
                Projection::Records if !selection.eager.is_empty() => {
                    let mut related = Vec::new();
                    for pk in record.references_in(&selection.eager) {
                        if let Some(child) = self.get(pk)? {
                            related.push(child);
                        }
                    }
                    Row::Record(FetchedRecord { record, related })
                }
                projection => Row::project(record, projection),
            };
            rows.push(row);
        }
        Ok(rows)
    }

    fn count_matching(&self, selection: &Selection) -> Result<u64> {
        Ok(self.matching(selection)?.len() as u64)
    }

    fn update_matching(
        &mut self,
        type_code: &TypeCode,
        predicate: Option<&Predicate>,
        assignments: &[(String, StoredValue)],
    ) -> Result<u64> {
        let selection = Selection::new(type_code).with_predicate(predicate.cloned());
        let matched = self.matching(&selection)?;
        let now = now_millis();
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
        let matched = self.matching(&selection)?;
        for record in &matched {
            self.delete(&record.pk)?;
        }
        Ok(matched.len() as u64)
    }

    fn set_cache_mode(&mut self, mode: CacheMode) {
        self.cache_mode = mode;
    }

    fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    fn clear_cache(&mut self) {
        if let Some(cache) = self.backend.cache() {
            cache.clear();
        }
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let written: Vec<Pk> = this
            .changes
            .puts
            .keys()
            .chain(this.changes.deletes.iter())
            .cloned()
            .collect();
        this.backend.apply(this.changes)?;
        if let Some(cache) = this.backend.cache() {
            for pk in &written {
                cache.invalidate(pk);
            }
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        // Simply drop self, discarding all buffered changes
        Ok(())
    }
}
