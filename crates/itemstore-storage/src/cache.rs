//! Shared record cache and the cache modes sessions read it with

use crate::{Result, StoredRecord};
use itemstore_model::Pk;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// How a session uses the shared record cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Serve from cache, populate on miss
    #[default]
    ReadThrough,
    /// Never read or write the cache
    Bypass,
    /// Read the cache; populate from lookups and query results
    Normal,
    /// Ignore existing entries but refresh them from what is loaded
    WriteOnly,
}

impl CacheMode {
    /// Collapse the request flags into one effective mode
    pub fn resolve(cachable: bool, ignore_cache: bool) -> Self {
        match (cachable, ignore_cache) {
            (false, false) => CacheMode::ReadThrough,
            (false, true) => CacheMode::Bypass,
            (true, false) => CacheMode::Normal,
            (true, true) => CacheMode::WriteOnly,
        }
    }

    pub fn reads(self) -> bool {
        matches!(self, CacheMode::ReadThrough | CacheMode::Normal)
    }

    pub fn populates_on_load(self) -> bool {
        !matches!(self, CacheMode::Bypass)
    }

    pub fn populates_from_queries(self) -> bool {
        matches!(self, CacheMode::Normal | CacheMode::WriteOnly)
    }
}

/// Committed records keyed by primary key
#[derive(Debug, Default)]
pub struct RecordCache {
    entries: RwLock<HashMap<Pk, StoredRecord>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pk: &Pk) -> Option<StoredRecord> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pk)
            .cloned()
    }

    pub fn put(&self, record: StoredRecord) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.pk.clone(), record);
    }

    pub fn invalidate(&self, pk: &Pk) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(pk);
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point lookup through the cache according to `mode`
    pub fn lookup(
        &self,
        mode: CacheMode,
        pk: &Pk,
        load: impl FnOnce() -> Result<Option<StoredRecord>>,
    ) -> Result<Option<StoredRecord>> {
        if mode.reads() {
            if let Some(hit) = self.get(pk) {
                return Ok(Some(hit));
            }
        }
        let loaded = load()?;
        if mode.populates_on_load() {
            if let Some(record) = &loaded {
                self.put(record.clone());
            }
        }
        Ok(loaded)
    }

    /// Take in records produced by a query
    pub fn absorb<'a>(&self, mode: CacheMode, records: impl IntoIterator<Item = &'a StoredRecord>) {
        if mode.populates_from_queries() {
            for record in records {
                self.put(record.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoredValue;

    #[test]
    fn test_mode_resolution_table() {
        assert_eq!(CacheMode::resolve(false, false), CacheMode::ReadThrough);
        assert_eq!(CacheMode::resolve(false, true), CacheMode::Bypass);
        assert_eq!(CacheMode::resolve(true, false), CacheMode::Normal);
        assert_eq!(CacheMode::resolve(true, true), CacheMode::WriteOnly);
    }

    #[test]
    fn test_read_through_serves_hits() {
        let cache = RecordCache::new();
        let pk = Pk::new(1, "user");
        let stale = StoredRecord::new(pk.clone()).with("name", StoredValue::Text("old".into()));
        cache.put(stale.clone());

        let fresh = StoredRecord::new(pk.clone()).with("name", StoredValue::Text("new".into()));
        let got = cache
            .lookup(CacheMode::ReadThrough, &pk, || Ok(Some(fresh.clone())))
            .unwrap();
        assert_eq!(got, Some(stale));

        let got = cache
            .lookup(CacheMode::WriteOnly, &pk, || Ok(Some(fresh.clone())))
            .unwrap();
        assert_eq!(got, Some(fresh.clone()));
        assert_eq!(cache.get(&pk), Some(fresh));
    }

    #[test]
    fn test_bypass_leaves_cache_alone() {
        let cache = RecordCache::new();
        let pk = Pk::new(1, "user");
        let record = StoredRecord::new(pk.clone());
        cache
            .lookup(CacheMode::Bypass, &pk, || Ok(Some(record.clone())))
            .unwrap();
        assert!(cache.is_empty());

        cache.absorb(CacheMode::ReadThrough, [&record]);
        assert!(cache.is_empty());
        cache.absorb(CacheMode::Normal, [&record]);
        assert_eq!(cache.len(), 1);
    }
}
