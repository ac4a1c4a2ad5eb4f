//! Per-type primary key allocation

use crate::{PersistenceError, Result};
use itemstore_model::{Pk, TypeCode};
use itemstore_storage::Transaction;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Hands out strictly increasing ids per type code
///
/// Each counter is seeded on first use from `max(stored record count,
/// persisted high-water mark)` and afterwards only moves forward, so an
/// id is never issued twice even after the newest record is deleted.
#[derive(Debug, Default)]
pub struct IdentityAllocator {
    counters: Mutex<HashMap<TypeCode, Arc<Mutex<Option<u64>>>>>,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, type_code: &TypeCode) -> Arc<Mutex<Option<u64>>> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(type_code.clone())
            .or_default()
            .clone()
    }

    /// Next id for a type; `seed` yields the last id in use and is only
    /// consulted the first time the type is seen
    pub fn allocate(
        &self,
        type_code: &TypeCode,
        seed: impl FnOnce() -> Result<u64>,
    ) -> Result<u64> {
        let counter = self.counter(type_code);
        let mut last = counter.lock().unwrap_or_else(PoisonError::into_inner);
        let current = match *last {
            Some(id) => id,
            None => {
                let seeded = seed()?;
                tracing::debug!("Seeded id counter for {} at {}", type_code, seeded);
                seeded
            }
        };
        let next = current + 1;
        *last = Some(next);
        Ok(next)
    }

    /// Allocate a PK and record it as the type's high-water mark in the
    /// same transaction
    pub fn next_pk(&self, txn: &mut dyn Transaction, type_code: &TypeCode) -> Result<Pk> {
        let id = self.allocate(type_code, || {
            let count = txn.count(type_code).map_err(PersistenceError::on_write)?;
            let high_water = txn.high_water(type_code).map_err(PersistenceError::on_write)?;
            Ok(count.max(high_water))
        })?;
        txn.set_high_water(type_code, id)
            .map_err(PersistenceError::on_write)?;
        Ok(Pk::new(id, type_code.clone()))
    }

    /// Forget every counter; they re-seed from storage on next use
    pub fn reset(&self) {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
