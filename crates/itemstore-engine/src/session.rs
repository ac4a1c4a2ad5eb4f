//! A bound backend session: one storage transaction plus the engine's
//! per-unit-of-work bookkeeping

use crate::{PersistenceError, Result};
use itemstore_model::{ItemRef, ItemSnapshot, Pk};
use itemstore_storage::{Result as StorageResult, Transaction};
use std::collections::HashSet;

pub struct Session<'t> {
    txn: Box<dyn Transaction + 't>,
    attached: HashSet<Pk>,
    /// Item states to put back if the unit of work rolls back
    snapshots: Vec<(ItemRef, ItemSnapshot)>,
    rollback_only: bool,
}

impl<'t> Session<'t> {
    pub fn new(txn: Box<dyn Transaction + 't>) -> Self {
        Self {
            txn,
            attached: HashSet::new(),
            snapshots: Vec::new(),
            rollback_only: false,
        }
    }

    pub fn txn(&self) -> &(dyn Transaction + 't) {
        self.txn.as_ref()
    }

    pub fn txn_mut(&mut self) -> &mut (dyn Transaction + 't) {
        self.txn.as_mut()
    }

    /// Run a backend write; a failure dooms the unit of work
    pub fn write<T>(
        &mut self,
        f: impl FnOnce(&mut (dyn Transaction + 't)) -> StorageResult<T>,
    ) -> Result<T> {
        match f(self.txn.as_mut()) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.rollback_only = true;
                Err(PersistenceError::on_write(e))
            }
        }
    }

    pub fn read<T>(&self, f: impl FnOnce(&(dyn Transaction + 't)) -> StorageResult<T>) -> Result<T> {
        f(self.txn.as_ref()).map_err(PersistenceError::on_query)
    }

    /// Record an item's bookkeeping before the engine changes it
    pub fn remember(&mut self, item: &ItemRef) {
        if self.snapshots.iter().any(|(seen, _)| seen.ptr_eq(item)) {
            return;
        }
        let snapshot = item.read().snapshot();
        self.snapshots.push((item.clone(), snapshot));
    }

    /// Returns `true` when the PK was not attached before
    pub fn attach(&mut self, pk: Pk) -> bool {
        self.attached.insert(pk)
    }

    pub fn detach(&mut self, pk: &Pk) -> bool {
        self.attached.remove(pk)
    }

    pub fn is_attached(&self, pk: &Pk) -> bool {
        self.attached.contains(pk)
    }

    pub fn mark_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    pub fn flush(&mut self) -> Result<()> {
        self.write(|txn| txn.flush())
    }

    pub fn commit(self) -> Result<()> {
        let Session { txn, snapshots, .. } = self;
        if let Err(e) = txn.commit() {
            restore(snapshots);
            return Err(PersistenceError::on_write(e));
        }
        Ok(())
    }

    /// Discard the transaction and put every touched item back
    pub fn rollback(self) {
        let Session { txn, snapshots, .. } = self;
        if let Err(e) = txn.rollback() {
            tracing::warn!("Rollback failed: {}", e);
        }
        restore(snapshots);
    }
}

fn restore(snapshots: Vec<(ItemRef, ItemSnapshot)>) {
    for (item, snapshot) in snapshots.into_iter().rev() {
        item.write().restore(snapshot);
    }
}
