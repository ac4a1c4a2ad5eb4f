//! Reference-only stand-ins and their resolution

use crate::mapping::{self, Related};
use crate::session::Session;
use crate::{PersistenceError, Result};
use itemstore_model::{Item, ItemRef};

pub struct ProxyManager;

impl ProxyManager {
    /// A new instance carrying only the item's PK and type code
    pub fn to_proxy(item: &Item) -> Result<Item> {
        item.to_proxy()
            .map_err(|e| PersistenceError::CannotCreateModelProxy(e.to_string()))
    }

    /// Load the stored record behind `item` and overwrite it in place
    ///
    /// Works on proxies and full items alike; afterwards the item is full,
    /// persisted and clean.
    pub fn resolve(session: &Session<'_>, item: &ItemRef) -> Result<()> {
        let (pk, removed) = {
            let guard = item.read();
            (guard.pk().cloned(), guard.is_removed())
        };
        let pk = pk.ok_or_else(|| {
            PersistenceError::ModelNotFound(format!("unsaved {} item", item.type_code()))
        })?;
        if removed {
            return Err(PersistenceError::ModelNotFound(format!("{} was removed", pk)));
        }
        let record = session
            .read(|txn| txn.get(&pk))?
            .ok_or_else(|| PersistenceError::ModelNotFound(pk.to_string()))?;
        let loaded = mapping::rehydrate(&record, &Related::new())?;
        item.write().load_from(loaded);
        Ok(())
    }
}
