//! Items: full records and reference-only proxies

use crate::{ModelError, Pk, Result, TypeCode, Value};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Where an item is in its persistence lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created in memory, never saved
    Transient,
    /// Backed by a stored record
    Persisted,
    /// Its stored record was deleted; terminal
    Removed,
}

/// The payload of an item
#[derive(Debug, Clone)]
pub enum ItemBody {
    /// Every loaded property, by name
    Full(BTreeMap<String, Value>),
    /// Identity only; properties must be loaded before use
    Proxy,
}

/// A typed, identity-bearing record
#[derive(Debug, Clone)]
pub struct Item {
    type_code: TypeCode,
    pk: Option<Pk>,
    lifecycle: Lifecycle,
    body: ItemBody,
    dirty: bool,
    version: Option<u64>,
    created_at: Option<DateTime<Utc>>,
    modified_at: Option<DateTime<Utc>>,
}

/// Persistence bookkeeping of an item, captured so a failed unit of work
/// can put the item back the way it found it
#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    pk: Option<Pk>,
    lifecycle: Lifecycle,
    dirty: bool,
    version: Option<u64>,
    created_at: Option<DateTime<Utc>>,
    modified_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Create a transient item with no properties set
    pub fn new(type_code: impl Into<TypeCode>) -> Self {
        Self {
            type_code: type_code.into(),
            pk: None,
            lifecycle: Lifecycle::Transient,
            body: ItemBody::Full(BTreeMap::new()),
            dirty: false,
            version: None,
            created_at: None,
            modified_at: None,
        }
    }

    /// Create a reference-only stand-in for a stored item
    pub fn proxy(pk: Pk) -> Self {
        Self {
            type_code: pk.type_code.clone(),
            pk: Some(pk),
            lifecycle: Lifecycle::Persisted,
            body: ItemBody::Proxy,
            dirty: false,
            version: None,
            created_at: None,
            modified_at: None,
        }
    }

    /// Builder-style setter for freshly created items
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let ItemBody::Full(properties) = &mut self.body {
            properties.insert(name.to_string(), value.into());
            self.dirty = true;
        }
        self
    }

    pub fn type_code(&self) -> &TypeCode {
        &self.type_code
    }

    pub fn pk(&self) -> Option<&Pk> {
        self.pk.as_ref()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_persisted(&self) -> bool {
        self.lifecycle == Lifecycle::Persisted
    }

    pub fn is_removed(&self) -> bool {
        self.lifecycle == Lifecycle::Removed
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.body, ItemBody::Proxy)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn version(&self) -> Option<u64> {
        self.version
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    pub fn body(&self) -> &ItemBody {
        &self.body
    }

    /// Loaded properties, or `None` for a proxy
    pub fn properties(&self) -> Option<&BTreeMap<String, Value>> {
        match &self.body {
            ItemBody::Full(properties) => Some(properties),
            ItemBody::Proxy => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties().and_then(|properties| properties.get(name))
    }

    /// Set a property and mark the item dirty
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        if let Some(pk) = self.removed_pk() {
            return Err(ModelError::Removed(pk));
        }
        match &mut self.body {
            ItemBody::Full(properties) => {
                properties.insert(name.to_string(), value.into());
                self.dirty = true;
                Ok(())
            }
            ItemBody::Proxy => Err(ModelError::ProxyNotLoaded(self.proxy_pk())),
        }
    }

    /// Reference-only projection of this item
    pub fn to_proxy(&self) -> Result<Item> {
        match &self.pk {
            Some(pk) => Ok(Item::proxy(pk.clone())),
            None => Err(ModelError::MissingPk(self.type_code.clone())),
        }
    }

    // ========== Lifecycle transitions driven by the persistence engine ==========

    /// Give a transient item its primary key
    pub fn assign_pk(&mut self, pk: Pk) -> Result<()> {
        match &self.pk {
            Some(existing) if *existing != pk => Err(ModelError::PkImmutable(existing.clone())),
            _ => {
                self.pk = Some(pk);
                Ok(())
            }
        }
    }

    pub fn mark_persisted(
        &mut self,
        version: u64,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) {
        self.lifecycle = Lifecycle::Persisted;
        self.dirty = false;
        self.version = Some(version);
        self.created_at = Some(created_at);
        self.modified_at = Some(modified_at);
    }

    pub fn mark_removed(&mut self) {
        self.lifecycle = Lifecycle::Removed;
        self.dirty = false;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Overwrite this instance in place with a freshly loaded copy
    ///
    /// The primary key is kept; everything else, including the proxy
    /// variant, is replaced by the loaded state.
    pub fn load_from(&mut self, loaded: Item) {
        self.body = loaded.body;
        self.lifecycle = Lifecycle::Persisted;
        self.dirty = false;
        self.version = loaded.version;
        self.created_at = loaded.created_at;
        self.modified_at = loaded.modified_at;
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            pk: self.pk.clone(),
            lifecycle: self.lifecycle,
            dirty: self.dirty,
            version: self.version,
            created_at: self.created_at,
            modified_at: self.modified_at,
        }
    }

    pub fn restore(&mut self, snapshot: ItemSnapshot) {
        self.pk = snapshot.pk;
        self.lifecycle = snapshot.lifecycle;
        self.dirty = snapshot.dirty;
        self.version = snapshot.version;
        self.created_at = snapshot.created_at;
        self.modified_at = snapshot.modified_at;
    }

    /// Build a persisted item from stored state
    pub fn from_stored(
        pk: Pk,
        properties: BTreeMap<String, Value>,
        version: u64,
        created_at: DateTime<Utc>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            type_code: pk.type_code.clone(),
            pk: Some(pk),
            lifecycle: Lifecycle::Persisted,
            body: ItemBody::Full(properties),
            dirty: false,
            version: Some(version),
            created_at: Some(created_at),
            modified_at: Some(modified_at),
        }
    }

    fn removed_pk(&self) -> Option<Pk> {
        match (&self.lifecycle, &self.pk) {
            (Lifecycle::Removed, Some(pk)) => Some(pk.clone()),
            _ => None,
        }
    }

    fn proxy_pk(&self) -> Pk {
        self.pk
            .clone()
            .unwrap_or_else(|| Pk::new(0, self.type_code.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_is_transient() {
        let item = Item::new("User").with("name", "ada");
        assert_eq!(item.lifecycle(), Lifecycle::Transient);
        assert!(item.pk().is_none());
        assert_eq!(item.type_code().as_str(), "user");
        assert_eq!(item.get("name"), Some(&Value::from("ada")));
    }

    #[test]
    fn test_proxy_carries_identity_only() {
        let proxy = Item::proxy(Pk::new(4, "user"));
        assert!(proxy.is_proxy());
        assert!(proxy.properties().is_none());

        let mut proxy = proxy;
        assert!(matches!(
            proxy.set("name", "x"),
            Err(ModelError::ProxyNotLoaded(_))
        ));
    }

    #[test]
    fn test_to_proxy_requires_pk() {
        let item = Item::new("user");
        assert!(matches!(item.to_proxy(), Err(ModelError::MissingPk(_))));
    }

    #[test]
    fn test_pk_is_immutable_once_assigned() {
        let mut item = Item::new("user");
        item.assign_pk(Pk::new(1, "user")).unwrap();
        item.assign_pk(Pk::new(1, "user")).unwrap();
        assert!(item.assign_pk(Pk::new(2, "user")).is_err());
    }

    #[test]
    fn test_load_from_promotes_proxy() {
        let mut proxy = Item::proxy(Pk::new(1, "user"));
        let now = Utc::now();
        let mut properties = BTreeMap::new();
        properties.insert("name".to_string(), Value::from("ada"));
        proxy.load_from(Item::from_stored(Pk::new(1, "user"), properties, 3, now, now));

        assert!(!proxy.is_proxy());
        assert_eq!(proxy.version(), Some(3));
        assert_eq!(proxy.get("name"), Some(&Value::from("ada")));
    }

    #[test]
    fn test_snapshot_restores_bookkeeping() {
        let mut item = Item::new("user").with("name", "ada");
        let before = item.snapshot();
        item.assign_pk(Pk::new(9, "user")).unwrap();
        item.mark_persisted(1, Utc::now(), Utc::now());

        item.restore(before);
        assert!(item.pk().is_none());
        assert_eq!(item.lifecycle(), Lifecycle::Transient);
        assert!(item.is_dirty());
    }

    #[test]
    fn test_removed_item_rejects_writes() {
        let mut item = Item::new("user");
        item.assign_pk(Pk::new(2, "user")).unwrap();
        item.mark_removed();
        assert!(matches!(item.set("name", "x"), Err(ModelError::Removed(_))));
    }
}
