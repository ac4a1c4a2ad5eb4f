//! Property values and shared item handles

use crate::{Item, ModelError, Pk, TypeCode};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A property value held by an item
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Item(ItemRef),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_item(&self) -> Option<&ItemRef> {
        match self {
            Value::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the value's kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Item(_) => "item",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Item(a), Value::Item(b)) => a.same_item(b),
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<ItemRef> for Value {
    fn from(item: ItemRef) -> Self {
        Value::Item(item)
    }
}

impl From<&ItemRef> for Value {
    fn from(item: &ItemRef) -> Self {
        Value::Item(item.clone())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Shared, mutable handle to an item inside an object graph
///
/// Graphs may contain cycles, so nested items are referenced through
/// handles rather than owned. Two handles are the same item when they
/// point at the same allocation or carry the same primary key.
#[derive(Clone)]
pub struct ItemRef(Arc<RwLock<Item>>);

impl ItemRef {
    pub fn new(item: Item) -> Self {
        Self(Arc::new(RwLock::new(item)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Item> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Item> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ptr_eq(&self, other: &ItemRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn same_item(&self, other: &ItemRef) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.pk(), other.pk()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Address of the shared allocation, stable for the handle's lifetime
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn pk(&self) -> Option<Pk> {
        self.read().pk().cloned()
    }

    pub fn type_code(&self) -> TypeCode {
        self.read().type_code().clone()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.read().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        self.write().set(name, value)
    }
}

impl From<Item> for ItemRef {
    fn from(item: Item) -> Self {
        ItemRef::new(item)
    }
}

impl fmt::Debug for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Nested handles print by identity only; graphs can be cyclic.
        match self.0.try_read() {
            Ok(item) => match item.pk() {
                Some(pk) => write!(f, "ItemRef({})", pk),
                None => write!(f, "ItemRef({} <transient>)", item.type_code()),
            },
            Err(_) => write!(f, "ItemRef(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_conversions() {
        assert_eq!(Value::from(3).as_int(), Some(3));
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_item_refs_compare_by_identity_then_pk() {
        let a = ItemRef::new(Item::new("user"));
        let b = ItemRef::new(Item::new("user"));
        assert_eq!(Value::from(&a), Value::from(&a));
        assert_ne!(Value::from(&a), Value::from(&b));

        let p1 = ItemRef::new(Item::proxy(Pk::new(1, "user")));
        let p2 = ItemRef::new(Item::proxy(Pk::new(1, "user")));
        assert!(p1.same_item(&p2));
    }

    #[test]
    fn test_set_through_handle_marks_dirty() {
        let item = ItemRef::new(Item::new("user"));
        item.set("name", "ada").unwrap();
        assert_eq!(item.get("name"), Some(Value::from("ada")));
        assert!(item.read().is_dirty());
    }
}
