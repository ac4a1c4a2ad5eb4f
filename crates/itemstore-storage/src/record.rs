//! Flattened record format shared by all backends

use itemstore_model::Pk;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A property value as stored: nested items are reduced to references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Milliseconds since the Unix epoch
    Timestamp(i64),
    Reference(Pk),
    List(Vec<StoredValue>),
    Map(BTreeMap<String, StoredValue>),
}

impl StoredValue {
    pub fn is_null(&self) -> bool {
        matches!(self, StoredValue::Null)
    }

    /// References held directly or as list elements, with their position
    pub fn references(&self) -> Vec<(usize, &Pk)> {
        match self {
            StoredValue::Reference(pk) => vec![(0, pk)],
            StoredValue::List(values) => values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| match v {
                    StoredValue::Reference(pk) => Some((i, pk)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// One stored item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub pk: Pk,
    pub version: u64,
    pub created_at: i64,
    pub modified_at: i64,
    pub properties: BTreeMap<String, StoredValue>,
}

impl StoredRecord {
    pub fn new(pk: Pk) -> Self {
        let now = now_millis();
        Self {
            pk,
            version: 1,
            created_at: now,
            modified_at: now,
            properties: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: StoredValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    /// Value of a property or bookkeeping field, `Null` when absent
    ///
    /// `pk`/`id`, `createdAt`, `modifiedAt` and `version` read the
    /// record's bookkeeping rather than its properties.
    pub fn field(&self, name: &str) -> StoredValue {
        match name {
            "pk" | "id" => StoredValue::Int(self.pk.id as i64),
            "createdAt" => StoredValue::Timestamp(self.created_at),
            "modifiedAt" => StoredValue::Timestamp(self.modified_at),
            "version" => StoredValue::Int(self.version as i64),
            _ => self
                .properties
                .get(name)
                .cloned()
                .unwrap_or(StoredValue::Null),
        }
    }

    /// Referenced records of the given properties
    pub fn references_in<'a>(&'a self, properties: &'a [String]) -> impl Iterator<Item = &'a Pk> {
        properties
            .iter()
            .filter_map(|name| self.properties.get(name))
            .flat_map(|value| value.references().into_iter().map(|(_, pk)| pk))
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookkeeping_fields() {
        let record = StoredRecord::new(Pk::new(5, "user")).with("name", StoredValue::Text("ada".into()));
        assert_eq!(record.field("pk"), StoredValue::Int(5));
        assert_eq!(record.field("version"), StoredValue::Int(1));
        assert_eq!(record.field("name"), StoredValue::Text("ada".into()));
        assert_eq!(record.field("missing"), StoredValue::Null);
    }

    #[test]
    fn test_references_in_lists() {
        let record = StoredRecord::new(Pk::new(1, "order"))
            .with("customer", StoredValue::Reference(Pk::new(3, "customer")))
            .with(
                "lines",
                StoredValue::List(vec![
                    StoredValue::Reference(Pk::new(10, "line")),
                    StoredValue::Reference(Pk::new(11, "line")),
                ]),
            );
        let props = vec!["lines".to_string()];
        let ids: Vec<u64> = record.references_in(&props).map(|pk| pk.id).collect();
        assert_eq!(ids, vec![10, 11]);
    }
}
