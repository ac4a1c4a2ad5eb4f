//! Write-time uniqueness checks

use crate::mapping::stored_scalar;
use crate::{PersistenceError, Result};
use itemstore_model::{TypeDefinition, Value};
use itemstore_storage::{Predicate, Selection, StoredValue, Transaction};
use std::collections::BTreeMap;

/// Checks transient items against stored records for every unique set
/// of their type
///
/// Enforcement happens at write time only. Two writers racing on the
/// same value may both pass; the backend's own constraint, where it has
/// one, settles the race and surfaces as `ModelNotUnique`.
pub struct UniquenessValidator<'a> {
    def: &'a TypeDefinition,
}

impl<'a> UniquenessValidator<'a> {
    pub fn new(def: &'a TypeDefinition) -> Self {
        Self { def }
    }

    pub fn is_unique(
        &self,
        txn: &dyn Transaction,
        properties: &BTreeMap<String, Value>,
    ) -> Result<bool> {
        Ok(self.find_collision(txn, properties)?.is_none())
    }

    /// First unique set whose values a stored record already holds
    pub fn find_collision(
        &self,
        txn: &dyn Transaction,
        properties: &BTreeMap<String, Value>,
    ) -> Result<Option<Vec<String>>> {
        for set in self.def.unique_sets() {
            let Some(filter) = key_of(set, properties) else {
                continue;
            };
            let selection = Selection::new(self.def.type_code())
                .with_predicate(Some(Predicate::all_equal(filter)));
            let matches = txn
                .count_matching(&selection)
                .map_err(PersistenceError::on_query)?;
            if matches > 0 {
                return Ok(Some(set.clone()));
            }
        }
        Ok(None)
    }
}

/// Stored values of a unique set, or `None` when the set cannot collide:
/// a value is missing, null, a collection or an unsaved item
fn key_of(set: &[String], properties: &BTreeMap<String, Value>) -> Option<Vec<(String, StoredValue)>> {
    set.iter()
        .map(|name| {
            let value = stored_scalar(properties.get(name)?)?;
            (!value.is_null()).then(|| (name.clone(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemstore_model::{Item, ItemRef, Pk, PropertyDescriptor, TypeDescriptor, ValueType};
    use itemstore_storage::{InMemoryStorage, StorageProvider, StoredRecord};

    fn person() -> TypeDefinition {
        TypeDefinition::from_descriptor(
            TypeDescriptor::new("Person")
                .field(PropertyDescriptor::new("email", ValueType::Text).unique())
                .field(PropertyDescriptor::new("first", ValueType::Text))
                .field(PropertyDescriptor::new("last", ValueType::Text))
                .field(PropertyDescriptor::new("team", ValueType::item("team")))
                .unique_together(["first", "last"])
                .unique_together(["team", "first"]),
        )
        .unwrap()
    }

    fn props(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn seeded() -> InMemoryStorage {
        let mut storage = InMemoryStorage::new();
        let mut txn = storage.begin_transaction().unwrap();
        txn.put(
            StoredRecord::new(Pk::new(1, "person"))
                .with("email", StoredValue::Text("ada@example.com".into()))
                .with("first", StoredValue::Text("Ada".into()))
                .with("last", StoredValue::Text("Lovelace".into()))
                .with("team", StoredValue::Reference(Pk::new(7, "team"))),
        )
        .unwrap();
        txn.commit().unwrap();
        storage
    }

    #[test]
    fn test_single_property_collision() {
        let def = person();
        let mut storage = seeded();
        let txn = storage.begin_transaction().unwrap();
        let validator = UniquenessValidator::new(&def);

        let dup = props(&[("email", Value::from("ada@example.com"))]);
        assert_eq!(
            validator.find_collision(txn.as_ref(), &dup).unwrap(),
            Some(vec!["email".to_string()])
        );
        let fresh = props(&[("email", Value::from("bob@example.com"))]);
        assert!(validator.is_unique(txn.as_ref(), &fresh).unwrap());
    }

    #[test]
    fn test_joint_set_needs_every_value() {
        let def = person();
        let mut storage = seeded();
        let txn = storage.begin_transaction().unwrap();
        let validator = UniquenessValidator::new(&def);

        let partial = props(&[("first", Value::from("Ada")), ("last", Value::Null)]);
        assert!(validator.is_unique(txn.as_ref(), &partial).unwrap());

        let full = props(&[("first", Value::from("Ada")), ("last", Value::from("Lovelace"))]);
        assert_eq!(
            validator.find_collision(txn.as_ref(), &full).unwrap(),
            Some(vec!["first".to_string(), "last".to_string()])
        );
    }

    #[test]
    fn test_references_to_unsaved_items_never_collide() {
        let def = person();
        let mut storage = seeded();
        let txn = storage.begin_transaction().unwrap();
        let validator = UniquenessValidator::new(&def);

        let unsaved = ItemRef::new(Item::new("team"));
        let candidate = props(&[("team", Value::from(&unsaved)), ("first", Value::from("Ada"))]);
        assert!(validator.is_unique(txn.as_ref(), &candidate).unwrap());

        let saved = ItemRef::new(Item::proxy(Pk::new(7, "team")));
        let candidate = props(&[("team", Value::from(&saved)), ("first", Value::from("Ada"))]);
        assert!(!validator.is_unique(txn.as_ref(), &candidate).unwrap());
    }
}
