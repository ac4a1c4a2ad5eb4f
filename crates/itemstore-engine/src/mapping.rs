//! Conversion between in-memory item values and stored records

use crate::{PersistenceError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use itemstore_model::{Item, ItemRef, Pk, TypeDefinition, Value, ValueType};
use itemstore_storage::{StorageError, StoredRecord, StoredValue};
use std::collections::{BTreeMap, HashMap};

/// Already materialized items by PK, shared across the rows of one load
pub type Related = HashMap<Pk, ItemRef>;

/// Stored form of a scalar or a reference to a persisted item
///
/// `None` for collections and for references to unsaved items, which
/// have no stored identity yet.
pub fn stored_scalar(value: &Value) -> Option<StoredValue> {
    match value {
        Value::Null => Some(StoredValue::Null),
        Value::Bool(b) => Some(StoredValue::Bool(*b)),
        Value::Int(n) => Some(StoredValue::Int(*n)),
        Value::Float(f) => Some(StoredValue::Float(*f)),
        Value::Text(s) => Some(StoredValue::Text(s.clone())),
        Value::Timestamp(ts) => Some(StoredValue::Timestamp(ts.timestamp_millis())),
        Value::Item(item) => item.pk().map(StoredValue::Reference),
        Value::List(_) | Value::Map(_) => None,
    }
}

/// Stored form of any value; nested items must already have a PK
pub fn flatten_value(value: &Value, property: &str) -> Result<StoredValue> {
    match value {
        Value::Item(item) => item.pk().map(StoredValue::Reference).ok_or_else(|| {
            PersistenceError::save(format!(
                "property '{}' references an unsaved {} item",
                property,
                item.type_code()
            ))
        }),
        Value::List(values) => values
            .iter()
            .map(|v| flatten_value(v, property))
            .collect::<Result<Vec<_>>>()
            .map(StoredValue::List),
        Value::Map(entries) => entries
            .iter()
            .map(|(key, v)| Ok((key.clone(), flatten_value(v, property)?)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(StoredValue::Map),
        scalar => stored_scalar(scalar).ok_or_else(|| {
            PersistenceError::save(format!("property '{}' cannot be stored", property))
        }),
    }
}

/// Stored properties of an item: writable properties only
pub fn flatten(
    def: &TypeDefinition,
    properties: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, StoredValue>> {
    let mut stored = BTreeMap::new();
    for (name, value) in properties {
        match def.property(name) {
            Some(property) if property.flags.writable => {
                stored.insert(name.clone(), flatten_value(value, name)?);
            }
            _ => {}
        }
    }
    Ok(stored)
}

/// Check every property value against the type definition
pub fn validate(def: &TypeDefinition, properties: &BTreeMap<String, Value>) -> Result<()> {
    for (name, value) in properties {
        let property = def.property(name).ok_or_else(|| {
            itemstore_model::ModelError::UnknownProperty {
                type_code: def.type_code().clone(),
                property: name.clone(),
            }
        })?;
        if !property.value_type.accepts(value) {
            return Err(itemstore_model::ModelError::InvalidValue {
                type_code: def.type_code().clone(),
                property: name.clone(),
                expected: property.value_type.to_string(),
                found: value.kind().to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Whether a stored value fits a property type
pub fn stored_accepts(value_type: &ValueType, value: &StoredValue) -> bool {
    match (value_type, value) {
        (_, StoredValue::Null) | (ValueType::Any, _) => true,
        (ValueType::Bool, StoredValue::Bool(_)) => true,
        (ValueType::Int, StoredValue::Int(_)) => true,
        (ValueType::Float, StoredValue::Float(_) | StoredValue::Int(_)) => true,
        (ValueType::Text, StoredValue::Text(_)) => true,
        (ValueType::Timestamp, StoredValue::Timestamp(_)) => true,
        (ValueType::Item(code), StoredValue::Reference(pk)) => pk.type_code == *code,
        (ValueType::List(element), StoredValue::List(values)) => {
            values.iter().all(|v| stored_accepts(element, v))
        }
        (ValueType::Map(element), StoredValue::Map(values)) => {
            values.values().all(|v| stored_accepts(element, v))
        }
        _ => false,
    }
}

pub fn timestamp_from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        PersistenceError::on_query(StorageError::Corrupt(format!(
            "timestamp {} out of range",
            millis
        )))
    })
}

/// Parse a timestamp written as text: RFC 3339, `YYYY-MM-DD HH:MM:SS`
/// or a bare date
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

/// In-memory form of a stored value; references become proxies unless
/// the referenced item is already in `related`
pub fn stored_to_value(value: &StoredValue, related: &Related) -> Result<Value> {
    Ok(match value {
        StoredValue::Null => Value::Null,
        StoredValue::Bool(b) => Value::Bool(*b),
        StoredValue::Int(n) => Value::Int(*n),
        StoredValue::Float(f) => Value::Float(*f),
        StoredValue::Text(s) => Value::Text(s.clone()),
        StoredValue::Timestamp(ms) => Value::Timestamp(timestamp_from_millis(*ms)?),
        StoredValue::Reference(pk) => Value::Item(
            related
                .get(pk)
                .cloned()
                .unwrap_or_else(|| ItemRef::new(Item::proxy(pk.clone()))),
        ),
        StoredValue::List(values) => Value::List(
            values
                .iter()
                .map(|v| stored_to_value(v, related))
                .collect::<Result<_>>()?,
        ),
        StoredValue::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(key, v)| Ok((key.clone(), stored_to_value(v, related)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

/// Rebuild a persisted item from its stored record
pub fn rehydrate(record: &StoredRecord, related: &Related) -> Result<Item> {
    let properties = record
        .properties
        .iter()
        .map(|(name, value)| Ok((name.clone(), stored_to_value(value, related)?)))
        .collect::<Result<BTreeMap<_, _>>>()?;
    Ok(Item::from_stored(
        record.pk.clone(),
        properties,
        record.version,
        timestamp_from_millis(record.created_at)?,
        timestamp_from_millis(record.modified_at)?,
    ))
}
