//! Conversion between JSON documents and item values

use crate::CliError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use itemstore_engine::Tuple;
use itemstore_model::{Item, ItemRef, Pk, TypeDefinition, Value, ValueType};
use serde_json::{json, Map, Number};
use std::collections::BTreeMap;

/// Convert a JSON object into property values using the declared types
///
/// Properties the type does not declare are converted loosely; the engine
/// rejects them when the item is saved.
pub fn properties_from_json(
    def: &TypeDefinition,
    document: &serde_json::Value,
) -> Result<BTreeMap<String, Value>, CliError> {
    let object = document
        .as_object()
        .ok_or_else(|| CliError::Usage("item document must be a JSON object".into()))?;
    let mut properties = BTreeMap::new();
    for (name, raw) in object {
        let value_type = def
            .property(name)
            .map(|p| p.value_type.clone())
            .unwrap_or(ValueType::Any);
        properties.insert(name.clone(), from_json(raw, &value_type, name)?);
    }
    Ok(properties)
}

/// Parse a `key=value` filter argument; the value is JSON when it parses
/// as JSON and plain text otherwise
pub fn filter_entry(def: &TypeDefinition, argument: &str) -> Result<(String, Value), CliError> {
    let (name, raw) = argument
        .split_once('=')
        .ok_or_else(|| CliError::Usage(format!("expected key=value, got '{}'", argument)))?;
    let raw: serde_json::Value =
        serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    let value_type = def
        .property(name)
        .map(|p| p.value_type.clone())
        .unwrap_or(ValueType::Any);
    Ok((name.to_string(), from_json(&raw, &value_type, name)?))
}

pub fn from_json(raw: &serde_json::Value, value_type: &ValueType, name: &str) -> Result<Value, CliError> {
    use serde_json::Value as Json;

    let mismatch = || CliError::Usage(format!("'{}' expects {}, got {}", name, value_type, raw));
    Ok(match (value_type, raw) {
        (_, Json::Null) => Value::Null,
        (ValueType::Bool | ValueType::Any, Json::Bool(b)) => Value::Bool(*b),
        (ValueType::Int, Json::Number(n)) => Value::Int(n.as_i64().ok_or_else(mismatch)?),
        (ValueType::Float, Json::Number(n)) => Value::Float(n.as_f64().ok_or_else(mismatch)?),
        (ValueType::Any, Json::Number(n)) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().ok_or_else(mismatch)?),
        },
        (ValueType::Text | ValueType::Any, Json::String(s)) => Value::Text(s.clone()),
        (ValueType::Timestamp, Json::String(s)) => {
            Value::Timestamp(parse_timestamp(s).ok_or_else(mismatch)?)
        }
        (ValueType::Timestamp, Json::Number(n)) => {
            let millis = n.as_i64().ok_or_else(mismatch)?;
            Value::Timestamp(DateTime::from_timestamp_millis(millis).ok_or_else(mismatch)?)
        }
        // References are given by id, either bare or as {"id": n}
        (ValueType::Item(code), Json::Number(n)) => {
            let id = n.as_u64().ok_or_else(mismatch)?;
            Value::Item(ItemRef::new(Item::proxy(Pk::new(id, code))))
        }
        (ValueType::Item(code), Json::Object(object)) => {
            let id = object.get("id").and_then(Json::as_u64).ok_or_else(mismatch)?;
            Value::Item(ItemRef::new(Item::proxy(Pk::new(id, code))))
        }
        (ValueType::List(element), Json::Array(values)) => Value::List(
            values
                .iter()
                .map(|v| from_json(v, element, name))
                .collect::<Result<_, _>>()?,
        ),
        (ValueType::Any, Json::Array(values)) => Value::List(
            values
                .iter()
                .map(|v| from_json(v, &ValueType::Any, name))
                .collect::<Result<_, _>>()?,
        ),
        (ValueType::Map(element), Json::Object(entries)) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), from_json(v, element, name)?)))
                .collect::<Result<_, CliError>>()?,
        ),
        (ValueType::Any, Json::Object(entries)) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), from_json(v, &ValueType::Any, name)?)))
                .collect::<Result<_, CliError>>()?,
        ),
        _ => return Err(mismatch()),
    })
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(parsed.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Render an item with its bookkeeping; related items that were loaded
/// are expanded one level deep
pub fn item_to_json(item: &ItemRef) -> serde_json::Value {
    render_item(item, 2)
}

fn render_item(item: &ItemRef, depth: usize) -> serde_json::Value {
    let guard = item.read();
    let pk = guard
        .pk()
        .map(|pk| json!({ "type": pk.type_code.as_str(), "id": pk.id }))
        .unwrap_or(serde_json::Value::Null);
    let Some(properties) = guard.properties().filter(|_| depth > 0) else {
        return pk;
    };

    let rendered: Map<String, serde_json::Value> = properties
        .iter()
        .map(|(name, value)| (name.clone(), to_json(value, depth - 1)))
        .collect();
    json!({
        "pk": pk,
        "version": guard.version(),
        "createdAt": guard.created_at().map(timestamp),
        "modifiedAt": guard.modified_at().map(timestamp),
        "properties": rendered,
    })
}

pub fn to_json(value: &Value, depth: usize) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Timestamp(t) => serde_json::Value::String(timestamp(*t)),
        Value::Item(item) => render_item(item, depth),
        Value::List(values) => values.iter().map(|v| to_json(v, depth)).collect(),
        Value::Map(entries) => entries
            .iter()
            .map(|(k, v)| (k.clone(), to_json(v, depth)))
            .collect::<Map<_, _>>()
            .into(),
    }
}

pub fn tuple_to_json(tuple: &Tuple) -> serde_json::Value {
    tuple
        .iter()
        .map(|(name, value)| (name.clone(), to_json(value, 0)))
        .collect::<Map<_, _>>()
        .into()
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}
