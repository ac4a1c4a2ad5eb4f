//! JSON encoding of record bodies
//!
//! Scalars map onto plain JSON so SQLite's `json_extract` can compare
//! them directly. Kinds JSON cannot tell apart are wrapped in tagged
//! objects: `{"$ts": millis}`, `{"$ref": type, "id": n}` and
//! `{"$map": {...}}`.

use crate::{Result, StorageError, StoredValue};
use itemstore_model::Pk;
use serde_json::{json, Map, Number, Value as Json};
use std::collections::BTreeMap;

pub fn encode(value: &StoredValue) -> Json {
    match value {
        StoredValue::Null => Json::Null,
        StoredValue::Bool(b) => Json::Bool(*b),
        StoredValue::Int(n) => Json::from(*n),
        StoredValue::Float(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
        StoredValue::Text(s) => Json::String(s.clone()),
        StoredValue::Timestamp(ms) => json!({ "$ts": ms }),
        StoredValue::Reference(pk) => json!({ "$ref": pk.type_code.as_str(), "id": pk.id }),
        StoredValue::List(values) => Json::Array(values.iter().map(encode).collect()),
        StoredValue::Map(entries) => {
            let inner: Map<String, Json> = entries
                .iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect();
            json!({ "$map": inner })
        }
    }
}

pub fn decode(json: &Json) -> Result<StoredValue> {
    Ok(match json {
        Json::Null => StoredValue::Null,
        Json::Bool(b) => StoredValue::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => StoredValue::Int(i),
            None => StoredValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => StoredValue::Text(s.clone()),
        Json::Array(values) => StoredValue::List(values.iter().map(decode).collect::<Result<_>>()?),
        Json::Object(object) => decode_tagged(object)?,
    })
}

fn decode_tagged(object: &Map<String, Json>) -> Result<StoredValue> {
    if let Some(ms) = object.get("$ts") {
        return ms
            .as_i64()
            .map(StoredValue::Timestamp)
            .ok_or_else(|| StorageError::Corrupt(format!("bad timestamp: {}", ms)));
    }
    if let Some(code) = object.get("$ref") {
        let code = code.as_str();
        let id = object.get("id").and_then(Json::as_u64);
        return match (code, id) {
            (Some(code), Some(id)) => Ok(StoredValue::Reference(Pk::new(id, code))),
            _ => Err(StorageError::Corrupt(format!("bad reference: {:?}", object))),
        };
    }
    if let Some(Json::Object(entries)) = object.get("$map") {
        let mut map = BTreeMap::new();
        for (k, v) in entries {
            map.insert(k.clone(), decode(v)?);
        }
        return Ok(StoredValue::Map(map));
    }
    Err(StorageError::Corrupt(format!("untagged object: {:?}", object)))
}

/// Encode a record's properties as one JSON object
pub fn encode_properties(properties: &BTreeMap<String, StoredValue>) -> String {
    let object: Map<String, Json> = properties
        .iter()
        .map(|(k, v)| (k.clone(), encode(v)))
        .collect();
    Json::Object(object).to_string()
}

pub fn decode_properties(data: &str) -> Result<BTreeMap<String, StoredValue>> {
    match serde_json::from_str::<Json>(data)? {
        Json::Object(object) => object
            .iter()
            .map(|(k, v)| Ok((k.clone(), decode(v)?)))
            .collect(),
        other => Err(StorageError::Corrupt(format!("record body is not an object: {}", other))),
    }
}
