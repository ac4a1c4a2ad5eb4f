//! Translation of selections into SQL over the `items` table
//!
//! The root table is always aliased `i`. Bookkeeping fields map onto
//! columns; every other property is read from the JSON body with
//! `json_extract`, so comparisons follow SQLite's null semantics.

use super::schema::{json_path, quote};
use crate::{CompareOp, Direction, Predicate, Result, Selection, SortOrder, StorageError, StoredValue};
use rusqlite::types::Value as SqlValue;

/// A SQL expression with its positional parameters
#[derive(Debug, Default)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Fragment {
    fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    fn literal(sql: &str) -> Self {
        Self::new(sql, Vec::new())
    }
}

fn special_column(property: &str) -> Option<&'static str> {
    match property {
        "pk" | "id" => Some("i.id"),
        "createdAt" => Some("i.created_at"),
        "modifiedAt" => Some("i.modified_at"),
        "version" => Some("i.version"),
        _ => None,
    }
}

fn extract(source: &str, path: &str) -> String {
    format!("json_extract({}, {})", source, quote(path))
}

fn property_path(property: &str, suffix: &str) -> String {
    format!("{}{}", json_path(property), suffix)
}

/// Expression reading a property, shaped for comparison against `sample`
fn column_for(property: &str, sample: &StoredValue) -> String {
    if let Some(column) = special_column(property) {
        return column.to_string();
    }
    match sample {
        StoredValue::Timestamp(_) => extract("i.data", &property_path(property, ".\"$ts\"")),
        _ => extract("i.data", &json_path(property)),
    }
}

/// Scalar parameter for a stored value; references and collections have none
pub fn scalar_param(value: &StoredValue) -> Option<SqlValue> {
    Some(match value {
        StoredValue::Null => SqlValue::Null,
        StoredValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        StoredValue::Int(n) | StoredValue::Timestamp(n) => SqlValue::Integer(*n),
        StoredValue::Float(f) => SqlValue::Real(*f),
        StoredValue::Text(s) => SqlValue::Text(s.clone()),
        StoredValue::Reference(_) | StoredValue::List(_) | StoredValue::Map(_) => return None,
    })
}

fn unsupported(what: &str, property: &str) -> StorageError {
    StorageError::Unsupported(format!("{} on property '{}'", what, property))
}

/// Equality of a JSON-encoded reference, read from `source` at `path`
fn reference_equals(source: &str, path: &str, type_code: &str, id: u64) -> Fragment {
    Fragment::new(
        format!(
            "({} = ? AND {} = ?)",
            extract(source, &format!("{}.\"$ref\"", path)),
            extract(source, &format!("{}.\"id\"", path)),
        ),
        vec![
            SqlValue::Text(type_code.to_string()),
            SqlValue::Integer(id as i64),
        ],
    )
}

pub fn predicate(pred: &Predicate) -> Result<Fragment> {
    match pred {
        Predicate::Compare {
            property,
            op,
            value,
        } => compare(property, *op, value),
        Predicate::Like { property, pattern } => Ok(Fragment::new(
            format!("{} LIKE ?", column_for(property, &StoredValue::Null)),
            vec![SqlValue::Text(pattern.clone())],
        )),
        Predicate::In { property, values } => {
            if values.is_empty() {
                return Ok(Fragment::literal("0"));
            }
            if values.iter().any(|v| matches!(v, StoredValue::Reference(_))) {
                let alternatives: Vec<Predicate> = values
                    .iter()
                    .map(|v| Predicate::equals(property.as_str(), v.clone()))
                    .collect();
                return join(&alternatives, " OR ", "0");
            }
            let sample = values.iter().find(|v| !v.is_null()).unwrap_or(&StoredValue::Null);
            let params = values
                .iter()
                .map(|v| scalar_param(v).ok_or_else(|| unsupported("IN with a non-scalar value", property)))
                .collect::<Result<Vec<_>>>()?;
            let marks = vec!["?"; params.len()].join(", ");
            Ok(Fragment::new(
                format!("{} IN ({})", column_for(property, sample), marks),
                params,
            ))
        }
        Predicate::Contains { property, value } => contains(property, value),
        Predicate::IsNull { property, negated } => Ok(Fragment::literal(&format!(
            "{} IS {}NULL",
            column_for(property, &StoredValue::Null),
            if *negated { "NOT " } else { "" }
        ))),
        Predicate::And(parts) => join(parts, " AND ", "1"),
        Predicate::Or(parts) => join(parts, " OR ", "0"),
        Predicate::Not(inner) => {
            let inner = predicate(inner)?;
            Ok(Fragment::new(format!("NOT ({})", inner.sql), inner.params))
        }
    }
}

fn compare(property: &str, op: CompareOp, value: &StoredValue) -> Result<Fragment> {
    if let StoredValue::Reference(pk) = value {
        let equals = reference_equals("i.data", &json_path(property), &pk.type_code, pk.id);
        return Ok(match op {
            CompareOp::Eq => equals,
            CompareOp::Ne => Fragment::new(format!("NOT {}", equals.sql), equals.params),
            // references only support equality; ordering is unknown
            _ => Fragment::literal("NULL"),
        });
    }
    let param = scalar_param(value).ok_or_else(|| unsupported("comparison with a collection", property))?;
    Ok(Fragment::new(
        format!("{} {} ?", column_for(property, value), op.symbol()),
        vec![param],
    ))
}

fn contains(property: &str, value: &StoredValue) -> Result<Fragment> {
    let list = format!("json_each(i.data, {})", quote(&json_path(property)));
    let element = match value {
        StoredValue::Reference(pk) => reference_equals("value", "$", &pk.type_code, pk.id),
        StoredValue::Timestamp(ms) => Fragment::new(
            format!("{} = ?", extract("value", "$.\"$ts\"")),
            vec![SqlValue::Integer(*ms)],
        ),
        other => Fragment::new(
            "value = ?",
            vec![scalar_param(other).ok_or_else(|| unsupported("CONTAINS with a collection", property))?],
        ),
    };
    Ok(Fragment::new(
        format!("EXISTS (SELECT 1 FROM {} WHERE {})", list, element.sql),
        element.params,
    ))
}

fn join(parts: &[Predicate], separator: &str, empty: &str) -> Result<Fragment> {
    if parts.is_empty() {
        return Ok(Fragment::literal(empty));
    }
    let mut sql = Vec::with_capacity(parts.len());
    let mut params = Vec::new();
    for part in parts {
        let fragment = predicate(part)?;
        sql.push(format!("({})", fragment.sql));
        params.extend(fragment.params);
    }
    Ok(Fragment::new(sql.join(separator), params))
}

/// `WHERE` clause of a selection over the root alias `i`
pub fn where_clause(selection: &Selection) -> Result<Fragment> {
    let mut clauses = vec!["i.type_code = ?".to_string()];
    let mut params = vec![SqlValue::Text(selection.type_code.to_string())];

    if let Some(ids) = &selection.ids {
        if ids.is_empty() {
            clauses.push("0".to_string());
        } else {
            clauses.push(format!("i.id IN ({})", vec!["?"; ids.len()].join(", ")));
            params.extend(ids.iter().map(|id| SqlValue::Integer(*id as i64)));
        }
    }
    if let Some(pred) = &selection.predicate {
        let fragment = predicate(pred)?;
        clauses.push(format!("({})", fragment.sql));
        params.extend(fragment.params);
    }
    Ok(Fragment::new(clauses.join(" AND "), params))
}

/// `ORDER BY` list; the id is always the final sort key
pub fn order_by(order: &[SortOrder]) -> String {
    let mut terms: Vec<String> = order
        .iter()
        .map(|o| {
            let expr = match special_column(&o.property) {
                Some(column) => column.to_string(),
                // tagged timestamps and references sort by their numeric part
                None => format!(
                    "COALESCE({}, {}, {})",
                    extract("i.data", &property_path(&o.property, ".\"$ts\"")),
                    extract("i.data", &property_path(&o.property, ".\"id\"")),
                    extract("i.data", &json_path(&o.property)),
                ),
            };
            match o.direction {
                Direction::Asc => format!("{} ASC", expr),
                Direction::Desc => format!("{} DESC", expr),
            }
        })
        .collect();
    let ends_with_id = order
        .last()
        .map_or(false, |o| special_column(&o.property) == Some("i.id"));
    if !ends_with_id {
        terms.push("i.id ASC".to_string());
    }
    terms.join(", ")
}

/// `LIMIT`/`OFFSET` suffix for the selection's window
pub fn limit_clause(selection: &Selection) -> String {
    match selection.window {
        Some(window) => format!(" LIMIT {} OFFSET {}", window.limit, window.offset),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemstore_model::Pk;

    #[test]
    fn test_special_fields_use_columns() {
        let fragment = predicate(&Predicate::equals("pk", StoredValue::Int(3))).unwrap();
        assert_eq!(fragment.sql, "i.id = ?");
        assert_eq!(fragment.params, vec![SqlValue::Integer(3)]);
    }

    #[test]
    fn test_reference_comparison_reads_both_keys() {
        let fragment = predicate(&Predicate::equals(
            "owner",
            StoredValue::Reference(Pk::new(4, "user")),
        ))
        .unwrap();
        assert!(fragment.sql.contains("'$.\"owner\".\"$ref\"'"));
        assert_eq!(fragment.params.len(), 2);
    }

    #[test]
    fn test_empty_connectives() {
        assert_eq!(predicate(&Predicate::And(vec![])).unwrap().sql, "1");
        assert_eq!(predicate(&Predicate::Or(vec![])).unwrap().sql, "0");
        let empty_in = Predicate::In {
            property: "age".into(),
            values: vec![],
        };
        assert_eq!(predicate(&empty_in).unwrap().sql, "0");
    }

    #[test]
    fn test_in_over_references_becomes_alternatives() {
        let pred = Predicate::In {
            property: "owner".into(),
            values: vec![
                StoredValue::Reference(Pk::new(1, "user")),
                StoredValue::Reference(Pk::new(2, "user")),
            ],
        };
        let fragment = predicate(&pred).unwrap();
        assert_eq!(fragment.sql.matches(" OR ").count(), 1);
        assert_eq!(
            fragment.params,
            vec![
                SqlValue::Text("user".into()),
                SqlValue::Integer(1),
                SqlValue::Text("user".into()),
                SqlValue::Integer(2),
            ]
        );
    }

    #[test]
    fn test_order_by_reads_reference_ids() {
        let sql = order_by(&[SortOrder::asc("owner")]);
        assert!(sql.contains("'$.\"owner\".\"id\"'"));
    }

    #[test]
    fn test_collection_operand_is_unsupported() {
        let pred = Predicate::equals("tags", StoredValue::List(vec![]));
        assert!(matches!(predicate(&pred), Err(StorageError::Unsupported(_))));
    }

    #[test]
    fn test_order_by_ends_with_id() {
        let sql = order_by(&SortOrder::default_order());
        assert_eq!(sql, "i.created_at ASC, i.id ASC");
        let sql = order_by(&[SortOrder::desc("name")]);
        assert!(sql.starts_with("COALESCE("));
        assert!(sql.ends_with("DESC, i.id ASC"));
    }
}
