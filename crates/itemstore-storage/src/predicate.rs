//! Record predicates and their in-memory evaluation
//!
//! Evaluation follows SQL's three-valued logic so that the key-value
//! backends and the relational backend agree: any comparison involving a
//! null is unknown, and unknown never matches.

use crate::{StoredRecord, StoredValue};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        property: String,
        op: CompareOp,
        value: StoredValue,
    },
    /// SQL `LIKE` pattern: `%` any run, `_` any single character
    Like { property: String, pattern: String },
    In {
        property: String,
        values: Vec<StoredValue>,
    },
    /// A list-valued property holds the value
    Contains {
        property: String,
        value: StoredValue,
    },
    IsNull { property: String, negated: bool },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn equals(property: impl Into<String>, value: StoredValue) -> Self {
        Predicate::Compare {
            property: property.into(),
            op: CompareOp::Eq,
            value,
        }
    }

    /// Conjunction of exact matches, as used by filter-map lookups
    pub fn all_equal(filter: impl IntoIterator<Item = (String, StoredValue)>) -> Self {
        Predicate::And(
            filter
                .into_iter()
                .map(|(property, value)| Predicate::equals(property, value))
                .collect(),
        )
    }

    pub fn matches(&self, record: &StoredRecord) -> bool {
        self.eval(record) == Some(true)
    }

    /// Every property name the predicate reads
    pub fn properties(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_properties(&mut out);
        out
    }

    fn collect_properties<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare { property, .. }
            | Predicate::Like { property, .. }
            | Predicate::In { property, .. }
            | Predicate::Contains { property, .. }
            | Predicate::IsNull { property, .. } => out.push(property),
            Predicate::And(parts) | Predicate::Or(parts) => {
                parts.iter().for_each(|p| p.collect_properties(out))
            }
            Predicate::Not(inner) => inner.collect_properties(out),
        }
    }

    fn eval(&self, record: &StoredRecord) -> Option<bool> {
        match self {
            Predicate::Compare {
                property,
                op,
                value,
            } => {
                let actual = record.field(property);
                match (&actual, value) {
                    (StoredValue::Reference(a), StoredValue::Reference(b)) => match op {
                        CompareOp::Eq => Some(a == b),
                        CompareOp::Ne => Some(a != b),
                        _ => None,
                    },
                    _ => compare_values(&actual, value).map(|ord| op.holds(ord)),
                }
            }
            Predicate::Like { property, pattern } => match record.field(property) {
                StoredValue::Text(text) => Some(like(&text, pattern)),
                StoredValue::Null => None,
                _ => Some(false),
            },
            Predicate::In { property, values } => {
                let actual = record.field(property);
                if actual.is_null() {
                    return None;
                }
                Some(
                    values
                        .iter()
                        .any(|v| compare_values(&actual, v) == Some(Ordering::Equal)),
                )
            }
            Predicate::Contains { property, value } => match record.field(property) {
                StoredValue::List(items) => Some(
                    items
                        .iter()
                        .any(|v| compare_values(v, value) == Some(Ordering::Equal)),
                ),
                StoredValue::Null => None,
                _ => Some(false),
            },
            Predicate::IsNull { property, negated } => {
                Some(record.field(property).is_null() != *negated)
            }
            Predicate::And(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match part.eval(record) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            Predicate::Or(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match part.eval(record) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            Predicate::Not(inner) => inner.eval(record).map(|b| !b),
        }
    }
}

fn numeric(value: &StoredValue) -> Option<f64> {
    match value {
        StoredValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        StoredValue::Int(n) | StoredValue::Timestamp(n) => Some(*n as f64),
        StoredValue::Float(f) => Some(*f),
        _ => None,
    }
}

/// Compare two scalar values; `None` when either is null or the kinds
/// are not comparable
pub fn compare_values(a: &StoredValue, b: &StoredValue) -> Option<Ordering> {
    match (a, b) {
        (StoredValue::Null, _) | (_, StoredValue::Null) => None,
        (StoredValue::Int(x), StoredValue::Int(y)) => Some(x.cmp(y)),
        (StoredValue::Text(x), StoredValue::Text(y)) => Some(x.cmp(y)),
        (StoredValue::Reference(x), StoredValue::Reference(y)) => Some(x.id.cmp(&y.id)),
        _ => match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}

fn sort_rank(value: &StoredValue) -> u8 {
    match value {
        StoredValue::Null => 0,
        StoredValue::Bool(_) | StoredValue::Int(_) | StoredValue::Float(_) | StoredValue::Timestamp(_) => 1,
        StoredValue::Text(_) => 2,
        StoredValue::Reference(_) => 3,
        StoredValue::List(_) | StoredValue::Map(_) => 4,
    }
}

/// Total order used for sorting: nulls first, then numbers, then text
pub fn sort_values(a: &StoredValue, b: &StoredValue) -> Ordering {
    sort_rank(a)
        .cmp(&sort_rank(b))
        .then_with(|| compare_values(a, b).unwrap_or(Ordering::Equal))
}

/// Case-insensitive (ASCII) `LIKE` matching
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    like_from(&text, &pattern)
}

fn like_from(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| like_from(&text[skip..], rest)),
        Some(('_', rest)) => !text.is_empty() && like_from(&text[1..], rest),
        Some((c, rest)) => text.first() == Some(c) && like_from(&text[1..], rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itemstore_model::Pk;

    fn user(id: u64, name: &str, age: i64) -> StoredRecord {
        StoredRecord::new(Pk::new(id, "user"))
            .with("name", StoredValue::Text(name.into()))
            .with("age", StoredValue::Int(age))
    }

    #[test]
    fn test_comparisons() {
        let ada = user(1, "Ada", 36);
        let pred = Predicate::Compare {
            property: "age".into(),
            op: CompareOp::Ge,
            value: StoredValue::Float(36.0),
        };
        assert!(pred.matches(&ada));
        assert!(Predicate::equals("pk", StoredValue::Int(1)).matches(&ada));
    }

    #[test]
    fn test_null_is_unknown() {
        let ada = user(1, "Ada", 36);
        let ne = Predicate::Compare {
            property: "nickname".into(),
            op: CompareOp::Ne,
            value: StoredValue::Text("x".into()),
        };
        assert!(!ne.matches(&ada));
        assert!(!Predicate::Not(Box::new(ne)).matches(&ada));
        assert!(Predicate::IsNull {
            property: "nickname".into(),
            negated: false
        }
        .matches(&ada));
    }

    #[test]
    fn test_like_and_in() {
        let ada = user(1, "Ada Lovelace", 36);
        assert!(Predicate::Like {
            property: "name".into(),
            pattern: "ada%".into()
        }
        .matches(&ada));
        assert!(!Predicate::Like {
            property: "name".into(),
            pattern: "_da".into()
        }
        .matches(&ada));
        assert!(Predicate::In {
            property: "age".into(),
            values: vec![StoredValue::Int(1), StoredValue::Int(36)]
        }
        .matches(&ada));
    }

    #[test]
    fn test_or_with_unknown_branch() {
        let ada = user(1, "Ada", 36);
        let pred = Predicate::Or(vec![
            Predicate::equals("nickname", StoredValue::Text("x".into())),
            Predicate::equals("name", StoredValue::Text("Ada".into())),
        ]);
        assert!(pred.matches(&ada));
    }

    #[test]
    fn test_sort_order_puts_nulls_first() {
        let mut values = vec![
            StoredValue::Text("b".into()),
            StoredValue::Int(2),
            StoredValue::Null,
            StoredValue::Float(1.5),
        ];
        values.sort_by(sort_values);
        assert_eq!(
            values,
            vec![
                StoredValue::Null,
                StoredValue::Float(1.5),
                StoredValue::Int(2),
                StoredValue::Text("b".into()),
            ]
        );
    }
}
