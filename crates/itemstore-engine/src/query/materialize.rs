//! Mapping query rows onto result types

use crate::{PersistenceError, Result};
use itemstore_model::{ItemRef, RowType, Value};

/// Aliased column values of one row
pub type Tuple = Vec<(String, Value)>;

/// A row as the engine hands it to materialization
#[derive(Debug, Clone)]
pub enum QueryRow {
    Item(ItemRef),
    Tuple(Tuple),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Whole items; eager fetching applies
    Items,
    /// Scalars, tuples or plain records
    Rows,
}

/// A type query results can be materialized into
///
/// A row that cannot be mapped fails the whole query.
pub trait FromQueryRow: Sized {
    const KIND: ResultKind = ResultKind::Rows;

    fn from_row(row: QueryRow) -> Result<Self>;
}

fn unmappable(target: &str, row: &QueryRow) -> PersistenceError {
    let shape = match row {
        QueryRow::Item(item) => format!("a {} item", item.type_code()),
        QueryRow::Tuple(columns) => format!("a row of {} column(s)", columns.len()),
    };
    PersistenceError::query(format!("cannot map {} onto {}", shape, target))
}

/// The value of a single-column row
fn single(row: QueryRow, target: &str) -> Result<Value> {
    match row {
        QueryRow::Tuple(mut columns) if columns.len() == 1 => Ok(columns.remove(0).1),
        QueryRow::Item(item) => Ok(Value::Item(item)),
        other => Err(unmappable(target, &other)),
    }
}

/// Columns of a row; an item row lists its loaded properties
fn columns(row: QueryRow) -> Tuple {
    match row {
        QueryRow::Tuple(columns) => columns,
        QueryRow::Item(item) => item
            .read()
            .properties()
            .map(|properties| {
                properties
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

impl FromQueryRow for ItemRef {
    const KIND: ResultKind = ResultKind::Items;

    fn from_row(row: QueryRow) -> Result<Self> {
        match row {
            QueryRow::Item(item) => Ok(item),
            QueryRow::Tuple(columns) if columns.len() == 1 => match &columns[0].1 {
                Value::Item(item) => Ok(item.clone()),
                _ => Err(unmappable("an item", &QueryRow::Tuple(columns))),
            },
            other => Err(unmappable("an item", &other)),
        }
    }
}

impl FromQueryRow for Value {
    fn from_row(row: QueryRow) -> Result<Self> {
        single(row, "a value")
    }
}

macro_rules! scalar_from_row {
    ($ty:ty, $name:literal, $pattern:pat => $value:expr) => {
        impl FromQueryRow for $ty {
            fn from_row(row: QueryRow) -> Result<Self> {
                match single(row, $name)? {
                    $pattern => Ok($value),
                    other => Err(PersistenceError::query(format!(
                        "cannot map a {} column onto {}",
                        other.kind(),
                        $name
                    ))),
                }
            }
        }
    };
}

scalar_from_row!(i64, "an integer", Value::Int(n) => n);
scalar_from_row!(String, "a string", Value::Text(s) => s);
scalar_from_row!(bool, "a bool", Value::Bool(b) => b);

impl FromQueryRow for f64 {
    fn from_row(row: QueryRow) -> Result<Self> {
        let value = single(row, "a float")?;
        value.as_float().ok_or_else(|| {
            PersistenceError::query(format!("cannot map a {} column onto a float", value.kind()))
        })
    }
}

impl FromQueryRow for Tuple {
    fn from_row(row: QueryRow) -> Result<Self> {
        Ok(columns(row))
    }
}

/// A plain record type materialized through its accessor table
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T>(pub T);

impl<T> Record<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: RowType> FromQueryRow for Record<T> {
    fn from_row(row: QueryRow) -> Result<Self> {
        let columns = columns(row);
        let values: Vec<Value> = columns.iter().map(|(_, v)| v.clone()).collect();
        if let Some(record) = T::construct(&values) {
            return Ok(Record(record));
        }

        let table = T::accessors();
        let mut record = T::blank().ok_or_else(|| {
            PersistenceError::query(format!(
                "{} cannot be built from a row of {} column(s)",
                table.type_name(),
                columns.len()
            ))
        })?;
        for (alias, value) in columns {
            table
                .set(&mut record, &alias, value)
                .map_err(|e| PersistenceError::query(e.to_string()))?;
        }
        Ok(Record(record))
    }
}
