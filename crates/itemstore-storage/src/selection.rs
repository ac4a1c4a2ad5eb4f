//! Selections: what a query asks a backend for

use crate::{Predicate, StoredRecord, StoredValue};
use itemstore_model::TypeCode;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub property: String,
    pub direction: Direction,
}

impl SortOrder {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
        }
    }

    /// Creation time, then primary key: stable under concurrent inserts
    pub fn default_order() -> Vec<SortOrder> {
        vec![SortOrder::asc("createdAt"), SortOrder::asc("pk")]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub property: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    Records,
    Columns(Vec<Column>),
}

/// A query over the records of one type
#[derive(Debug, Clone)]
pub struct Selection {
    pub type_code: TypeCode,
    pub predicate: Option<Predicate>,
    /// Restrict to these primary key ids
    pub ids: Option<Vec<u64>>,
    pub order: Vec<SortOrder>,
    pub window: Option<Window>,
    pub projection: Projection,
    /// Relation properties whose referenced records are loaded alongside
    pub eager: Vec<String>,
}

impl Selection {
    pub fn new(type_code: impl Into<TypeCode>) -> Self {
        Self {
            type_code: type_code.into(),
            predicate: None,
            ids: None,
            order: Vec::new(),
            window: None,
            projection: Projection::Records,
            eager: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_ids(mut self, ids: Vec<u64>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_order(mut self, order: Vec<SortOrder>) -> Self {
        self.order = order;
        self
    }

    pub fn with_window(mut self, window: Option<Window>) -> Self {
        self.window = window;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_eager(mut self, eager: Vec<String>) -> Self {
        self.eager = eager;
        self
    }
}

/// A root record with the records its eager properties reference
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRecord {
    pub record: StoredRecord,
    pub related: Vec<StoredRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Record(FetchedRecord),
    /// Aliased column values
    Tuple(Vec<(String, StoredValue)>),
}

impl Row {
    pub(crate) fn project(record: StoredRecord, projection: &Projection) -> Row {
        match projection {
            Projection::Records => Row::Record(FetchedRecord {
                record,
                related: Vec::new(),
            }),
            Projection::Columns(columns) => Row::Tuple(
                columns
                    .iter()
                    .map(|c| (c.alias.clone(), record.field(&c.property)))
                    .collect(),
            ),
        }
    }
}
