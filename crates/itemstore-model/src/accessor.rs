//! Typed accessor tables
//!
//! An [`AccessorTable`] maps property names onto get/set functions over
//! the fields of a plain Rust struct. It gives typed records the same
//! "properties by name" contract as items without runtime reflection.

use crate::{ModelError, PropertyDescriptor, Result, TypeCode, TypeDescriptor, Value, ValueType};

/// Setter result: the rejected value is handed back on a type mismatch
pub type Setter<T> = fn(&mut T, Value) -> std::result::Result<(), Value>;

pub struct Accessor<T> {
    name: &'static str,
    value_type: ValueType,
    get: fn(&T) -> Value,
    set: Setter<T>,
}

impl<T> Accessor<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }
}

pub struct AccessorTable<T> {
    type_name: &'static str,
    entries: Vec<Accessor<T>>,
}

impl<T> AccessorTable<T> {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            entries: Vec::new(),
        }
    }

    pub fn field(
        mut self,
        name: &'static str,
        value_type: ValueType,
        get: fn(&T) -> Value,
        set: Setter<T>,
    ) -> Self {
        self.entries.push(Accessor {
            name,
            value_type,
            get,
            set,
        });
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn accessors(&self) -> &[Accessor<T>] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|a| a.name)
    }

    pub fn get(&self, target: &T, name: &str) -> Option<Value> {
        self.entries
            .iter()
            .find(|a| a.name == name)
            .map(|a| (a.get)(target))
    }

    pub fn set(&self, target: &mut T, name: &str, value: Value) -> Result<()> {
        let accessor = self
            .entries
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| ModelError::UnknownProperty {
                type_code: TypeCode::new(self.type_name),
                property: name.to_string(),
            })?;
        (accessor.set)(target, value).map_err(|rejected| ModelError::InvalidValue {
            type_code: TypeCode::new(self.type_name),
            property: name.to_string(),
            expected: accessor.value_type.to_string(),
            found: rejected.kind().to_string(),
        })
    }

    /// Descriptor listing every accessor as a field
    pub fn descriptor(&self) -> TypeDescriptor {
        self.entries.iter().fold(TypeDescriptor::new(self.type_name), |desc, a| {
            desc.field(PropertyDescriptor::new(a.name, a.value_type.clone()))
        })
    }
}

/// A plain record type that query results can be materialized into
///
/// Materialization first tries [`RowType::construct`] with the row's
/// column values in order; if that declines, it starts from
/// [`RowType::blank`] and assigns each aliased column through the
/// accessor table.
pub trait RowType: Sized {
    fn accessors() -> AccessorTable<Self>;

    /// Positional construction; `None` when the column kinds do not line up
    fn construct(values: &[Value]) -> Option<Self> {
        let _ = values;
        None
    }

    /// Default instance for by-name assignment
    fn blank() -> Option<Self> {
        None
    }
}
