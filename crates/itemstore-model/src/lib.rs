//! Itemstore Model - Items, identities and the runtime type registry
//!
//! Items are dynamically-typed records whose legal property names, value
//! types and uniqueness rules come from a [`TypeRegistry`] built once at
//! startup from [`TypeDescriptor`] tables.
//!
//! - [`Item`] is either a full record or a proxy carrying only its [`Pk`]
//! - [`ItemRef`] is the shared handle used inside object graphs
//! - [`AccessorTable`] maps property names onto typed Rust structs

mod accessor;
mod error;
mod item;
mod pk;
mod registry;
mod schema;
mod value;

pub use accessor::{Accessor, AccessorTable, RowType, Setter};
pub use error::{ModelError, Result};
pub use item::{Item, ItemBody, ItemSnapshot, Lifecycle};
pub use pk::{Pk, TypeCode};
pub use registry::TypeRegistry;
pub use schema::{
    normalize_accessor_name, type_code_of, PropertyDefinition, PropertyDescriptor, PropertyFlags,
    RelationDefinition, RelationKind, TypeDefinition, TypeDescriptor, ValueType,
    RESERVED_PROPERTIES,
};
pub use value::{ItemRef, Value};
