//! Error types for model and schema operations

use crate::{Pk, TypeCode};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Type already registered: {0}")]
    DuplicateType(TypeCode),

    #[error("Duplicate property '{property}' on type {type_code}")]
    DuplicateProperty { type_code: TypeCode, property: String },

    #[error("Unknown property '{property}' on type {type_code}")]
    UnknownProperty { type_code: TypeCode, property: String },

    #[error("Property name '{0}' is reserved")]
    ReservedProperty(String),

    #[error("Invalid value for {type_code}.{property}: expected {expected}, found {found}")]
    InvalidValue {
        type_code: TypeCode,
        property: String,
        expected: String,
        found: String,
    },

    #[error("Item {0} is a proxy and must be loaded first")]
    ProxyNotLoaded(Pk),

    #[error("Item {0} has been removed")]
    Removed(Pk),

    #[error("Primary key of {0} cannot change once persisted")]
    PkImmutable(Pk),

    #[error("Item of type {0} has no primary key")]
    MissingPk(TypeCode),
}
