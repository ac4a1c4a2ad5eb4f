//! Type codes and primary keys

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Case-insensitive type identifier, stored in canonical lower-case form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TypeCode(String);

impl TypeCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for TypeCode {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TypeCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl From<String> for TypeCode {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<&TypeCode> for TypeCode {
    fn from(code: &TypeCode) -> Self {
        code.clone()
    }
}

impl From<TypeCode> for String {
    fn from(code: TypeCode) -> Self {
        code.0
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Primary key: a numeric id scoped to a type code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pk {
    pub id: u64,
    pub type_code: TypeCode,
}

impl Pk {
    pub fn new(id: u64, type_code: impl Into<TypeCode>) -> Self {
        Self {
            id,
            type_code: type_code.into(),
        }
    }
}

impl fmt::Display for Pk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_code, self.id)
    }
}
