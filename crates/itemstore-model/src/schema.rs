//! Type descriptors and the resolved schema built from them

use crate::{ModelError, Result, TypeCode, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Property names the engine maps onto record bookkeeping
pub const RESERVED_PROPERTIES: &[&str] = &["pk", "id", "createdAt", "modifiedAt", "version"];

/// Semantic value type of a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
    /// Reference to an item of the given type
    Item(TypeCode),
    List(Box<ValueType>),
    Map(Box<ValueType>),
    Any,
}

impl ValueType {
    pub fn item(type_code: impl Into<TypeCode>) -> Self {
        ValueType::Item(type_code.into())
    }

    pub fn list(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    pub fn map(element: ValueType) -> Self {
        ValueType::Map(Box::new(element))
    }

    /// Whether `value` may be stored in a property of this type
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (ValueType::Any, _) => true,
            (ValueType::Bool, Value::Bool(_)) => true,
            (ValueType::Int, Value::Int(_)) => true,
            (ValueType::Float, Value::Float(_) | Value::Int(_)) => true,
            (ValueType::Text, Value::Text(_)) => true,
            (ValueType::Timestamp, Value::Timestamp(_)) => true,
            (ValueType::Item(code), Value::Item(item)) => item.type_code() == *code,
            (ValueType::List(element), Value::List(values)) => {
                values.iter().all(|v| element.accepts(v))
            }
            (ValueType::Map(element), Value::Map(values)) => {
                values.values().all(|v| element.accepts(v))
            }
            _ => false,
        }
    }

    /// Item references reachable through this type, directly or via a list
    pub fn references_items(&self) -> bool {
        match self {
            ValueType::Item(_) => true,
            ValueType::List(element) => element.references_items(),
            _ => false,
        }
    }

    /// Empty value for collection types, used when creating items
    pub fn empty_collection(&self) -> Option<Value> {
        match self {
            ValueType::List(_) => Some(Value::List(Vec::new())),
            ValueType::Map(_) => Some(Value::Map(Default::default())),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "int"),
            ValueType::Float => write!(f, "float"),
            ValueType::Text => write!(f, "text"),
            ValueType::Timestamp => write!(f, "timestamp"),
            ValueType::Item(code) => write!(f, "item<{}>", code),
            ValueType::List(element) => write!(f, "list<{}>", element),
            ValueType::Map(element) => write!(f, "map<{}>", element),
            ValueType::Any => write!(f, "any"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub kind: RelationKind,
    pub referenced_type: TypeCode,
    /// Property on the referenced type that maps this relation back
    #[serde(default)]
    pub mapped_by: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFlags {
    pub readable: bool,
    pub writable: bool,
    /// Set-once: may not change after the first save
    pub initial: bool,
    pub unique: bool,
}

impl Default for PropertyFlags {
    fn default() -> Self {
        Self {
            readable: true,
            writable: true,
            initial: false,
            unique: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    pub value_type: ValueType,
    pub flags: PropertyFlags,
    pub relation: Option<RelationDefinition>,
}

impl PropertyDefinition {
    /// Whether eager fetching this property loads related items
    pub fn is_relation(&self) -> bool {
        self.relation.is_some() || self.value_type.references_items()
    }
}

fn yes() -> bool {
    true
}

/// A property as declared in a type descriptor table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub value_type: ValueType,
    #[serde(default = "yes")]
    pub readable: bool,
    #[serde(default = "yes")]
    pub writable: bool,
    #[serde(default)]
    pub initial: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub relation: Option<RelationDefinition>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            readable: true,
            writable: true,
            initial: false,
            unique: false,
            relation: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn initial(mut self) -> Self {
        self.initial = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }

    pub fn relation(
        mut self,
        kind: RelationKind,
        referenced_type: impl Into<TypeCode>,
        mapped_by: Option<&str>,
    ) -> Self {
        self.relation = Some(RelationDefinition {
            kind,
            referenced_type: referenced_type.into(),
            mapped_by: mapped_by.map(str::to_string),
        });
        self
    }

    fn into_definition(self, name: String) -> PropertyDefinition {
        PropertyDefinition {
            name,
            value_type: self.value_type,
            flags: PropertyFlags {
                readable: self.readable,
                writable: self.writable,
                initial: self.initial,
                unique: self.unique,
            },
            relation: self.relation,
        }
    }
}

/// Static description of a type: declared fields, accessor-derived
/// properties and jointly unique property sets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    /// Explicit type code; defaults to the lower-cased simple name
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub fields: Vec<PropertyDescriptor>,
    /// Accessor-style entries such as `getEmail` or `isActive`
    #[serde(default)]
    pub accessors: Vec<PropertyDescriptor>,
    #[serde(default)]
    pub unique_together: Vec<Vec<String>>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: None,
            fields: Vec::new(),
            accessors: Vec::new(),
            unique_together: Vec::new(),
        }
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn field(mut self, property: PropertyDescriptor) -> Self {
        self.fields.push(property);
        self
    }

    pub fn accessor(mut self, property: PropertyDescriptor) -> Self {
        self.accessors.push(property);
        self
    }

    pub fn unique_together<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_together
            .push(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Resolved type: the merged, ordered property list and unique sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    type_code: TypeCode,
    name: String,
    properties: Vec<PropertyDefinition>,
    unique_sets: Vec<Vec<String>>,
}

impl TypeDefinition {
    pub fn from_descriptor(descriptor: TypeDescriptor) -> Result<Self> {
        let type_code = match &descriptor.code {
            Some(code) => TypeCode::new(code),
            None => type_code_of(&descriptor.name),
        };

        let mut properties: Vec<PropertyDefinition> = Vec::new();
        for field in descriptor.fields {
            let name = field.name.clone();
            check_name(&type_code, &name)?;
            if properties.iter().any(|p| p.name == name) {
                return Err(ModelError::DuplicateProperty {
                    type_code,
                    property: name,
                });
            }
            properties.push(field.into_definition(name));
        }

        let mut from_accessors: Vec<String> = Vec::new();
        for accessor in descriptor.accessors {
            let name = normalize_accessor_name(&accessor.name);
            check_name(&type_code, &name)?;
            if from_accessors.contains(&name) {
                return Err(ModelError::DuplicateProperty {
                    type_code,
                    property: name,
                });
            }
            from_accessors.push(name.clone());
            let definition = accessor.into_definition(name.clone());
            match properties.iter_mut().find(|p| p.name == name) {
                Some(existing) => *existing = definition,
                None => properties.push(definition),
            }
        }

        let mut unique_sets: Vec<Vec<String>> = Vec::new();
        for set in descriptor.unique_together {
            for name in &set {
                if !properties.iter().any(|p| &p.name == name) {
                    return Err(ModelError::UnknownProperty {
                        type_code,
                        property: name.clone(),
                    });
                }
            }
            if !set.is_empty() && !unique_sets.contains(&set) {
                unique_sets.push(set);
            }
        }
        for property in properties.iter().filter(|p| p.flags.unique) {
            let singleton = vec![property.name.clone()];
            if !unique_sets.contains(&singleton) {
                unique_sets.push(singleton);
            }
        }

        Ok(Self {
            type_code,
            name: descriptor.name,
            properties,
            unique_sets,
        })
    }

    pub fn type_code(&self) -> &TypeCode {
        &self.type_code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyDefinition] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn unique_sets(&self) -> &[Vec<String>] {
        &self.unique_sets
    }

    pub fn relation_properties(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.properties.iter().filter(|p| p.is_relation())
    }
}

fn check_name(type_code: &TypeCode, name: &str) -> Result<()> {
    if RESERVED_PROPERTIES.contains(&name) {
        return Err(ModelError::ReservedProperty(format!("{}.{}", type_code, name)));
    }
    Ok(())
}

/// Type code for a type name: its simple name, lower-cased
pub fn type_code_of(name: &str) -> TypeCode {
    let simple = name
        .rsplit(|c: char| c == '.' || c == ':')
        .next()
        .unwrap_or(name);
    TypeCode::new(simple)
}

/// Property name for an accessor-style name
///
/// `getEmail` → `email`, `isActive` → `active`. The prefix is only
/// stripped in front of an upper-case letter, so `issuer` stays as is.
/// A leading acronym keeps its case: `getURL` → `URL`.
pub fn normalize_accessor_name(name: &str) -> String {
    for prefix in ["get", "is"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            if rest.chars().next().is_some_and(char::is_uppercase) {
                return decapitalize(rest);
            }
        }
    }
    name.to_string()
}

fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase() => {
            name.to_string()
        }
        (Some(first), _) => {
            let mut out: String = first.to_lowercase().collect();
            out.push_str(&name[first.len_utf8()..]);
            out
        }
        (None, _) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessor_names_are_normalized() {
        assert_eq!(normalize_accessor_name("getEmail"), "email");
        assert_eq!(normalize_accessor_name("isActive"), "active");
        assert_eq!(normalize_accessor_name("issuer"), "issuer");
        assert_eq!(normalize_accessor_name("getURL"), "URL");
        assert_eq!(normalize_accessor_name("name"), "name");
    }

    #[test]
    fn test_type_code_defaults_to_simple_name() {
        assert_eq!(type_code_of("shop.model.Customer").as_str(), "customer");
        assert_eq!(type_code_of("model::Order").as_str(), "order");
        let def = TypeDefinition::from_descriptor(TypeDescriptor::new("Order").code("PurchaseOrder"))
            .unwrap();
        assert_eq!(def.type_code().as_str(), "purchaseorder");
    }

    #[test]
    fn test_accessor_overrides_field_in_place() {
        let def = TypeDefinition::from_descriptor(
            TypeDescriptor::new("User")
                .field(PropertyDescriptor::new("email", ValueType::Text))
                .field(PropertyDescriptor::new("age", ValueType::Int))
                .accessor(PropertyDescriptor::new("getEmail", ValueType::Text).unique())
                .accessor(PropertyDescriptor::new("isActive", ValueType::Bool)),
        )
        .unwrap();

        let names: Vec<_> = def.properties().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["email", "age", "active"]);
        assert!(def.property("email").unwrap().flags.unique);
        assert_eq!(def.unique_sets(), &[vec!["email".to_string()]]);
    }

    #[test]
    fn test_duplicate_and_reserved_names_rejected() {
        let dup = TypeDescriptor::new("User")
            .field(PropertyDescriptor::new("name", ValueType::Text))
            .field(PropertyDescriptor::new("name", ValueType::Text));
        assert!(matches!(
            TypeDefinition::from_descriptor(dup),
            Err(ModelError::DuplicateProperty { .. })
        ));

        let reserved = TypeDescriptor::new("User").field(PropertyDescriptor::new("pk", ValueType::Int));
        assert!(matches!(
            TypeDefinition::from_descriptor(reserved),
            Err(ModelError::ReservedProperty(_))
        ));
    }

    #[test]
    fn test_unique_together_must_name_known_properties() {
        let desc = TypeDescriptor::new("Person")
            .field(PropertyDescriptor::new("first", ValueType::Text))
            .unique_together(["first", "last"]);
        assert!(matches!(
            TypeDefinition::from_descriptor(desc),
            Err(ModelError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_value_type_acceptance() {
        assert!(ValueType::Float.accepts(&Value::Int(2)));
        assert!(!ValueType::Int.accepts(&Value::Text("2".into())));
        assert!(ValueType::list(ValueType::Text).accepts(&Value::List(vec!["a".into()])));
        assert!(ValueType::Text.accepts(&Value::Null));
        assert!(ValueType::list(ValueType::item("tag")).references_items());
    }

    #[test]
    fn test_descriptor_from_toml() {
        let desc: TypeDescriptor = toml::from_str(
            r#"
            name = "Order"

            [[fields]]
            name = "number"
            value_type = "text"
            unique = true

            [[fields]]
            name = "lines"
            value_type = { list = { item = "orderline" } }
            relation = { kind = "one_to_many", referenced_type = "OrderLine", mapped_by = "order" }
            "#,
        )
        .unwrap();
        let def = TypeDefinition::from_descriptor(desc).unwrap();
        let lines = def.property("lines").unwrap();
        assert!(lines.is_relation());
        assert_eq!(
            lines.relation.as_ref().unwrap().referenced_type.as_str(),
            "orderline"
        );
    }
}
