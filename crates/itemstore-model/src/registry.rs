//! Runtime type registry

use crate::{
    type_code_of, ModelError, PropertyDefinition, Result, TypeCode, TypeDefinition, TypeDescriptor,
};
use std::collections::HashMap;

/// Registered type definitions keyed by canonical type code
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<TypeCode, TypeDefinition>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a set of descriptor tables
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = TypeDescriptor>) -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register_type(descriptor)?;
        }
        Ok(registry)
    }

    pub fn register_type(&mut self, descriptor: TypeDescriptor) -> Result<TypeCode> {
        self.register(TypeDefinition::from_descriptor(descriptor)?)
    }

    pub fn register(&mut self, definition: TypeDefinition) -> Result<TypeCode> {
        let code = definition.type_code().clone();
        if self.types.contains_key(&code) {
            return Err(ModelError::DuplicateType(code));
        }
        self.types.insert(code.clone(), definition);
        Ok(code)
    }

    pub fn resolve(&self, type_code: &str) -> Result<&TypeDefinition> {
        self.types
            .get(&TypeCode::new(type_code))
            .ok_or_else(|| ModelError::UnknownType(type_code.to_string()))
    }

    /// Resolve a type by its declared name rather than its code
    pub fn resolve_name(&self, name: &str) -> Result<&TypeDefinition> {
        self.types
            .values()
            .find(|def| def.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| ModelError::UnknownType(name.to_string()))
    }

    /// Resolve a type written in a query or on the command line: by type
    /// code, by the code derived from a qualified name, or by declared name
    pub fn lookup(&self, name: &str) -> Result<&TypeDefinition> {
        self.resolve(name)
            .or_else(|_| self.resolve(&type_code_of(name)))
            .or_else(|_| self.resolve_name(name))
    }

    pub fn contains(&self, type_code: &str) -> bool {
        self.types.contains_key(&TypeCode::new(type_code))
    }

    pub fn properties_of(&self, type_code: &str) -> Result<&[PropertyDefinition]> {
        Ok(self.resolve(type_code)?.properties())
    }

    pub fn property(&self, type_code: &str, name: &str) -> Result<&PropertyDefinition> {
        let def = self.resolve(type_code)?;
        def.property(name).ok_or_else(|| ModelError::UnknownProperty {
            type_code: def.type_code().clone(),
            property: name.to_string(),
        })
    }

    /// Properties individually flagged unique
    pub fn unique_properties_of(&self, type_code: &str) -> Result<Vec<&PropertyDefinition>> {
        Ok(self
            .resolve(type_code)?
            .properties()
            .iter()
            .filter(|p| p.flags.unique)
            .collect())
    }

    /// Every property-name set that must be jointly unique
    pub fn unique_sets_of(&self, type_code: &str) -> Result<&[Vec<String>]> {
        Ok(self.resolve(type_code)?.unique_sets())
    }

    pub fn relation_properties_of(&self, type_code: &str) -> Result<Vec<&PropertyDefinition>> {
        Ok(self.resolve(type_code)?.relation_properties().collect())
    }

    /// Registered type codes in sorted order
    pub fn type_codes(&self) -> Vec<TypeCode> {
        let mut codes: Vec<TypeCode> = self.types.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Registered definitions, sorted by type code
    pub fn definitions(&self) -> Vec<&TypeDefinition> {
        let mut defs: Vec<&TypeDefinition> = self.types.values().collect();
        defs.sort_by(|a, b| a.type_code().cmp(b.type_code()));
        defs
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PropertyDescriptor, ValueType};

    fn user() -> TypeDescriptor {
        TypeDescriptor::new("User")
            .field(PropertyDescriptor::new("email", ValueType::Text).unique())
            .field(PropertyDescriptor::new("name", ValueType::Text))
            .field(PropertyDescriptor::new("address", ValueType::item("address")))
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = TypeRegistry::from_descriptors([user()]).unwrap();
        assert!(registry.resolve("USER").is_ok());
        assert!(registry.resolve("user").is_ok());
        assert_eq!(registry.resolve_name("user").unwrap().type_code().as_str(), "user");
    }

    #[test]
    fn test_lookup_accepts_qualified_and_declared_names() {
        let mut registry = TypeRegistry::from_descriptors([user()]).unwrap();
        registry
            .register_type(TypeDescriptor::new("Invoice").code("inv"))
            .unwrap();
        assert_eq!(registry.lookup("com.example.User").unwrap().type_code().as_str(), "user");
        assert_eq!(registry.lookup("Invoice").unwrap().type_code().as_str(), "inv");
        assert!(registry.lookup("Ghost").is_err());
    }

    #[test]
    fn test_unknown_type() {
        let registry = TypeRegistry::new();
        assert!(matches!(registry.resolve("ghost"), Err(ModelError::UnknownType(_))));
    }

    #[test]
    fn test_duplicate_type_code_rejected() {
        let mut registry = TypeRegistry::new();
        registry.register_type(user()).unwrap();
        let clash = TypeDescriptor::new("Account").code("USER");
        assert!(matches!(
            registry.register_type(clash),
            Err(ModelError::DuplicateType(_))
        ));
    }

    #[test]
    fn test_registration_order_is_irrelevant() {
        let address = TypeDescriptor::new("Address")
            .field(PropertyDescriptor::new("city", ValueType::Text));
        let a = TypeRegistry::from_descriptors([user(), address.clone()]).unwrap();
        let b = TypeRegistry::from_descriptors([address, user()]).unwrap();
        assert_eq!(a.type_codes(), b.type_codes());
        assert_eq!(a.resolve("user").unwrap(), b.resolve("user").unwrap());
    }

    #[test]
    fn test_property_queries() {
        let registry = TypeRegistry::from_descriptors([user()]).unwrap();
        let names: Vec<_> = registry
            .properties_of("user")
            .unwrap()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["email", "name", "address"]);

        let unique: Vec<_> = registry
            .unique_properties_of("user")
            .unwrap()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(unique, vec!["email"]);

        let relations = registry.relation_properties_of("user").unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].name, "address");

        assert!(matches!(
            registry.property("user", "ghost"),
            Err(ModelError::UnknownProperty { .. })
        ));
    }
}
