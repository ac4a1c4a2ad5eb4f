#![allow(dead_code)]

use itemstore_engine::{BackendKind, PersistenceConfig, PersistenceService};
use itemstore_model::{
    ItemRef, PropertyDescriptor, RelationKind, TypeDescriptor, TypeRegistry, Value, ValueType,
};
use std::path::Path;

/// A small shop schema exercising every kind of property
pub fn shop_registry() -> TypeRegistry {
    TypeRegistry::from_descriptors([
        TypeDescriptor::new("User")
            .field(PropertyDescriptor::new("email", ValueType::Text).unique())
            .field(PropertyDescriptor::new("name", ValueType::Text))
            .field(PropertyDescriptor::new("age", ValueType::Int))
            .field(PropertyDescriptor::new("joined", ValueType::Timestamp))
            .field(PropertyDescriptor::new("tags", ValueType::list(ValueType::Text)))
            .field(PropertyDescriptor::new("settings", ValueType::map(ValueType::Any)))
            .field(PropertyDescriptor::new("address", ValueType::item("address")))
            .field(PropertyDescriptor::new("friend", ValueType::item("user")))
            .field(PropertyDescriptor::new("password", ValueType::Text).write_only())
            .accessor(PropertyDescriptor::new("getDisplayName", ValueType::Text).read_only()),
        TypeDescriptor::new("Address")
            .field(PropertyDescriptor::new("city", ValueType::Text))
            .field(PropertyDescriptor::new("street", ValueType::Text)),
        TypeDescriptor::new("Purchase")
            .field(PropertyDescriptor::new("number", ValueType::Text).unique().initial())
            .field(PropertyDescriptor::new("total", ValueType::Float))
            .field(
                PropertyDescriptor::new("customer", ValueType::item("user")).relation(
                    RelationKind::ManyToOne,
                    "user",
                    None,
                ),
            )
            .field(
                PropertyDescriptor::new("lines", ValueType::list(ValueType::item("orderline")))
                    .relation(RelationKind::OneToMany, "orderline", Some("purchase")),
            ),
        TypeDescriptor::new("OrderLine")
            .field(PropertyDescriptor::new("product", ValueType::Text))
            .field(PropertyDescriptor::new("quantity", ValueType::Int)),
        TypeDescriptor::new("Person")
            .field(PropertyDescriptor::new("first", ValueType::Text))
            .field(PropertyDescriptor::new("last", ValueType::Text))
            .unique_together(["first", "last"]),
    ])
    .expect("shop registry is valid")
}

pub fn memory_service() -> PersistenceService {
    PersistenceService::in_memory(shop_registry()).expect("memory service opens")
}

pub fn service_on(backend: BackendKind, dir: &Path) -> PersistenceService {
    let location = match backend {
        BackendKind::Sqlite => dir.join("items.db"),
        _ => dir.join("items.redb"),
    };
    let config = PersistenceConfig::with_backend(backend, location);
    PersistenceService::open(&config, shop_registry()).expect("service opens")
}

pub fn user(service: &PersistenceService, email: &str, name: &str, age: i64) -> ItemRef {
    let user = service.create("user").unwrap();
    user.set("email", email).unwrap();
    user.set("name", name).unwrap();
    user.set("age", age).unwrap();
    user
}

pub fn text(item: &ItemRef, property: &str) -> Option<String> {
    item.get(property).and_then(|v| v.as_str().map(str::to_string))
}

pub fn int(item: &ItemRef, property: &str) -> Option<i64> {
    item.get(property).and_then(|v| v.as_int())
}

pub fn related(item: &ItemRef, property: &str) -> ItemRef {
    match item.get(property) {
        Some(Value::Item(related)) => related,
        other => panic!("{} is not an item: {:?}", property, other),
    }
}
