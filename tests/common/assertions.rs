use itemstore::engine::{PersistenceError, PersistenceService, QueryRequest};
use itemstore::model::ItemRef;

/// Assert an operation failed because the item does not exist
pub fn assert_not_found<T: std::fmt::Debug>(result: Result<T, PersistenceError>) {
    match result {
        Err(e) if e.is_not_found() => {}
        other => panic!("Expected ModelNotFound, got {:?}", other),
    }
}

/// Assert an operation failed a uniqueness check
pub fn assert_not_unique<T: std::fmt::Debug>(result: Result<T, PersistenceError>) {
    assert!(
        matches!(result, Err(PersistenceError::ModelNotUnique(_))),
        "Expected ModelNotUnique, got {:?}",
        result
    );
}

/// Ids returned by a statement, in result order
pub fn ids_of(service: &PersistenceService, statement: &str) -> Vec<u64> {
    service
        .query::<ItemRef>(&QueryRequest::statement(statement))
        .expect("query runs")
        .results
        .iter()
        .map(|item| item.pk().expect("stored items have a pk").id)
        .collect()
}

/// Text value of a property, panicking when absent
pub fn text_of(item: &ItemRef, property: &str) -> String {
    item.get(property)
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| panic!("Expected text in '{}'", property))
}
