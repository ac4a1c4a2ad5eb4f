//! Database schema definitions

use itemstore_model::TypeDefinition;

/// SQL to create the items table; record bodies are JSON objects
pub const CREATE_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    type_code TEXT NOT NULL,
    id INTEGER NOT NULL,
    version INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (type_code, id)
)
"#;

/// SQL to create the link table: one row per item reference, so relation
/// properties can be joined
pub const CREATE_LINKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS item_links (
    owner_type TEXT NOT NULL,
    owner_id INTEGER NOT NULL,
    property TEXT NOT NULL,
    position INTEGER NOT NULL,
    target_type TEXT NOT NULL,
    target_id INTEGER NOT NULL,
    PRIMARY KEY (owner_type, owner_id, property, position)
)
"#;

/// SQL to create the per-type id high-water marks
pub const CREATE_SEQUENCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sequences (
    type_code TEXT PRIMARY KEY,
    last_id INTEGER NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_items_created ON items(type_code, created_at, id)",
    "CREATE INDEX IF NOT EXISTS idx_links_target ON item_links(target_type, target_id)",
];

pub const TABLES: &[&str] = &["items", "item_links", "sequences"];

pub const DROP_TABLES: &[&str] = &[
    "DROP TABLE IF EXISTS item_links",
    "DROP TABLE IF EXISTS items",
    "DROP TABLE IF EXISTS sequences",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_ITEMS_TABLE, CREATE_LINKS_TABLE, CREATE_SEQUENCES_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}

/// Quote a value as an SQL string literal
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// JSON path of a property inside a record body
pub fn json_path(property: &str) -> String {
    format!("$.\"{}\"", property.replace('"', ""))
}

/// Name of the unique index covering one unique-property set
pub fn unique_index_name(type_code: &str, properties: &[String]) -> String {
    let raw = format!("uq_{}_{}", type_code, properties.join("_"));
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Partial unique expression indexes enforcing a type's unique sets
pub fn unique_index_statements(def: &TypeDefinition) -> Vec<(String, String)> {
    def.unique_sets()
        .iter()
        .map(|set| {
            let name = unique_index_name(def.type_code(), set);
            let columns: Vec<String> = set
                .iter()
                .map(|p| format!("json_extract(data, {})", quote(&json_path(p))))
                .collect();
            let sql = format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON items({}) WHERE type_code = {}",
                name,
                columns.join(", "),
                quote(def.type_code())
            );
            (name, sql)
        })
        .collect()
}
