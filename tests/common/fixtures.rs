use itemstore::engine::{BackendKind, PersistenceConfig, PersistenceService};
use itemstore::model::{ItemRef, TypeDescriptor, TypeRegistry};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[derive(Deserialize)]
struct SchemaFile {
    types: Vec<TypeDescriptor>,
}

/// Load a test fixture from tests/fixtures/
pub fn load_fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// The library schema declared in tests/fixtures/library.toml
pub fn library_registry() -> TypeRegistry {
    let file: SchemaFile = toml::from_str(&load_fixture("library.toml")).expect("library schema parses");
    TypeRegistry::from_descriptors(file.types).expect("library schema is valid")
}

/// A service on the given backend; the directory keeps on-disk backends alive
pub struct Harness {
    pub backend: BackendKind,
    pub service: PersistenceService,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(backend: BackendKind) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let service = open(backend, dir.path());
        Self {
            backend,
            service,
            dir,
        }
    }

    /// Drop the service and open the same storage again
    pub fn reopen(self) -> Self {
        let Harness { backend, service, dir } = self;
        drop(service);
        let service = open(backend, dir.path());
        Self {
            backend,
            service,
            dir,
        }
    }
}

fn open(backend: BackendKind, dir: &Path) -> PersistenceService {
    let config = match backend {
        BackendKind::Memory => PersistenceConfig::memory(),
        BackendKind::Redb => PersistenceConfig::with_backend(backend, dir.join("library.redb")),
        BackendKind::Sqlite => PersistenceConfig::with_backend(backend, dir.join("library.db")),
    };
    PersistenceService::open(&config, library_registry()).expect("service opens")
}

/// One harness per backend
pub fn all_backends() -> Vec<Harness> {
    [BackendKind::Memory, BackendKind::Redb, BackendKind::Sqlite]
        .into_iter()
        .map(Harness::new)
        .collect()
}

/// Backends whose data survives reopening
pub fn persistent_backends() -> Vec<Harness> {
    [BackendKind::Redb, BackendKind::Sqlite]
        .into_iter()
        .map(Harness::new)
        .collect()
}

pub fn author(service: &PersistenceService, name: &str, born: i64) -> ItemRef {
    let author = service.create("author").unwrap();
    author.set("name", name).unwrap();
    author.set("born", born).unwrap();
    author
}

pub fn book(service: &PersistenceService, isbn: &str, title: &str, year: i64, by: &ItemRef) -> ItemRef {
    let book = service.create("book").unwrap();
    book.set("isbn", isbn).unwrap();
    book.set("title", title).unwrap();
    book.set("year", year).unwrap();
    book.set("author", by).unwrap();
    book
}
