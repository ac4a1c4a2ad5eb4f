//! Engine configuration loaded from TOML

use crate::{PersistenceError, Result};
use itemstore_storage::{InMemoryStorage, RedbStorage, SqliteStorage, StorageProvider};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redb,
    Sqlite,
}

fn default_batch_size() -> usize {
    100
}

fn yes() -> bool {
    true
}

fn default_slow_operation_ms() -> u64 {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Database path; ignored by the memory backend
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            location: None,
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Drop and recreate storage structures at startup
    #[serde(default)]
    pub initialize: bool,
    #[serde(default = "yes")]
    pub update: bool,
    #[serde(default = "yes")]
    pub validate: bool,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            initialize: false,
            update: true,
            validate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_slow_operation_ms")]
    pub slow_operation_ms: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            slow_operation_ms: default_slow_operation_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Resolved values the engine reads at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub batch_size: usize,
    pub slow_operation: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        PersistenceConfig::default().settings()
    }
}

impl PersistenceConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn with_backend(backend: BackendKind, location: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.storage.backend = backend;
        config.storage.location = Some(location.into().to_string_lossy().into_owned());
        config
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PersistenceError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| PersistenceError::Config(e.to_string()))
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            batch_size: self.storage.batch_size.max(1),
            slow_operation: Duration::from_millis(self.logging.slow_operation_ms),
        }
    }

    /// Open the configured backend
    pub fn open_backend(&self) -> Result<Box<dyn StorageProvider>> {
        let location = || {
            self.storage.location.as_deref().ok_or_else(|| {
                PersistenceError::Config(format!(
                    "storage.location is required for the {:?} backend",
                    self.storage.backend
                ))
            })
        };
        let provider: Box<dyn StorageProvider> = match self.storage.backend {
            BackendKind::Memory => Box::new(InMemoryStorage::new()),
            BackendKind::Redb => {
                Box::new(RedbStorage::new(location()?).map_err(PersistenceError::Storage)?)
            }
            BackendKind::Sqlite => Box::new(
                SqliteStorage::open(location()?)
                    .map_err(PersistenceError::Storage)?
                    .with_batch_size(self.settings().batch_size),
            ),
        };
        Ok(provider)
    }
}
