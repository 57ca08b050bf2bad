//! Runtime options and the TOML configuration file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lookup::LookupMetrics;
use crate::types::{CHUNK_SIZE, NEVERLAND};

/// Default number of rows written by one multi-row statement.
pub const DEFAULT_WRITE_BATCH_ROWS: usize = 500;

/// SQLite `synchronous` pragma.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Synchronous {
    /// Fsync on every commit.
    #[default]
    Full,
    /// Fsync at checkpoints only.
    Normal,
    /// Leave syncing to the OS.
    Off,
}

impl Synchronous {
    pub(crate) fn pragma_value(self) -> &'static str {
        match self {
            Synchronous::Full => "FULL",
            Synchronous::Normal => "NORMAL",
            Synchronous::Off => "OFF",
        }
    }
}

/// Options supplied when opening a [`crate::store::Store`].
#[derive(Clone)]
pub struct LedgerOptions {
    /// Ids resolved per chunk query.
    pub chunk_size: usize,
    /// Padding id for short chunks.
    pub sentinel_id: Arc<str>,
    /// Rows per multi-row insert statement.
    pub write_batch_rows: usize,
    /// Durability mode for file-backed stores.
    pub synchronous: Synchronous,
    /// Optional lookup metrics sink.
    pub metrics: Option<Arc<dyn LookupMetrics>>,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            sentinel_id: Arc::from(NEVERLAND),
            write_batch_rows: DEFAULT_WRITE_BATCH_ROWS,
            synchronous: Synchronous::Full,
            metrics: None,
        }
    }
}

impl fmt::Debug for LedgerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerOptions")
            .field("chunk_size", &self.chunk_size)
            .field("sentinel_id", &self.sentinel_id)
            .field("write_batch_rows", &self.write_batch_rows)
            .field("synchronous", &self.synchronous)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

impl LedgerOptions {
    /// Sets the chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the padding sentinel.
    pub fn sentinel_id(mut self, sentinel: impl Into<Arc<str>>) -> Self {
        self.sentinel_id = sentinel.into();
        self
    }

    /// Sets the rows written per statement.
    pub fn write_batch_rows(mut self, rows: usize) -> Self {
        self.write_batch_rows = rows;
        self
    }

    /// Sets the synchronous mode.
    pub fn synchronous(mut self, mode: Synchronous) -> Self {
        self.synchronous = mode;
        self
    }

    /// Installs a metrics sink.
    pub fn metrics(mut self, metrics: Arc<dyn LookupMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Rejects option combinations the lookup layer cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.sentinel_id.is_empty() {
            return Err(ConfigError::Invalid("sentinel_id must not be empty".into()));
        }
        if self.write_batch_rows == 0 {
            return Err(ConfigError::Invalid(
                "write_batch_rows must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// `[store]` section.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StoreSection {
    /// Default database path.
    pub database: Option<PathBuf>,
    /// Overrides [`LedgerOptions::chunk_size`].
    pub chunk_size: Option<usize>,
    /// Overrides [`LedgerOptions::sentinel_id`].
    pub sentinel_id: Option<String>,
    /// Overrides [`LedgerOptions::write_batch_rows`].
    pub write_batch_rows: Option<usize>,
    /// Overrides [`LedgerOptions::synchronous`].
    pub synchronous: Option<Synchronous>,
}

/// `[[entity]]` entry.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EntityConfig {
    /// Type name.
    pub name: String,
    /// Note label; defaults to the name.
    pub label: Option<String>,
}

/// Relation shape as spelled in configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKindConfig {
    /// See [`crate::schema::RelationKind::Link`].
    Link,
    /// See [`crate::schema::RelationKind::SelfLink`].
    SelfLink,
    /// See [`crate::schema::RelationKind::Child`].
    Child,
}

/// `[[relation]]` entry.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RelationConfig {
    /// Relation name.
    pub name: String,
    /// Note label; defaults to the name.
    pub label: Option<String>,
    /// Shape.
    pub kind: RelationKindConfig,
    /// Owner type name.
    pub owner: String,
    /// Other type name, links only.
    pub other: Option<String>,
    /// Self-links only: undirected when `true`.
    #[serde(default)]
    pub symmetric: bool,
}

/// Entity and relation declarations.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SchemaConfig {
    /// Entity types.
    #[serde(default, rename = "entity")]
    pub entities: Vec<EntityConfig>,
    /// Relations.
    #[serde(default, rename = "relation")]
    pub relations: Vec<RelationConfig>,
}

/// Whole configuration file.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Store tuning.
    #[serde(default)]
    pub store: StoreSection,
    /// Schema declarations.
    #[serde(flatten)]
    pub schema: SchemaConfig,
}

impl LedgerConfig {
    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `explicit`, else the default path if it exists, else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Options with every `[store]` override applied.
    pub fn options(&self) -> Result<LedgerOptions, ConfigError> {
        let mut options = LedgerOptions::default();
        if let Some(size) = self.store.chunk_size {
            options = options.chunk_size(size);
        }
        if let Some(sentinel) = self.store.sentinel_id.as_deref() {
            options = options.sentinel_id(sentinel);
        }
        if let Some(rows) = self.store.write_batch_rows {
            options = options.write_batch_rows(rows);
        }
        if let Some(sync) = self.store.synchronous {
            options = options.synchronous(sync);
        }
        options.validate()?;
        Ok(options)
    }

    /// Writes the configuration back as TOML.
    pub fn persist(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized =
            toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })?;
        fs::write(path, serialized).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// File is not valid TOML for [`LedgerConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// Serialization failed.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// Underlying error.
        source: toml::ser::Error,
    },
    /// File could not be written.
    #[error("failed to write config {path}: {source}")]
    Write {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// `<config dir>/itergraph/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("itergraph").join("config.toml"))
}
