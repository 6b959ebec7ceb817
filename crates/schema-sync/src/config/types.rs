//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogFilter, COMMON_SIZE_THRESHOLD, DEFAULT_SCHEMA};
use crate::sync::DiffOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Synchronization behavior.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Actual-schema loading.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// How a run treats the actual schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// The target database is new; every desired table is created.
    Create,

    /// Compare against the introspected schema and apply the difference.
    #[default]
    Update,

    /// Compare and report without applying anything.
    Check,
}

impl SyncMode {
    /// Whether work units are executed in this mode.
    pub fn applies_changes(&self) -> bool {
        !matches!(self, SyncMode::Check)
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Create => write!(f, "create"),
            SyncMode::Update => write!(f, "update"),
            SyncMode::Check => write!(f, "check"),
        }
    }
}

/// Synchronization behavior configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Run mode (default: update).
    #[serde(default)]
    pub mode: SyncMode,

    /// Secondary database to synchronize. `None` selects entities that target
    /// the default database.
    #[serde(default)]
    pub database: Option<String>,

    /// Explicit entity subset. Empty means a full (unscoped) run.
    #[serde(default)]
    pub entities: Vec<String>,

    /// Log every work unit at info level instead of debug (default: false).
    #[serde(default)]
    pub trace: bool,

    /// Drop indexes and foreign keys that exist only in the actual schema
    /// (default: false).
    #[serde(default)]
    pub drop_orphans: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            database: None,
            entities: Vec::new(),
            trace: false,
            drop_orphans: false,
        }
    }
}

impl SyncConfig {
    /// Whether the run is restricted to an explicit entity subset.
    pub fn is_scoped(&self) -> bool {
        !self.entities.is_empty()
    }

    pub fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            drop_orphans: self.drop_orphans,
        }
    }
}

/// Actual-schema loading configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Only load these tables (default: all).
    #[serde(default)]
    pub tables: Vec<String>,

    /// Only load tables in these database schemas (default: all).
    #[serde(default)]
    pub schemas: Vec<String>,

    /// Cumulative size threshold for common column classification
    /// (default: 2048).
    #[serde(default = "default_common_threshold")]
    pub common_threshold: i64,

    /// Database schema whose tables keep unqualified native names
    /// (default: dbo). Tables in other schemas are named `schema.table`.
    #[serde(default = "default_schema")]
    pub default_schema: Option<String>,
}

fn default_common_threshold() -> i64 {
    COMMON_SIZE_THRESHOLD
}

fn default_schema() -> Option<String> {
    Some(DEFAULT_SCHEMA.to_string())
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            schemas: Vec::new(),
            common_threshold: default_common_threshold(),
            default_schema: default_schema(),
        }
    }
}

impl CatalogConfig {
    /// Build the filter handed to a catalog reader.
    pub fn filter(&self) -> CatalogFilter {
        let filter = CatalogFilter::new()
            .with_tables(self.tables.iter().cloned())
            .with_schemas(self.schemas.iter().cloned());
        match &self.default_schema {
            Some(schema) => filter.with_default_schema(schema.as_str()),
            None => filter,
        }
    }
}
