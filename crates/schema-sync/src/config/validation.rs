//! Configuration validation.

use super::Config;
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Sync validation
    if let Some(database) = &config.sync.database {
        if database.trim().is_empty() {
            return Err(SyncError::Config(
                "sync.database must not be empty when set".into(),
            ));
        }
    }
    if config.sync.entities.iter().any(|e| e.trim().is_empty()) {
        return Err(SyncError::Config(
            "sync.entities must not contain empty names".into(),
        ));
    }

    // Catalog validation
    if config.catalog.common_threshold <= 0 {
        return Err(SyncError::Config(
            "catalog.common_threshold must be at least 1".into(),
        ));
    }
    if config.catalog.tables.iter().any(|t| t.trim().is_empty()) {
        return Err(SyncError::Config(
            "catalog.tables must not contain empty names".into(),
        ));
    }
    if config.catalog.schemas.iter().any(|s| s.trim().is_empty()) {
        return Err(SyncError::Config(
            "catalog.schemas must not contain empty names".into(),
        ));
    }
    if let Some(schema) = &config.catalog.default_schema {
        if schema.trim().is_empty() {
            return Err(SyncError::Config(
                "catalog.default_schema must not be empty when set".into(),
            ));
        }
    }

    Ok(())
}
