//! Configuration validation.

use super::Config;
use crate::core::identifier::{is_plain_word, validate_identifier};
use crate::error::{Result, SyncError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let target = &config.target;
    if target.host.is_empty() {
        return Err(SyncError::Config("target.host is required".into()));
    }
    if target.database.is_empty() {
        return Err(SyncError::Config("target.database is required".into()));
    }
    if target.user.is_empty() {
        return Err(SyncError::Config("target.user is required".into()));
    }
    if target.r#type != "mysql" {
        return Err(SyncError::Config(format!(
            "target.type must be 'mysql', got '{}'",
            target.r#type
        )));
    }
    if target.port == 0 {
        return Err(SyncError::Config("target.port must be non-zero".into()));
    }
    if target.max_connections == 0 {
        return Err(SyncError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }
    if !target.table_prefix.is_empty() && !is_plain_word(&target.table_prefix) {
        return Err(SyncError::Config(format!(
            "target.table_prefix must contain only letters, digits and '_', got '{}'",
            target.table_prefix
        )));
    }

    let sync = &config.sync;
    for (name, column) in [
        ("store", &sync.axis_columns.store),
        ("language", &sync.axis_columns.language),
        ("group", &sync.axis_columns.group),
    ] {
        if !is_plain_word(column) {
            return Err(SyncError::Config(format!(
                "sync.axis_columns.{} is not a valid column name: '{}'",
                name, column
            )));
        }
    }

    for (name, ids) in [
        ("store_ids", &sync.store_ids),
        ("language_ids", &sync.language_ids),
        ("group_ids", &sync.group_ids),
    ] {
        if let Some(bad) = ids.iter().find(|id| **id <= 0) {
            return Err(SyncError::Config(format!(
                "sync.{} must contain positive ids, got {}",
                name, bad
            )));
        }
    }

    validate_identifier(&sync.primary_entity)?;
    validate_identifier(&sync.language_table)?;
    for entity in sync.variant_tables.all() {
        validate_identifier(entity)?;
    }

    Ok(())
}
