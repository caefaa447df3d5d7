//! Configuration validation.

use super::Config;
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let db = &config.database;
    if db.host.is_empty() {
        return Err(MigrateError::Config("database.host is required".into()));
    }
    if db.database.is_empty() {
        return Err(MigrateError::Config("database.database is required".into()));
    }
    if db.user.is_empty() {
        return Err(MigrateError::Config("database.user is required".into()));
    }
    if db.schema.is_empty() {
        return Err(MigrateError::Config("database.schema must not be empty".into()));
    }
    if db.port == 0 {
        return Err(MigrateError::Config("database.port must be non-zero".into()));
    }
    if !matches!(db.r#type.to_lowercase().as_str(), "postgres" | "postgresql" | "pg") {
        return Err(MigrateError::Config(format!(
            "database.type must be 'postgres', got '{}'",
            db.r#type
        )));
    }
    SslMode::parse(&db.ssl_mode)?;

    let migration = &config.migration;
    if migration.lock_key.is_empty() {
        return Err(MigrateError::Config(
            "migration.lock_key must not be empty".into(),
        ));
    }
    if migration.lock_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "migration.lock_timeout_secs must be at least 1".into(),
        ));
    }
    if migration.max_connections == 0 {
        return Err(MigrateError::Config(
            "migration.max_connections must be at least 1".into(),
        ));
    }
    if migration.schema_files.iter().any(|f| f.trim().is_empty()) {
        return Err(MigrateError::Config(
            "migration.schema_files must not contain empty entries".into(),
        ));
    }

    Ok(())
}
