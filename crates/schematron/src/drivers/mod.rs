//! Database driver implementations.
//!
//! Each driver module implements the core traits for one database engine:
//!
//! - `Dialect`: DDL rendering and type translation
//! - `SchemaReader`: live schema introspection
//! - `DdlExecutor` and `MigrationLock`: DDL execution and run serialization
//!
//! Only PostgreSQL is implemented. [`dialect_for`] selects a dialect by the
//! configured database type.

pub mod common;
pub mod postgres;

// Re-export common utilities
pub use common::{SslMode, TlsBuilder};

// Re-export driver types
pub use postgres::{PostgresDialect, PostgresReader, PostgresWriter};

use crate::core::traits::Dialect;
use crate::error::{MigrateError, Result};

/// Create a dialect from a database type string.
///
/// # Errors
///
/// Returns an error if the database type is not recognized.
pub fn dialect_for(db_type: &str) -> Result<Box<dyn Dialect>> {
    match db_type.to_lowercase().as_str() {
        "postgres" | "postgresql" | "pg" => Ok(Box::new(PostgresDialect::new())),
        other => Err(MigrateError::Config(format!(
            "Unknown database type: '{}'. Supported types: postgres",
            other
        ))),
    }
}
