//! # schematron
//!
//! Declarative schema reconciliation for PostgreSQL.
//!
//! Schema files describe the tables, indices, foreign keys and triggers a
//! database should have. A run introspects the live schema, computes the
//! structural changes needed to converge on the declared one and executes
//! them as DDL:
//!
//! - **Additive only**: columns never shrink and are never dropped; a
//!   column missing from the schema files aborts the run before any DDL
//! - **Two phases**: foreign keys of new tables can be deferred to a
//!   post-migrate pass after application rollout
//! - **Single runner**: an advisory lock serializes concurrent instances
//! - **Extensible**: hooks contribute extra changes and run after migration
//!
//! ## Example
//!
//! ```rust,no_run
//! use schematron::{Config, FileResourceLoader, MigrationPhase, Migrator};
//!
//! #[tokio::main]
//! async fn main() -> schematron::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let resources = FileResourceLoader::new("./schema");
//!     let files = config.migration.schema_files.clone();
//!     let migrator = Migrator::connect(config).await?;
//!     let report = migrator.migrate(&resources, &files, MigrationPhase::Full).await?;
//!     println!("Applied {} changes", report.changes_applied);
//!     Ok(())
//! }
//! ```

pub mod compare;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod graph;
pub mod loader;
pub mod migrator;

// Re-exports for convenient access
pub use compare::SchemaChanger;
pub use config::{Config, DatabaseConfig, MigrationConfig};
pub use core::{Change, ChangeType, Column, ForeignKey, Index, Model, Table, Trigger};
pub use error::{MigrateError, Result};
pub use loader::{FileResourceLoader, MemoryResourceLoader, ResourceLoader, SchemaLoader};
pub use migrator::{
    render_change, MigrationPhase, MigrationPlan, MigrationReport, Migrator, PostMigrator,
};
