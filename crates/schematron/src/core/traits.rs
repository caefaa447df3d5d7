//! Core traits for dialect-independent schema migration.
//!
//! This module defines the seams between the migration engine and a concrete
//! database:
//!
//! - [`Dialect`]: renders model fragments as DDL and maps types (Strategy)
//! - [`SchemaReader`]: introspects the live schema into a [`Model`]
//! - [`DdlExecutor`]: executes DDL statements
//! - [`MigrationLock`]: cluster-wide lock serializing concurrent migrators
//!
//! The comparator and migrator only talk to these traits, so they can be
//! exercised with in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;

use super::change::Change;
use super::schema::{Column, Index, Model, Table, Trigger};

/// SQL dialect strategy for DDL rendering and type translation.
pub trait Dialect: Send + Sync {
    /// Dialect name for logging.
    fn name(&self) -> &str;

    /// Quote an identifier (table, column, constraint name).
    fn quote_ident(&self, name: &str) -> String;

    /// Map a backend type name to its dialect-neutral token.
    fn type_from_db(&self, db_type: &str) -> String;

    /// Canonical spelling of a declared type, so aliases (`INT4`, `NUMERIC`)
    /// compare equal to what [`Dialect::type_from_db`] reports. Any inline
    /// size such as `(10, 2)` is kept.
    fn normalize_type(&self, data_type: &str) -> String;

    /// Map a dialect-neutral type token to the backend type used in DDL.
    fn type_to_db(&self, data_type: &str) -> String;

    /// Column definition as used in CREATE TABLE and ADD COLUMN.
    fn column_definition(&self, column: &Column) -> String;

    /// Primary key clause for CREATE TABLE, if the table has key columns.
    fn primary_key_definition(&self, table: &Table) -> Option<String>;

    /// Foreign key constraint clause for a column carrying a foreign key.
    fn foreign_key_definition(&self, column: &Column) -> Result<String>;

    /// Complete CREATE INDEX statement.
    fn index_definition(&self, table: &Table, index: &Index) -> String;

    /// DDL for a ModifyColumn change.
    fn modify_column(&self, change: &Change) -> Result<String>;

    /// DDL creating a trigger.
    fn create_trigger_query(&self, trigger: &Trigger) -> String;

    /// DDL dropping a trigger.
    fn drop_trigger_query(&self, trigger: &Trigger) -> String;

    /// Trigger statement that aborts the triggering operation with `message`.
    fn reject_statement(&self, message: &str) -> String;

    /// Complete CREATE TABLE statement.
    ///
    /// Foreign keys are not included; they are added by separate changes
    /// once every referenced table exists.
    fn create_table(&self, table: &Table) -> String {
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        if let Some(pk) = self.primary_key_definition(table) {
            parts.push(pk);
        }
        format!(
            "CREATE TABLE {} ({})",
            self.quote_ident(&table.name),
            parts.join(", ")
        )
    }
}

/// Read the live schema from a database.
#[async_trait]
pub trait SchemaReader: Send + Sync {
    /// Introspect every user table of `schema` into a model.
    async fn read_current_model(&self, schema: &str) -> Result<Model>;

    /// True if `query` returns at least one row.
    async fn has_rows(&self, query: &str) -> Result<bool>;
}

/// Execute DDL against a database.
#[async_trait]
pub trait DdlExecutor: Send + Sync {
    /// Create the schema (namespace) if it does not exist.
    async fn create_schema(&self, schema: &str) -> Result<()>;

    /// Execute one DDL statement (may contain several `;`-separated commands).
    async fn execute(&self, sql: &str) -> Result<()>;
}

/// Named lock held for the duration of a migration run.
#[async_trait]
pub trait MigrationLock: Send + Sync {
    /// Try to take the lock without waiting. Returns false if it is held elsewhere.
    async fn try_lock(&self, key: &str) -> Result<bool>;

    /// Release a lock taken with [`MigrationLock::try_lock`].
    async fn unlock(&self, key: &str) -> Result<()>;
}
