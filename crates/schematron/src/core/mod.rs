//! Core abstractions for dialect-independent schema migration.
//!
//! - [`schema`]: the schema model (tables, columns, indices, triggers)
//! - [`change`]: structural changes computed by the comparator
//! - [`traits`]: dialect, introspection, execution and locking seams
//!
//! Driver modules (`drivers/postgres`) implement the traits; the comparator
//! and migrator depend only on this module.

pub mod change;
pub mod schema;
pub mod traits;

pub use change::{Change, ChangeType};
pub use schema::{
    Column, ConditionalQuery, ForeignKey, Index, Model, Profile, Table, Trigger,
    SOFT_DELETE_COLUMN,
};
pub use traits::{DdlExecutor, Dialect, MigrationLock, SchemaReader};
