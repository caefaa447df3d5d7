//! Change to DDL rendering.

use crate::core::change::{Change, ChangeType};
use crate::core::traits::Dialect;
use crate::error::{MigrateError, Result};

/// Render the DDL that applies `change`.
///
/// Pure: the same change always renders to the same statement, so a plan can
/// be printed without a database. `DropColumn` never renders.
pub fn render_change(dialect: &dyn Dialect, change: &Change) -> Result<String> {
    let table = dialect.quote_ident(&change.table.name);

    match change.change_type {
        ChangeType::CreateTable => Ok(dialect.create_table(&change.table)),
        ChangeType::CreateIndex => {
            let index = change
                .index
                .as_ref()
                .ok_or_else(|| MigrateError::execution(change, "no index on change"))?;
            Ok(dialect.index_definition(&change.table, index))
        }
        ChangeType::AddColumn => {
            let column = change
                .column
                .as_ref()
                .ok_or_else(|| MigrateError::execution(change, "no column on change"))?;
            Ok(format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table,
                dialect.column_definition(column)
            ))
        }
        ChangeType::ModifyColumn => dialect.modify_column(change),
        ChangeType::AddFk => {
            let column = change
                .column
                .as_ref()
                .ok_or_else(|| MigrateError::execution(change, "no column on change"))?;
            Ok(format!(
                "ALTER TABLE {} ADD {}",
                table,
                dialect.foreign_key_definition(column)?
            ))
        }
        ChangeType::Query => change
            .query
            .clone()
            .ok_or_else(|| MigrateError::execution(change, "no query on change")),
        ChangeType::DropColumn => Err(MigrateError::DestructiveChange {
            table: change.table.name.clone(),
            column: change.column_name().unwrap_or_default().to_string(),
        }),
    }
}
