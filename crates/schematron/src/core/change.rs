//! Structural changes produced by the comparator.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::schema::{Column, Index, Table};

/// Kind of structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    CreateTable,
    CreateIndex,
    AddColumn,
    ModifyColumn,
    DropColumn,
    #[serde(rename = "ADD_FK")]
    AddFk,
    Query,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::CreateTable => "CREATE_TABLE",
            ChangeType::CreateIndex => "CREATE_INDEX",
            ChangeType::AddColumn => "ADD_COLUMN",
            ChangeType::ModifyColumn => "MODIFY_COLUMN",
            ChangeType::DropColumn => "DROP_COLUMN",
            ChangeType::AddFk => "ADD_FK",
            ChangeType::Query => "QUERY",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structural change needed to converge the live schema on the target.
///
/// The affected table is always the *target* definition; `old_column` holds
/// the live definition for column modifications and drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub change_type: ChangeType,

    pub table: Table,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<Column>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_column: Option<Column>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<Index>,

    pub reason: String,

    /// Deferred until the post-migrate phase.
    #[serde(default)]
    pub post_migrate_only: bool,

    /// Literal DDL for `Query` changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// SQL guard for `Query` changes; the query runs only if it returns rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Change {
    fn new(change_type: ChangeType, table: &Table, reason: impl Into<String>) -> Self {
        Self {
            change_type,
            table: table.clone(),
            column: None,
            old_column: None,
            index: None,
            reason: reason.into(),
            post_migrate_only: false,
            query: None,
            condition: None,
        }
    }

    pub fn create_table(table: &Table) -> Self {
        Self::new(ChangeType::CreateTable, table, "table not present")
    }

    pub fn create_index(table: &Table, index: &Index, reason: impl Into<String>) -> Self {
        let mut change = Self::new(ChangeType::CreateIndex, table, reason);
        change.index = Some(index.clone());
        change
    }

    pub fn add_column(table: &Table, column: &Column) -> Self {
        let mut change = Self::new(ChangeType::AddColumn, table, "column not present");
        change.column = Some(column.clone());
        change
    }

    pub fn modify_column(
        table: &Table,
        column: &Column,
        old_column: &Column,
        reason: impl Into<String>,
    ) -> Self {
        let mut change = Self::new(ChangeType::ModifyColumn, table, reason);
        change.column = Some(column.clone());
        change.old_column = Some(old_column.clone());
        change
    }

    pub fn drop_column(table: &Table, old_column: &Column) -> Self {
        let mut change = Self::new(ChangeType::DropColumn, table, "column not in schema files");
        change.old_column = Some(old_column.clone());
        change
    }

    pub fn add_foreign_key(table: &Table, column: &Column, reason: impl Into<String>) -> Self {
        let mut change = Self::new(ChangeType::AddFk, table, reason);
        change.column = Some(column.clone());
        change
    }

    /// A literal DDL statement, e.g. a trigger create or drop.
    pub fn query(table: &Table, sql: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut change = Self::new(ChangeType::Query, table, reason);
        change.query = Some(sql.into());
        change
    }

    /// Mark this change as deferred to the post-migrate phase.
    pub fn deferred(mut self) -> Self {
        self.post_migrate_only = true;
        self
    }

    /// Name of the affected column, from the target or the live definition.
    pub fn column_name(&self) -> Option<&str> {
        self.column
            .as_ref()
            .or(self.old_column.as_ref())
            .map(|c| c.name.as_str())
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.change_type, self.table.name)?;
        if let Some(column) = self.column_name() {
            write!(f, ".{}", column)?;
        } else if let Some(index) = &self.index {
            write!(f, " ({})", index.name)?;
        }
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        Ok(())
    }
}
