//! Schema model types: tables, columns, indices, foreign keys, triggers.
//!
//! The same types describe both the desired schema (loaded from schema files)
//! and the live schema (introspected from the database), so the comparator can
//! diff them field by field. Field names serialize in camelCase to match the
//! schema document format.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Column name that marks a table as soft-deletable.
pub const SOFT_DELETE_COLUMN: &str = "is_deleted";

/// A complete schema: tables plus free-form triggers and queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Model {
    pub tables: Vec<Table>,
    pub triggers: Vec<Trigger>,
    pub queries: Vec<ConditionalQuery>,
    pub profiles: BTreeMap<String, Profile>,
}

impl Model {
    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// True if `table.column` exists in this model.
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table)
            .map(|t| t.column(column).is_some())
            .unwrap_or(false)
    }

    /// Tables indexed by name.
    pub fn table_map(&self) -> HashMap<&str, &Table> {
        self.tables.iter().map(|t| (t.name.as_str(), t)).collect()
    }

    /// True if rows of `table` must be soft deleted: the table carries an
    /// `is_deleted` column and does not allow hard deletes.
    pub fn is_soft_deleted(&self, table: &str) -> bool {
        self.table(table)
            .map(Table::enforces_soft_delete)
            .unwrap_or(false)
    }
}

/// Named set of loader behaviors selected at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub enforce_soft_deletes: bool,
}

/// Table definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub name: String,

    /// Comma-separated names of structurally identical copies of this table.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub clone_names: String,

    #[serde(default)]
    pub allow_hard_delete: bool,

    #[serde(default)]
    pub columns: Vec<Column>,

    #[serde(default)]
    pub indices: Vec<Index>,
}

impl Table {
    /// Create an empty table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns indexed by name.
    pub fn column_map(&self) -> HashMap<&str, &Column> {
        self.columns.iter().map(|c| (c.name.as_str(), c)).collect()
    }

    /// Indices indexed by name.
    pub fn index_map(&self) -> HashMap<&str, &Index> {
        self.indices.iter().map(|i| (i.name.as_str(), i)).collect()
    }

    /// Names of the primary key columns, in column order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// All foreign keys declared on this table's columns.
    pub fn foreign_keys(&self) -> Vec<&ForeignKey> {
        self.columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref())
            .collect()
    }

    /// Columns that carry a foreign key.
    pub fn foreign_key_columns(&self) -> Vec<&Column> {
        self.columns
            .iter()
            .filter(|c| c.foreign_key.is_some())
            .collect()
    }

    /// Names of the tables this table references, self references excluded.
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut parents: Vec<String> = Vec::new();
        for fk in self.foreign_keys() {
            if fk.table_name != self.name && !parents.contains(&fk.table_name) {
                parents.push(fk.table_name.clone());
            }
        }
        parents
    }

    pub fn enforces_soft_delete(&self) -> bool {
        !self.allow_hard_delete && self.column(SOFT_DELETE_COLUMN).is_some()
    }

    /// Clone names, trimmed, empty entries skipped.
    pub fn clone_name_list(&self) -> Vec<&str> {
        self.clone_names
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Column definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,

    /// Dialect-neutral type token such as `VARCHAR` or `DECIMAL(10,2)`.
    #[serde(rename = "type")]
    pub data_type: String,

    #[serde(default)]
    pub size: u32,

    #[serde(default)]
    pub decimal: u32,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default)]
    pub primary_key: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ..Default::default()
        }
    }

    /// The type without any inline size, upper-cased: `DECIMAL(10,2)` -> `DECIMAL`.
    pub fn base_type(&self) -> String {
        let base = match self.data_type.find('(') {
            Some(pos) => &self.data_type[..pos],
            None => &self.data_type,
        };
        base.trim().to_uppercase()
    }

    /// True if size and scale are meaningful for this column's type.
    pub fn has_size(&self) -> bool {
        !SIZELESS_TYPES.contains(&self.base_type().as_str())
    }
}

/// Types whose declared size is ignored when comparing schemas.
const SIZELESS_TYPES: &[&str] = &[
    "TEXT",
    "BIT",
    "INTEGER",
    "BIGINT",
    "SMALLINT",
    "BOOLEAN",
    "DATE",
    "TIMESTAMP",
    "TIME",
    "TIMETZ",
    "UUID",
    "JSON",
    "JSONB",
    "BYTEA",
    "REAL",
    "DOUBLE PRECISION",
];

/// Foreign key from a column to the `id` column of another table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Referenced table.
    pub table_name: String,
}

/// Index definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub name: String,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub column_names: Vec<String>,
}

/// Trigger definition. Identity is (name, table, timing).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub name: String,
    pub table: String,
    /// `INSERT`, `UPDATE` or `DELETE`.
    pub event: String,
    /// `BEFORE`, `AFTER` or `INSTEAD OF`.
    pub timing: String,
    pub statement: String,
}

impl Trigger {
    /// Identity key used to match triggers across models.
    pub fn identity(&self) -> (String, String, String) {
        (
            self.name.clone(),
            self.table.clone(),
            self.timing.to_uppercase(),
        )
    }

    /// True if both triggers run the same statement on the same event,
    /// ignoring whitespace and a trailing semicolon.
    pub fn same_definition(&self, other: &Trigger) -> bool {
        fn normalize(s: &str) -> String {
            s.split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .trim_end_matches(';')
                .trim()
                .to_string()
        }
        self.event.eq_ignore_ascii_case(&other.event)
            && normalize(&self.statement) == normalize(&other.statement)
    }
}

/// Free-form SQL run during migration when its guards hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConditionalQuery {
    /// SQL that must return at least one row for the query to run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Table that must exist in the live schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_exists: Option<String>,

    /// `table.column` that must exist in the live schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_exists: Option<String>,

    pub query: String,

    pub post_migrate_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> Table {
        let mut parent = Column::new("parent_id", "INTEGER");
        parent.nullable = true;
        parent.foreign_key = Some(ForeignKey {
            name: "fk_accounts_parent".into(),
            table_name: "accounts".into(),
        });
        let mut owner = Column::new("owner_id", "INTEGER");
        owner.foreign_key = Some(ForeignKey {
            name: "fk_accounts_owner".into(),
            table_name: "users".into(),
        });
        let mut id = Column::new("id", "INTEGER");
        id.primary_key = true;
        Table {
            name: "accounts".into(),
            columns: vec![id, parent, owner, Column::new("is_deleted", "BOOLEAN")],
            ..Default::default()
        }
    }

    #[test]
    fn test_deserialize_schema_document() {
        let json = r#"{
            "tables": [{
                "name": "widgets",
                "cloneNames": "widgets_archive",
                "columns": [
                    {"name": "id", "type": "INTEGER", "primaryKey": true},
                    {"name": "price", "type": "DECIMAL(10,2)", "nullable": true},
                    {"name": "owner_id", "type": "INTEGER",
                     "foreignKey": {"name": "fk_owner", "tableName": "users"}}
                ],
                "indices": [{"name": "ix_owner", "columnNames": ["owner_id"]}]
            }],
            "profiles": {"production": {"enforceSoftDeletes": true}}
        }"#;
        let model: Model = serde_json::from_str(json).unwrap();
        let widgets = model.table("widgets").unwrap();
        assert_eq!(widgets.clone_names, "widgets_archive");
        assert!(widgets.column("id").unwrap().primary_key);
        assert!(widgets.column("price").unwrap().nullable);
        assert_eq!(
            widgets.column("owner_id").unwrap().foreign_key.as_ref().unwrap().table_name,
            "users"
        );
        assert!(!widgets.indices[0].unique);
        assert!(model.profiles["production"].enforce_soft_deletes);
    }

    #[test]
    fn test_table_lookups() {
        let table = accounts();
        assert_eq!(table.primary_key_columns(), vec!["id"]);
        assert_eq!(table.foreign_keys().len(), 2);
        assert_eq!(table.foreign_key_columns().len(), 2);
        assert_eq!(table.referenced_tables(), vec!["users".to_string()]);
        assert!(table.column_map().contains_key("owner_id"));
    }

    #[test]
    fn test_soft_delete_lookup() {
        let mut model = Model {
            tables: vec![accounts(), Table::new("users")],
            ..Default::default()
        };
        assert!(model.is_soft_deleted("accounts"));
        assert!(!model.is_soft_deleted("users"));
        assert!(!model.is_soft_deleted("missing"));

        model.tables[0].allow_hard_delete = true;
        assert!(!model.is_soft_deleted("accounts"));
    }

    #[test]
    fn test_base_type() {
        assert_eq!(Column::new("a", "decimal(10,2)").base_type(), "DECIMAL");
        assert_eq!(Column::new("a", "DOUBLE PRECISION").base_type(), "DOUBLE PRECISION");
    }

    #[test]
    fn test_has_size() {
        assert!(Column::new("a", "VARCHAR").has_size());
        assert!(Column::new("a", "DECIMAL(10,2)").has_size());
        assert!(!Column::new("a", "text").has_size());
        assert!(!Column::new("a", "BIT").has_size());
        assert!(!Column::new("a", "INTEGER").has_size());
    }

    #[test]
    fn test_clone_name_list_trims() {
        let mut table = Table::new("a");
        table.clone_names = " b, c ,,".into();
        assert_eq!(table.clone_name_list(), vec!["b", "c"]);
    }

    #[test]
    fn test_trigger_definition_ignores_whitespace() {
        let a = Trigger {
            name: "t".into(),
            table: "x".into(),
            event: "DELETE".into(),
            timing: "BEFORE".into(),
            statement: "RAISE EXCEPTION 'no';".into(),
        };
        let mut b = a.clone();
        b.statement = "RAISE  EXCEPTION 'no'".into();
        assert!(a.same_definition(&b));
        b.statement = "RAISE EXCEPTION 'yes'".into();
        assert!(!a.same_definition(&b));
        assert_eq!(a.identity(), b.identity());
    }
}
