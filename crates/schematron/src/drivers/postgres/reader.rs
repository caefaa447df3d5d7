//! PostgreSQL schema reader.
//!
//! Introspects the live schema from `information_schema` and `pg_catalog` into
//! a [`Model`], normalizing catalog type names to dialect-neutral tokens so the
//! result compares cleanly against the schema files.

use std::collections::HashSet;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::SimpleQueryMessage;
use tracing::{debug, info, warn};

use super::dialect::{parse_trigger_body, PostgresDialect};
use crate::core::schema::{Column, ForeignKey, Index, Model, Table, Trigger};
use crate::core::traits::{Dialect, SchemaReader};
use crate::error::{MigrateError, Result};

// pg_trigger.tgtype bits
const TRIGGER_TYPE_BEFORE: i32 = 1 << 1;
const TRIGGER_TYPE_INSERT: i32 = 1 << 2;
const TRIGGER_TYPE_DELETE: i32 = 1 << 3;
const TRIGGER_TYPE_UPDATE: i32 = 1 << 4;
const TRIGGER_TYPE_TRUNCATE: i32 = 1 << 5;
const TRIGGER_TYPE_INSTEAD: i32 = 1 << 6;

/// One row of `information_schema.columns`.
pub(crate) struct CatalogColumn<'a> {
    pub name: &'a str,
    pub data_type: &'a str,
    pub char_length: i32,
    pub precision: i32,
    pub scale: i32,
    pub nullable: bool,
}

impl CatalogColumn<'_> {
    /// The column as a schema file would declare it.
    pub(crate) fn to_column(&self, dialect: &dyn Dialect) -> Column {
        let data_type = dialect.type_from_db(self.data_type);
        let (size, decimal) = match data_type.as_str() {
            "CHAR" | "VARCHAR" => (self.char_length, 0),
            // integer precision is not a declared size
            "DECIMAL" => (self.precision, self.scale),
            _ => (0, 0),
        };
        Column {
            name: self.name.to_string(),
            data_type,
            size: size.max(0) as u32,
            decimal: decimal.max(0) as u32,
            nullable: self.nullable,
            ..Default::default()
        }
    }
}

/// PostgreSQL schema reader implementation.
pub struct PostgresReader {
    pool: Pool,
    dialect: PostgresDialect,
}

impl PostgresReader {
    /// Create a reader on an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            dialect: PostgresDialect::new(),
        }
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, format!("getting connection for {}", context)))
    }

    /// Names of all base tables in the schema.
    async fn load_table_names(&self, schema: &str) -> Result<Vec<String>> {
        let client = self.client("load_table_names").await?;

        let query = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND table_schema = $1
            ORDER BY table_name
        "#;

        let rows = client.query(query, &[&schema]).await?;
        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    /// Load columns for a table.
    async fn load_columns(&self, schema: &str, table: &mut Table) -> Result<()> {
        let client = self.client("load_columns").await?;

        let query = r#"
            SELECT
                column_name::text,
                CASE WHEN data_type = 'USER-DEFINED' THEN udt_name::text ELSE data_type::text END,
                COALESCE(character_maximum_length, 0)::int4,
                COALESCE(numeric_precision, 0)::int4,
                COALESCE(numeric_scale, 0)::int4,
                is_nullable = 'YES'
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = client.query(query, &[&schema, &table.name]).await?;

        for row in rows {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            let column = CatalogColumn {
                name: &name,
                data_type: &data_type,
                char_length: row.get(2),
                precision: row.get(3),
                scale: row.get(4),
                nullable: row.get(5),
            }
            .to_column(&self.dialect);
            table.columns.push(column);
        }

        debug!("Loaded {} columns for {}", table.columns.len(), table.name);
        Ok(())
    }

    /// Mark primary key columns.
    async fn load_primary_key(&self, schema: &str, table: &mut Table) -> Result<()> {
        let client = self.client("load_primary_key").await?;

        let query = r#"
            SELECT a.attname::text
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'p'
              AND a.attnum = ANY(c.conkey)
            ORDER BY array_position(c.conkey, a.attnum)
        "#;

        let rows = client.query(query, &[&schema, &table.name]).await?;

        for row in rows {
            let col_name: String = row.get(0);
            if let Some(col) = table.columns.iter_mut().find(|c| c.name == col_name) {
                col.primary_key = true;
            }
        }

        debug!(
            "Primary key for {}: {:?}",
            table.name,
            table.primary_key_columns()
        );
        Ok(())
    }

    /// Attach foreign keys to their columns. Returns the constraint names.
    async fn load_foreign_keys(&self, schema: &str, table: &mut Table) -> Result<HashSet<String>> {
        let client = self.client("load_foreign_keys").await?;

        let query = r#"
            SELECT
                c.conname::text,
                a.attname::text,
                rt.relname::text,
                ra.attname::text,
                array_length(c.conkey, 1)::int4
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            JOIN pg_catalog.pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = c.conkey[1]
            JOIN pg_catalog.pg_attribute ra ON ra.attrelid = c.confrelid AND ra.attnum = c.confkey[1]
            WHERE n.nspname = $1
              AND t.relname = $2
              AND c.contype = 'f'
            ORDER BY c.conname
        "#;

        let rows = client.query(query, &[&schema, &table.name]).await?;

        let mut names = HashSet::new();
        for row in rows {
            let name: String = row.get(0);
            let column_name: String = row.get(1);
            let ref_table: String = row.get(2);
            let ref_column: String = row.get(3);
            let key_len: i32 = row.get(4);
            names.insert(name.clone());

            if key_len > 1 {
                warn!(
                    "Skipping multi-column foreign key {} on {}: not representable in the schema model",
                    name, table.name
                );
                continue;
            }
            if ref_column != "id" {
                return Err(MigrateError::Introspection(format!(
                    "foreign key {} on {}.{} references {}.{}; only references to an id column are supported",
                    name, table.name, column_name, ref_table, ref_column
                )));
            }
            if let Some(col) = table.columns.iter_mut().find(|c| c.name == column_name) {
                col.foreign_key = Some(ForeignKey {
                    name,
                    table_name: ref_table,
                });
            }
        }

        debug!("Loaded {} foreign keys for {}", names.len(), table.name);
        Ok(names)
    }

    /// Load indices, skipping the primary key index and foreign key indices.
    async fn load_indexes(
        &self,
        schema: &str,
        table: &mut Table,
        foreign_keys: &HashSet<String>,
    ) -> Result<()> {
        let client = self.client("load_indexes").await?;

        let query = r#"
            SELECT
                i.relname::text AS index_name,
                ix.indisunique,
                array_agg(a.attname::text ORDER BY array_position(ix.indkey, a.attnum)) AS columns
            FROM pg_catalog.pg_index ix
            JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
            JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE n.nspname = $1
              AND t.relname = $2
              AND NOT ix.indisprimary
            GROUP BY i.relname, ix.indisunique
            ORDER BY i.relname
        "#;

        let rows = client.query(query, &[&schema, &table.name]).await?;

        for row in rows {
            let name: String = row.get(0);
            if foreign_keys.contains(&name) {
                continue;
            }
            table.indices.push(Index {
                name,
                unique: row.get(1),
                column_names: row.get(2),
            });
        }

        debug!("Loaded {} indexes for {}", table.indices.len(), table.name);
        Ok(())
    }

    /// Load user-defined triggers of the schema.
    async fn load_triggers(&self, schema: &str) -> Result<Vec<Trigger>> {
        let client = self.client("load_triggers").await?;

        let query = r#"
            SELECT t.tgname::text, c.relname::text, t.tgtype::int4, p.prosrc
            FROM pg_catalog.pg_trigger t
            JOIN pg_catalog.pg_class c ON c.oid = t.tgrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_catalog.pg_proc p ON p.oid = t.tgfoid
            WHERE n.nspname = $1
              AND NOT t.tgisinternal
            ORDER BY c.relname, t.tgname
        "#;

        let rows = client.query(query, &[&schema]).await?;

        let triggers = rows
            .iter()
            .map(|row| {
                let (timing, event) = decode_trigger_type(row.get(2));
                Trigger {
                    name: row.get(0),
                    table: row.get(1),
                    event,
                    timing,
                    statement: parse_trigger_body(&row.get::<_, String>(3)),
                }
            })
            .collect::<Vec<_>>();

        debug!("Loaded {} triggers from schema '{}'", triggers.len(), schema);
        Ok(triggers)
    }
}

/// Decode `pg_trigger.tgtype` into (timing, event).
fn decode_trigger_type(tgtype: i32) -> (String, String) {
    let timing = if tgtype & TRIGGER_TYPE_INSTEAD != 0 {
        "INSTEAD OF"
    } else if tgtype & TRIGGER_TYPE_BEFORE != 0 {
        "BEFORE"
    } else {
        "AFTER"
    };

    let events: Vec<&str> = [
        (TRIGGER_TYPE_INSERT, "INSERT"),
        (TRIGGER_TYPE_UPDATE, "UPDATE"),
        (TRIGGER_TYPE_DELETE, "DELETE"),
        (TRIGGER_TYPE_TRUNCATE, "TRUNCATE"),
    ]
    .iter()
    .filter(|(bit, _)| tgtype & bit != 0)
    .map(|(_, name)| *name)
    .collect();

    (timing.to_string(), events.join(" OR "))
}

#[async_trait]
impl SchemaReader for PostgresReader {
    async fn read_current_model(&self, schema: &str) -> Result<Model> {
        let mut model = Model::default();

        for name in self.load_table_names(schema).await? {
            let mut table = Table::new(name);
            self.load_columns(schema, &mut table).await?;
            self.load_primary_key(schema, &mut table).await?;
            let foreign_keys = self.load_foreign_keys(schema, &mut table).await?;
            self.load_indexes(schema, &mut table, &foreign_keys).await?;
            model.tables.push(table);
        }
        model.triggers = self.load_triggers(schema).await?;

        info!(
            "Read {} tables and {} triggers from schema '{}'",
            model.tables.len(),
            model.triggers.len(),
            schema
        );
        Ok(model)
    }

    async fn has_rows(&self, query: &str) -> Result<bool> {
        let client = self.client("has_rows").await?;
        let messages = client.simple_query(query).await?;
        Ok(messages
            .iter()
            .any(|m| matches!(m, SimpleQueryMessage::Row(_))))
    }
}
