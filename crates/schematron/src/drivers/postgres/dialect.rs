//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Renders model fragments as PostgreSQL DDL and translates between catalog
//! type names and the dialect-neutral tokens used in schema files.

use crate::core::change::Change;
use crate::core::schema::{Column, Index, Table, Trigger};
use crate::core::traits::Dialect;
use crate::error::{MigrateError, Result};

/// Dollar-quote tag for trigger function bodies.
const BODY_TAG: &str = "$schematron$";

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn quote_list(&self, names: &[impl AsRef<str>]) -> String {
        names
            .iter()
            .map(|n| self.quote_ident(n.as_ref()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Type clause with the size appended unless it was declared inline.
    fn column_type(&self, column: &Column) -> String {
        let mut ddl = self.type_to_db(&column.data_type);
        if !column.data_type.contains('(') && column.size > 0 && column.has_size() {
            if column.decimal > 0 {
                ddl.push_str(&format!("({},{})", column.size, column.decimal));
            } else {
                ddl.push_str(&format!("({})", column.size));
            }
        }
        ddl
    }

    fn default_literal(&self, column: &Column, value: &str) -> String {
        let quoted = matches!(column.base_type().as_str(), "CHAR" | "VARCHAR" | "TEXT");
        if quoted && !value.starts_with('\'') {
            format!("'{}'", value.replace('\'', "''"))
        } else {
            value.to_string()
        }
    }

    /// True if the change alters type, size or scale rather than only nullability.
    fn is_type_change(column: &Column, old: &Column) -> bool {
        if column.base_type() != old.base_type() {
            return true;
        }
        column.has_size() && (column.size != old.size || column.decimal != old.decimal)
    }

    /// Trigger names are unique per table only, so the function carries both.
    fn trigger_function_name(trigger: &Trigger) -> String {
        format!("{}_{}_fn", trigger.table, trigger.name)
    }
}

/// `FLOAT(p)` is `REAL` up to 24 bits of precision, `DOUBLE PRECISION` above.
fn float_type(precision: &str) -> &'static str {
    let bits = precision
        .trim_matches(|c: char| c == '(' || c == ')')
        .trim()
        .parse::<u32>()
        .unwrap_or(53);
    if bits <= 24 {
        "REAL"
    } else {
        "DOUBLE PRECISION"
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Handle names that contain double quotes by doubling them
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn type_from_db(&self, db_type: &str) -> String {
        self.normalize_type(db_type)
    }

    fn normalize_type(&self, data_type: &str) -> String {
        let trimmed = data_type.trim();
        let (base, suffix) = match trimmed.find('(') {
            Some(pos) => (&trimmed[..pos], &trimmed[pos..]),
            None => (trimmed, ""),
        };
        let base = base
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();

        let canonical = match base.as_str() {
            "CHARACTER" | "BPCHAR" => "CHAR",
            "CHARACTER VARYING" => "VARCHAR",
            "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" | "TIMESTAMP WITHOUT TIME ZONE" => {
                "TIMESTAMP"
            }
            "TIME WITHOUT TIME ZONE" => "TIME",
            "TIME WITH TIME ZONE" => "TIMETZ",
            "NUMERIC" => "DECIMAL",
            "INT" | "INT4" => "INTEGER",
            "INT8" => "BIGINT",
            "INT2" => "SMALLINT",
            "BOOL" => "BOOLEAN",
            "FLOAT" => return float_type(suffix).to_string(),
            "FLOAT8" => "DOUBLE PRECISION",
            "FLOAT4" => "REAL",
            other => other,
        };
        format!("{}{}", canonical, suffix)
    }

    fn type_to_db(&self, data_type: &str) -> String {
        if data_type.eq_ignore_ascii_case("TIMESTAMP") {
            "TIMESTAMP WITH TIME ZONE".to_string()
        } else {
            data_type.to_string()
        }
    }

    fn column_definition(&self, column: &Column) -> String {
        let mut ddl = format!(
            "{} {}",
            self.quote_ident(&column.name),
            self.column_type(column)
        );
        if !column.nullable {
            ddl.push_str(" NOT NULL");
        }
        if let Some(value) = column.default_value.as_deref().filter(|v| !v.is_empty()) {
            ddl.push_str(" DEFAULT ");
            ddl.push_str(&self.default_literal(column, value));
        }
        ddl
    }

    fn primary_key_definition(&self, table: &Table) -> Option<String> {
        let pk = table.primary_key_columns();
        if pk.is_empty() {
            return None;
        }
        Some(format!("PRIMARY KEY ({})", self.quote_list(&pk)))
    }

    fn foreign_key_definition(&self, column: &Column) -> Result<String> {
        let fk = column.foreign_key.as_ref().ok_or_else(|| {
            MigrateError::Load(format!("column {} has no foreign key", column.name))
        })?;
        Ok(format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_ident(&fk.name),
            self.quote_ident(&column.name),
            self.quote_ident(&fk.table_name),
            self.quote_ident("id")
        ))
    }

    fn index_definition(&self, table: &Table, index: &Index) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_ident(&index.name),
            self.quote_ident(&table.name),
            self.quote_list(&index.column_names)
        )
    }

    fn modify_column(&self, change: &Change) -> Result<String> {
        let (Some(column), Some(old)) = (&change.column, &change.old_column) else {
            return Err(MigrateError::execution(
                change,
                "column modification needs both the target and the live column",
            ));
        };

        let name = self.quote_ident(&column.name);
        let mut clauses = Vec::new();
        if Self::is_type_change(column, old) {
            clauses.push(format!(
                "ALTER COLUMN {} TYPE {}",
                name,
                self.column_type(column)
            ));
        }
        if column.nullable != old.nullable {
            let action = if column.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
            clauses.push(format!("ALTER COLUMN {} {}", name, action));
        }
        if clauses.is_empty() {
            return Err(MigrateError::execution(change, "no column difference to apply"));
        }

        Ok(format!(
            "ALTER TABLE {} {}",
            self.quote_ident(&change.table.name),
            clauses.join(", ")
        ))
    }

    fn create_trigger_query(&self, trigger: &Trigger) -> String {
        let timing = trigger.timing.to_uppercase();
        let event = trigger.event.to_uppercase();
        let returns = if timing == "AFTER" {
            "NULL"
        } else if event == "DELETE" {
            "OLD"
        } else {
            "NEW"
        };
        let function = self.quote_ident(&Self::trigger_function_name(trigger));
        let statement = trigger.statement.trim().trim_end_matches(';');

        format!(
            "CREATE OR REPLACE FUNCTION {function}() RETURNS trigger LANGUAGE plpgsql AS {tag}\n\
             BEGIN\n    {statement};\n    RETURN {returns};\nEND;\n{tag};\n\
             CREATE TRIGGER {name} {timing} {event} ON {table} FOR EACH ROW EXECUTE FUNCTION {function}()",
            function = function,
            tag = BODY_TAG,
            statement = statement,
            returns = returns,
            name = self.quote_ident(&trigger.name),
            timing = timing,
            event = event,
            table = self.quote_ident(&trigger.table),
        )
    }

    fn drop_trigger_query(&self, trigger: &Trigger) -> String {
        format!(
            "DROP TRIGGER IF EXISTS {} ON {};\nDROP FUNCTION IF EXISTS {}()",
            self.quote_ident(&trigger.name),
            self.quote_ident(&trigger.table),
            self.quote_ident(&Self::trigger_function_name(trigger))
        )
    }

    fn reject_statement(&self, message: &str) -> String {
        format!(
            "RAISE EXCEPTION '{}' USING ERRCODE = '45000'",
            message.replace('\'', "''")
        )
    }
}

/// Recover the trigger statement from a trigger function body rendered by
/// [`PostgresDialect::create_trigger_query`].
///
/// Bodies in any other shape are returned trimmed.
pub(crate) fn parse_trigger_body(body: &str) -> String {
    let upper = body.to_ascii_uppercase();
    let start = upper.find("BEGIN").map(|p| p + "BEGIN".len());
    let end = upper.rfind("RETURN");
    match (start, end) {
        (Some(start), Some(end)) if start < end => body[start..end]
            .trim()
            .trim_end_matches(';')
            .trim()
            .to_string(),
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ForeignKey;

    fn col(name: &str, data_type: &str) -> Column {
        Column::new(name, data_type)
    }

    fn widgets() -> Table {
        let mut id = col("id", "BIGINT");
        id.primary_key = true;
        let mut name = col("name", "VARCHAR");
        name.size = 50;
        Table {
            name: "widgets".into(),
            columns: vec![id, name],
            ..Default::default()
        }
    }

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("users"), "\"users\"");
        assert_eq!(dialect.quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_type_translation() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.type_from_db("character varying"), "VARCHAR");
        assert_eq!(dialect.type_from_db("character"), "CHAR");
        assert_eq!(dialect.type_from_db("timestamp with time zone"), "TIMESTAMP");
        assert_eq!(dialect.type_from_db("timestamp without time zone"), "TIMESTAMP");
        assert_eq!(dialect.type_from_db("numeric"), "DECIMAL");
        assert_eq!(dialect.type_from_db("integer"), "INTEGER");
        assert_eq!(dialect.type_from_db("double precision"), "DOUBLE PRECISION");
        assert_eq!(dialect.type_from_db("time without time zone"), "TIME");
        assert_eq!(dialect.type_from_db("time with time zone"), "TIMETZ");
        assert_eq!(dialect.type_from_db("citext"), "CITEXT");
        assert_eq!(dialect.type_to_db("TIMESTAMP"), "TIMESTAMP WITH TIME ZONE");
        assert_eq!(dialect.type_to_db("VARCHAR"), "VARCHAR");
    }

    #[test]
    fn test_declared_aliases_are_normalized() {
        let dialect = PostgresDialect::new();
        for (declared, canonical) in [
            ("int", "INTEGER"),
            ("INT4", "INTEGER"),
            ("int8", "BIGINT"),
            ("INT2", "SMALLINT"),
            ("bool", "BOOLEAN"),
            ("FLOAT8", "DOUBLE PRECISION"),
            ("float", "DOUBLE PRECISION"),
            ("FLOAT(53)", "DOUBLE PRECISION"),
            ("FLOAT(24)", "REAL"),
            ("FLOAT4", "REAL"),
            ("NUMERIC", "DECIMAL"),
            ("numeric(12, 2)", "DECIMAL(12, 2)"),
            ("character  varying(40)", "VARCHAR(40)"),
            ("TIMESTAMPTZ", "TIMESTAMP"),
            ("time", "TIME"),
            ("TIMETZ", "TIMETZ"),
            ("uuid", "UUID"),
        ] {
            assert_eq!(dialect.normalize_type(declared), canonical, "{}", declared);
        }
    }

    #[test]
    fn test_column_definition() {
        let dialect = PostgresDialect::new();

        let mut name = col("name", "VARCHAR");
        name.size = 50;
        assert_eq!(dialect.column_definition(&name), "\"name\" VARCHAR(50) NOT NULL");

        let mut price = col("price", "DECIMAL");
        price.size = 10;
        price.decimal = 2;
        price.nullable = true;
        assert_eq!(dialect.column_definition(&price), "\"price\" DECIMAL(10,2)");

        let mut inline = col("lat", "DECIMAL(10,7)");
        inline.size = 10;
        inline.decimal = 7;
        assert_eq!(dialect.column_definition(&inline), "\"lat\" DECIMAL(10,7) NOT NULL");

        let mut created = col("created_at", "TIMESTAMP");
        created.default_value = Some("now()".into());
        assert_eq!(
            dialect.column_definition(&created),
            "\"created_at\" TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()"
        );

        let mut status = col("status", "VARCHAR");
        status.size = 10;
        status.default_value = Some("it's new".into());
        assert_eq!(
            dialect.column_definition(&status),
            "\"status\" VARCHAR(10) NOT NULL DEFAULT 'it''s new'"
        );

        let mut count = col("count", "INTEGER");
        count.size = 32;
        assert_eq!(dialect.column_definition(&count), "\"count\" INTEGER NOT NULL");
    }

    #[test]
    fn test_create_table() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.create_table(&widgets()),
            "CREATE TABLE \"widgets\" (\"id\" BIGINT NOT NULL, \"name\" VARCHAR(50) NOT NULL, PRIMARY KEY (\"id\"))"
        );
    }

    #[test]
    fn test_create_table_without_primary_key() {
        let dialect = PostgresDialect::new();
        let table = Table {
            name: "log".into(),
            columns: vec![col("line", "TEXT")],
            ..Default::default()
        };
        assert_eq!(
            dialect.create_table(&table),
            "CREATE TABLE \"log\" (\"line\" TEXT NOT NULL)"
        );
    }

    #[test]
    fn test_foreign_key_definition() {
        let dialect = PostgresDialect::new();
        let mut owner = col("owner_id", "BIGINT");
        owner.foreign_key = Some(ForeignKey {
            name: "fk_widgets_owner".into(),
            table_name: "users".into(),
        });
        assert_eq!(
            dialect.foreign_key_definition(&owner).unwrap(),
            "CONSTRAINT \"fk_widgets_owner\" FOREIGN KEY (\"owner_id\") REFERENCES \"users\" (\"id\")"
        );
        assert!(dialect.foreign_key_definition(&col("x", "INTEGER")).is_err());
    }

    #[test]
    fn test_index_definition() {
        let dialect = PostgresDialect::new();
        let index = Index {
            name: "ux_widgets_name".into(),
            unique: true,
            column_names: vec!["name".into(), "id".into()],
        };
        assert_eq!(
            dialect.index_definition(&widgets(), &index),
            "CREATE UNIQUE INDEX \"ux_widgets_name\" ON \"widgets\" (\"name\", \"id\")"
        );
    }

    #[test]
    fn test_modify_column_nullability_only() {
        let dialect = PostgresDialect::new();
        let table = widgets();
        let mut target = table.columns[1].clone();
        target.nullable = true;
        let change = Change::modify_column(&table, &target, &table.columns[1], "nullable status");
        assert_eq!(
            dialect.modify_column(&change).unwrap(),
            "ALTER TABLE \"widgets\" ALTER COLUMN \"name\" DROP NOT NULL"
        );
    }

    #[test]
    fn test_modify_column_size_change() {
        let dialect = PostgresDialect::new();
        let table = widgets();
        let mut target = table.columns[1].clone();
        target.size = 100;
        let change = Change::modify_column(&table, &target, &table.columns[1], "size mismatch");
        assert_eq!(
            dialect.modify_column(&change).unwrap(),
            "ALTER TABLE \"widgets\" ALTER COLUMN \"name\" TYPE VARCHAR(100)"
        );
    }

    #[test]
    fn test_modify_column_type_and_nullability() {
        let dialect = PostgresDialect::new();
        let table = widgets();
        let mut old = col("code", "INTEGER");
        old.nullable = true;
        let target = col("code", "BIGINT");
        let change = Change::modify_column(&table, &target, &old, "data type mismatch");
        assert_eq!(
            dialect.modify_column(&change).unwrap(),
            "ALTER TABLE \"widgets\" ALTER COLUMN \"code\" TYPE BIGINT, ALTER COLUMN \"code\" SET NOT NULL"
        );
    }

    #[test]
    fn test_modify_column_ignores_size_of_sizeless_types() {
        let dialect = PostgresDialect::new();
        let table = widgets();
        let mut old = col("flag", "BIT");
        old.size = 1;
        let mut target = col("flag", "BIT");
        target.nullable = true;
        let change = Change::modify_column(&table, &target, &old, "nullable status");
        assert_eq!(
            dialect.modify_column(&change).unwrap(),
            "ALTER TABLE \"widgets\" ALTER COLUMN \"flag\" DROP NOT NULL"
        );
    }

    #[test]
    fn test_trigger_round_trip() {
        let dialect = PostgresDialect::new();
        let trigger = Trigger {
            name: "accounts_enforce_soft_delete".into(),
            table: "accounts".into(),
            event: "DELETE".into(),
            timing: "BEFORE".into(),
            statement: dialect.reject_statement("DELETE not allowed"),
        };

        let create = dialect.create_trigger_query(&trigger);
        assert!(create.contains(
            "CREATE OR REPLACE FUNCTION \"accounts_accounts_enforce_soft_delete_fn\"()"
        ));
        assert!(create.contains("RETURN OLD;"));
        assert!(create.contains(
            "CREATE TRIGGER \"accounts_enforce_soft_delete\" BEFORE DELETE ON \"accounts\" FOR EACH ROW"
        ));

        let start = create.find(BODY_TAG).unwrap() + BODY_TAG.len();
        let end = create[start..].find(BODY_TAG).unwrap() + start;
        assert_eq!(parse_trigger_body(&create[start..end]), trigger.statement);

        let drop = dialect.drop_trigger_query(&trigger);
        assert_eq!(
            drop,
            "DROP TRIGGER IF EXISTS \"accounts_enforce_soft_delete\" ON \"accounts\";\n\
             DROP FUNCTION IF EXISTS \"accounts_accounts_enforce_soft_delete_fn\"()"
        );
    }

    #[test]
    fn test_same_trigger_name_on_two_tables_uses_separate_functions() {
        let dialect = PostgresDialect::new();
        let audit = |table: &str, statement: &str| Trigger {
            name: "audit".into(),
            table: table.into(),
            event: "UPDATE".into(),
            timing: "AFTER".into(),
            statement: statement.into(),
        };
        let a = audit("a", "INSERT INTO a_log VALUES (NEW.id)");
        let b = audit("b", "INSERT INTO b_log VALUES (NEW.id)");

        let create_a = dialect.create_trigger_query(&a);
        let create_b = dialect.create_trigger_query(&b);
        assert!(create_a.starts_with("CREATE OR REPLACE FUNCTION \"a_audit_fn\"()"));
        assert!(create_a.ends_with("EXECUTE FUNCTION \"a_audit_fn\"()"));
        assert!(create_b.starts_with("CREATE OR REPLACE FUNCTION \"b_audit_fn\"()"));
        assert!(create_b.ends_with("EXECUTE FUNCTION \"b_audit_fn\"()"));

        assert!(dialect
            .drop_trigger_query(&a)
            .ends_with("DROP FUNCTION IF EXISTS \"a_audit_fn\"()"));
        assert!(!dialect.drop_trigger_query(&a).contains("b_audit_fn"));
    }

    #[test]
    fn test_parse_foreign_trigger_body() {
        assert_eq!(parse_trigger_body("  PERFORM audit();  "), "PERFORM audit();");
    }

    #[test]
    fn test_reject_statement_escapes_quotes() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.reject_statement("don't"),
            "RAISE EXCEPTION 'don''t' USING ERRCODE = '45000'"
        );
    }
}
