//! Structural diff between the live schema and the target schema.
//!
//! [`compare`] is pure: it never touches a database, and for the same inputs
//! it returns the same changes in the same order:
//!
//! 1. new tables, parents before children: `CREATE_TABLE` then its indices
//! 2. diffs of existing tables, in declaration order
//! 3. foreign keys of new tables, deferred to the post-migrate phase
//! 4. changes returned by extension hooks
//! 5. conditional queries whose existence guards hold
//! 6. trigger drops, then trigger creates

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::core::change::Change;
use crate::core::schema::{Column, Model, Table, Trigger};
use crate::core::traits::Dialect;
use crate::error::Result;
use crate::graph::{Graph, Vertex};

/// Extension hook contributing extra changes from (source, target).
pub type SchemaChanger = Box<dyn Fn(&Model, &Model) -> Result<Vec<Change>> + Send + Sync>;

/// Changes that converge `source` (live) on `target` (declared).
pub fn compare(
    source: &Model,
    target: &Model,
    changers: &[SchemaChanger],
    dialect: &dyn Dialect,
) -> Result<Vec<Change>> {
    info!("Source tables: {}", source.tables.len());
    info!("Target tables: {}", target.tables.len());

    let source_map = source.table_map();
    let mut results = Vec::new();
    let mut deferred_fks = Vec::new();

    let new_tables: Vec<&Table> = target
        .tables
        .iter()
        .filter(|t| !source_map.contains_key(t.name.as_str()))
        .collect();

    for table in sort_by_dependency(&new_tables) {
        results.push(Change::create_table(table));
        for index in &table.indices {
            results.push(Change::create_index(table, index, "table not present"));
        }
        for column in table.foreign_key_columns() {
            deferred_fks.push(Change::add_foreign_key(table, column, "new table").deferred());
        }
    }

    for table in &target.tables {
        if let Some(existing) = source_map.get(table.name.as_str()) {
            results.extend(compare_tables(existing, table));
        }
    }

    results.extend(deferred_fks);

    for changer in changers {
        results.extend(changer(source, target)?);
    }

    results.extend(conditional_queries(source, target));

    let (creates, drops) = compare_triggers(source, target);
    // Drops first: a redefined trigger is dropped before it is recreated.
    for trigger in &drops {
        results.push(Change::query(
            &trigger_table(target, source, trigger),
            dialect.drop_trigger_query(trigger),
            format!("drop trigger {}", trigger.name),
        ));
    }
    for trigger in &creates {
        results.push(Change::query(
            &trigger_table(target, source, trigger),
            dialect.create_trigger_query(trigger),
            format!("create trigger {}", trigger.name),
        ));
    }

    debug!("Computed {} change(s)", results.len());
    Ok(results)
}

/// New tables ordered so referenced tables come first. Tables caught in a
/// reference cycle follow in declaration order.
fn sort_by_dependency<'a>(tables: &[&'a Table]) -> Vec<&'a Table> {
    let names: HashSet<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    let graph: Graph = tables
        .iter()
        .map(|t| {
            let parents = t
                .referenced_tables()
                .into_iter()
                .filter(|p| names.contains(p.as_str()));
            Vertex::with_parents(t.name.clone(), parents)
        })
        .collect();

    let order = graph.topographic_sort();
    let placed: HashSet<&str> = order.iter().map(String::as_str).collect();

    let mut sorted: Vec<&Table> = order
        .iter()
        .filter_map(|name| tables.iter().find(|t| &t.name == name).copied())
        .collect();
    for table in tables {
        if !placed.contains(table.name.as_str()) {
            warn!("Table {} is part of a foreign key cycle", table.name);
            sorted.push(*table);
        }
    }
    sorted
}

/// True if the declared type matches the live type: same base type ignoring
/// case and any inline size (`DECIMAL(10,2)` vs `DECIMAL`). Both sides are
/// expected in the dialect's canonical spelling.
fn is_equivalent_type(target: &Column, existing: &Column) -> bool {
    target.base_type() == existing.base_type()
}

/// Column, foreign key, index and drop changes for a table present on both sides.
fn compare_tables(existing: &Table, target: &Table) -> Vec<Change> {
    let mut results = Vec::new();
    let existing_columns = existing.column_map();
    let mut seen: HashSet<&str> = HashSet::new();

    for column in &target.columns {
        let old = existing_columns.get(column.name.as_str()).copied();
        match old {
            None => results.push(Change::add_column(target, column)),
            Some(old) => {
                seen.insert(old.name.as_str());
                if let Some(change) = compare_column(target, column, old) {
                    results.push(change);
                }
            }
        }

        if let Some(fk) = &column.foreign_key {
            let existing_fk = old.and_then(|c| c.foreign_key.as_ref());
            if !fk.name.is_empty() && existing_fk.map(|e| &e.name) != Some(&fk.name) {
                results.push(Change::add_foreign_key(target, column, "foreign key missing"));
            }
        }
    }

    let existing_indices = existing.index_map();
    for index in &target.indices {
        if !existing_indices.contains_key(index.name.as_str()) {
            results.push(Change::create_index(target, index, "index not present"));
        }
    }

    for column in &existing.columns {
        if !seen.contains(column.name.as_str()) {
            results.push(Change::drop_column(target, column));
        }
    }

    results
}

/// At most one ModifyColumn for a column present on both sides.
///
/// Size and scale only ever grow; a smaller declared size is skipped with a
/// warning so existing data is never truncated.
fn compare_column(table: &Table, column: &Column, old: &Column) -> Option<Change> {
    if !is_equivalent_type(column, old) {
        return Some(Change::modify_column(table, column, old, "data type mismatch"));
    }
    if column.nullable != old.nullable {
        return Some(Change::modify_column(table, column, old, "nullable status"));
    }
    if !column.has_size() {
        return None;
    }
    if column.size != old.size {
        if column.size < old.size {
            warn!(
                "Ignoring size change for {}.{} ({} -> {}) since it might truncate data",
                table.name, column.name, old.size, column.size
            );
            return None;
        }
        return Some(Change::modify_column(table, column, old, "size mismatch"));
    }
    if column.decimal != old.decimal {
        if column.decimal < old.decimal {
            warn!(
                "Ignoring scale change for {}.{} ({} -> {}) since it might truncate data",
                table.name, column.name, old.decimal, column.decimal
            );
            return None;
        }
        return Some(Change::modify_column(table, column, old, "decimal scale mismatch"));
    }
    None
}

/// Triggers to create and to drop.
///
/// Triggers match on (name, table, timing). A matched pair whose definition
/// differs is both dropped and created.
fn compare_triggers(source: &Model, target: &Model) -> (Vec<Trigger>, Vec<Trigger>) {
    let mut creates = Vec::new();
    let mut drops = Vec::new();

    for wanted in &target.triggers {
        match source
            .triggers
            .iter()
            .find(|t| t.identity() == wanted.identity())
        {
            None => creates.push(wanted.clone()),
            Some(live) if !live.same_definition(wanted) => {
                drops.push(live.clone());
                creates.push(wanted.clone());
            }
            Some(_) => {}
        }
    }

    for live in &source.triggers {
        if !target.triggers.iter().any(|t| t.identity() == live.identity()) {
            drops.push(live.clone());
        }
    }

    (creates, drops)
}

fn trigger_table(target: &Model, source: &Model, trigger: &Trigger) -> Table {
    target
        .table(&trigger.table)
        .or_else(|| source.table(&trigger.table))
        .cloned()
        .unwrap_or_else(|| Table::new(trigger.table.clone()))
}

/// Query changes for conditional queries whose existence guards hold against
/// the live schema. SQL conditions are evaluated later by the migrator.
fn conditional_queries(source: &Model, target: &Model) -> Vec<Change> {
    let mut results = Vec::new();

    for query in &target.queries {
        if query.query.trim().is_empty() {
            continue;
        }
        if let Some(table) = &query.table_exists {
            if !source.has_table(table) {
                debug!("Skipping query guarded by missing table {}", table);
                continue;
            }
        }
        let mut guard_table = query.table_exists.clone();
        if let Some(guard) = &query.column_exists {
            let Some((table, column)) = guard.split_once('.') else {
                warn!("Ignoring query with malformed columnExists guard '{}'", guard);
                continue;
            };
            if !source.has_column(table, column) {
                debug!("Skipping query guarded by missing column {}", guard);
                continue;
            }
            guard_table.get_or_insert_with(|| table.to_string());
        }

        let table = guard_table
            .and_then(|name| source.table(&name).cloned())
            .unwrap_or_default();
        let mut change = Change::query(&table, query.query.clone(), "conditional query");
        change.condition = query.condition.clone().filter(|c| !c.trim().is_empty());
        change.post_migrate_only = query.post_migrate_only;
        results.push(change);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::change::ChangeType;
    use crate::core::schema::{ConditionalQuery, ForeignKey, Index};
    use crate::drivers::postgres::{CatalogColumn, PostgresDialect};
    use crate::error::MigrateError;
    use crate::loader::{MemoryResourceLoader, SchemaLoader};

    fn column(name: &str, data_type: &str, size: u32) -> Column {
        let mut c = Column::new(name, data_type);
        c.size = size;
        c
    }

    fn id() -> Column {
        let mut c = Column::new("id", "INTEGER");
        c.primary_key = true;
        c
    }

    fn fk_column(name: &str, fk_name: &str, references: &str) -> Column {
        let mut c = Column::new(name, "INTEGER");
        c.foreign_key = Some(ForeignKey {
            name: fk_name.into(),
            table_name: references.into(),
        });
        c
    }

    fn table(name: &str, columns: Vec<Column>) -> Table {
        Table {
            name: name.into(),
            columns,
            ..Default::default()
        }
    }

    fn model(tables: Vec<Table>) -> Model {
        Model {
            tables,
            ..Default::default()
        }
    }

    fn run(source: &Model, target: &Model) -> Vec<Change> {
        compare(source, target, &[], &PostgresDialect::new()).unwrap()
    }

    fn kinds(changes: &[Change]) -> Vec<(ChangeType, &str)> {
        changes
            .iter()
            .map(|c| (c.change_type, c.table.name.as_str()))
            .collect()
    }

    fn trigger(name: &str, statement: &str) -> Trigger {
        Trigger {
            name: name.into(),
            table: "accounts".into(),
            event: "DELETE".into(),
            timing: "BEFORE".into(),
            statement: statement.into(),
        }
    }

    #[test]
    fn test_new_table_on_empty_database() {
        let target = model(vec![table(
            "widgets",
            vec![id(), column("name", "VARCHAR", 50)],
        )]);
        let changes = run(&Model::default(), &target);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::CreateTable);
        assert_eq!(changes[0].table.name, "widgets");
    }

    #[test]
    fn test_identical_models_produce_no_changes() {
        let mut widgets = table("widgets", vec![id(), column("name", "VARCHAR", 50)]);
        widgets.indices.push(Index {
            name: "ix_name".into(),
            unique: false,
            column_names: vec!["name".into()],
        });
        let mut target = model(vec![widgets]);
        target.triggers.push(trigger("t", "RAISE EXCEPTION 'no'"));
        assert!(run(&target.clone(), &target).is_empty());
    }

    #[test]
    fn test_new_tables_sorted_parents_first_with_deferred_fks() {
        let orders = table("orders", vec![id(), fk_column("customer_id", "fk_orders_customer", "customers")]);
        let mut customers = table("customers", vec![id(), fk_column("parent_id", "fk_parent", "customers")]);
        customers.indices.push(Index {
            name: "ix_parent".into(),
            unique: false,
            column_names: vec!["parent_id".into()],
        });
        let changes = run(&Model::default(), &model(vec![orders, customers]));

        assert_eq!(
            kinds(&changes),
            vec![
                (ChangeType::CreateTable, "customers"),
                (ChangeType::CreateIndex, "customers"),
                (ChangeType::CreateTable, "orders"),
                (ChangeType::AddFk, "customers"),
                (ChangeType::AddFk, "orders"),
            ]
        );
        assert!(changes[3..].iter().all(|c| c.post_migrate_only));
        assert!(changes[..3].iter().all(|c| !c.post_migrate_only));
    }

    #[test]
    fn test_foreign_key_cycle_still_creates_every_table() {
        let a = table("a", vec![id(), fk_column("b_id", "fk_a_b", "b")]);
        let b = table("b", vec![id(), fk_column("a_id", "fk_b_a", "a")]);
        let changes = run(&Model::default(), &model(vec![a, b]));
        let created: Vec<&str> = changes
            .iter()
            .filter(|c| c.change_type == ChangeType::CreateTable)
            .map(|c| c.table.name.as_str())
            .collect();
        assert_eq!(created, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_column_is_added() {
        let source = model(vec![table("widgets", vec![id()])]);
        let target = model(vec![table("widgets", vec![id(), column("name", "VARCHAR", 50)])]);
        let changes = run(&source, &target);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::AddColumn);
        assert_eq!(changes[0].reason, "column not present");
        assert_eq!(changes[0].column_name(), Some("name"));
    }

    #[test]
    fn test_type_mismatch() {
        let source = model(vec![table("t", vec![column("code", "INTEGER", 0)])]);
        let target = model(vec![table("t", vec![column("code", "BIGINT", 0)])]);
        let changes = run(&source, &target);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, "data type mismatch");
        assert_eq!(changes[0].old_column.as_ref().unwrap().data_type, "INTEGER");
    }

    #[test]
    fn test_time_is_not_timestamp() {
        let source = model(vec![table("t", vec![column("at", "TIME", 0)])]);
        let target = model(vec![table("t", vec![column("at", "TIMESTAMP", 0)])]);
        let changes = run(&source, &target);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, "data type mismatch");
    }

    #[test]
    fn test_declared_types_converge_with_catalog_types() {
        // (declared, catalog data_type, character_maximum_length, numeric_precision, numeric_scale)
        let cases: &[(&str, &str, i32, i32, i32)] = &[
            ("INTEGER", "integer", 0, 32, 0),
            ("INT", "integer", 0, 32, 0),
            ("int4", "integer", 0, 32, 0),
            ("BIGINT", "bigint", 0, 64, 0),
            ("INT8", "bigint", 0, 64, 0),
            ("SMALLINT", "smallint", 0, 16, 0),
            ("INT2", "smallint", 0, 16, 0),
            ("BOOLEAN", "boolean", 0, 0, 0),
            ("BOOL", "boolean", 0, 0, 0),
            ("TEXT", "text", 0, 0, 0),
            ("VARCHAR(50)", "character varying", 50, 0, 0),
            ("CHARACTER VARYING(50)", "character varying", 50, 0, 0),
            ("CHAR(2)", "character", 2, 0, 0),
            ("DECIMAL(12, 2)", "numeric", 0, 12, 2),
            ("NUMERIC(12,2)", "numeric", 0, 12, 2),
            ("NUMERIC", "numeric", 0, 0, 0),
            ("REAL", "real", 0, 24, 0),
            ("FLOAT4", "real", 0, 24, 0),
            ("FLOAT(24)", "real", 0, 24, 0),
            ("DOUBLE PRECISION", "double precision", 0, 53, 0),
            ("FLOAT8", "double precision", 0, 53, 0),
            ("FLOAT", "double precision", 0, 53, 0),
            ("DATE", "date", 0, 0, 0),
            ("TIME", "time without time zone", 0, 0, 0),
            ("TIMETZ", "time with time zone", 0, 0, 0),
            ("TIMESTAMP", "timestamp with time zone", 0, 0, 0),
            ("TIMESTAMPTZ", "timestamp with time zone", 0, 0, 0),
            ("UUID", "uuid", 0, 0, 0),
            ("JSON", "json", 0, 0, 0),
            ("JSONB", "jsonb", 0, 0, 0),
            ("BYTEA", "bytea", 0, 0, 0),
            ("BIT", "bit", 1, 0, 0),
            ("CITEXT", "citext", 0, 0, 0),
        ];
        let dialect = PostgresDialect::new();

        let mut document = String::from("tables:\n  - name: t\n    columns:\n");
        for (i, (declared, ..)) in cases.iter().enumerate() {
            document.push_str(&format!("      - name: c{}\n        type: \"{}\"\n", i, declared));
        }
        let resources = MemoryResourceLoader::new().with("t.yaml", document);
        let target = SchemaLoader::new(&resources, &dialect)
            .load(&["t.yaml".to_string()])
            .unwrap();

        let names: Vec<String> = (0..cases.len()).map(|i| format!("c{}", i)).collect();
        let live: Vec<Column> = cases
            .iter()
            .zip(&names)
            .map(|(&(_, catalog, char_length, precision, scale), name)| {
                CatalogColumn {
                    name,
                    data_type: catalog,
                    char_length,
                    precision,
                    scale,
                    nullable: false,
                }
                .to_column(&dialect)
            })
            .collect();
        let source = model(vec![table("t", live)]);

        let drift: Vec<String> = run(&source, &target)
            .iter()
            .map(|change| {
                let index: usize = change.column_name().unwrap()[1..].parse().unwrap();
                let (declared, catalog, ..) = cases[index];
                format!("{} vs {}: {}", declared, catalog, change.reason)
            })
            .collect();
        assert!(drift.is_empty(), "types never converge: {:?}", drift);
    }

    #[test]
    fn test_inline_sized_type_is_equivalent_to_base_type() {
        let mut live = column("lat", "DECIMAL", 10);
        live.decimal = 7;
        let mut declared = column("lat", "decimal(10,7)", 10);
        declared.decimal = 7;
        let source = model(vec![table("places", vec![live])]);
        let target = model(vec![table("places", vec![declared])]);
        assert!(run(&source, &target).is_empty());
    }

    #[test]
    fn test_nullable_change() {
        let source = model(vec![table("t", vec![column("name", "VARCHAR", 50)])]);
        let mut nullable = column("name", "VARCHAR", 50);
        nullable.nullable = true;
        let target = model(vec![table("t", vec![nullable])]);
        let changes = run(&source, &target);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, "nullable status");
    }

    #[test]
    fn test_size_grows_but_never_shrinks() {
        let source = model(vec![table("t", vec![column("name", "VARCHAR", 50)])]);

        let grow = model(vec![table("t", vec![column("name", "VARCHAR", 100)])]);
        let changes = run(&source, &grow);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, "size mismatch");

        let shrink = model(vec![table("t", vec![column("name", "VARCHAR", 20)])]);
        assert!(run(&source, &shrink).is_empty());
    }

    #[test]
    fn test_decimal_scale_grows_but_never_shrinks() {
        let mut live = column("amount", "DECIMAL", 12);
        live.decimal = 2;
        let source = model(vec![table("t", vec![live.clone()])]);

        let mut wider = live.clone();
        wider.decimal = 4;
        let changes = run(&source, &model(vec![table("t", vec![wider])]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, "decimal scale mismatch");

        let mut narrower = live;
        narrower.decimal = 0;
        assert!(run(&source, &model(vec![table("t", vec![narrower])])).is_empty());
    }

    #[test]
    fn test_sizeless_types_ignore_size() {
        let source = model(vec![table("t", vec![column("flag", "BIT", 1), column("body", "TEXT", 0)])]);
        let target = model(vec![table("t", vec![column("flag", "BIT", 0), column("body", "TEXT", 4000)])]);
        assert!(run(&source, &target).is_empty());
    }

    #[test]
    fn test_shrink_still_checks_foreign_key() {
        let source = model(vec![table("t", vec![column("owner_id", "VARCHAR", 36)])]);
        let mut declared = fk_column("owner_id", "fk_t_owner", "users");
        declared.data_type = "VARCHAR".into();
        declared.size = 20;
        let changes = run(&source, &model(vec![table("t", vec![declared])]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::AddFk);
    }

    #[test]
    fn test_missing_foreign_key_on_existing_table_is_not_deferred() {
        let source = model(vec![table("orders", vec![id(), column("customer_id", "INTEGER", 0)])]);
        let target = model(vec![table(
            "orders",
            vec![id(), fk_column("customer_id", "fk_orders_customer", "customers")],
        )]);
        let changes = run(&source, &target);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::AddFk);
        assert_eq!(changes[0].reason, "foreign key missing");
        assert!(!changes[0].post_migrate_only);
    }

    #[test]
    fn test_renamed_foreign_key_is_added() {
        let source = model(vec![table("o", vec![fk_column("c_id", "fk_old", "c")])]);
        let target = model(vec![table("o", vec![fk_column("c_id", "fk_new", "c")])]);
        let changes = run(&source, &target);
        assert_eq!(kinds(&changes), vec![(ChangeType::AddFk, "o")]);
    }

    #[test]
    fn test_new_column_with_foreign_key_adds_both() {
        let source = model(vec![table("o", vec![id()])]);
        let target = model(vec![table("o", vec![id(), fk_column("c_id", "fk_o_c", "c")])]);
        let changes = run(&source, &target);
        assert_eq!(
            changes.iter().map(|c| c.change_type).collect::<Vec<_>>(),
            vec![ChangeType::AddColumn, ChangeType::AddFk]
        );
    }

    #[test]
    fn test_missing_index_is_created() {
        let source = model(vec![table("t", vec![id()])]);
        let mut declared = table("t", vec![id()]);
        declared.indices.push(Index {
            name: "ux_t".into(),
            unique: true,
            column_names: vec!["id".into()],
        });
        let changes = run(&source, &model(vec![declared]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::CreateIndex);
        assert_eq!(changes[0].index.as_ref().unwrap().name, "ux_t");
    }

    #[test]
    fn test_undeclared_column_is_dropped() {
        let source = model(vec![table("t", vec![id(), column("legacy", "TEXT", 0)])]);
        let target = model(vec![table("t", vec![id()])]);
        let changes = run(&source, &target);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::DropColumn);
        assert_eq!(changes[0].column_name(), Some("legacy"));
    }

    #[test]
    fn test_extension_hooks_append_after_table_changes() {
        let source = model(vec![table("t", vec![id()])]);
        let target = model(vec![table("t", vec![id(), column("x", "TEXT", 0)])]);
        let changer: SchemaChanger = Box::new(|_source, target| {
            let t = target.table("t").cloned().unwrap_or_default();
            Ok(vec![Change::query(&t, "ANALYZE t", "hook")])
        });
        let changes = compare(&source, &target, &[changer], &PostgresDialect::new()).unwrap();
        assert_eq!(
            changes.iter().map(|c| c.change_type).collect::<Vec<_>>(),
            vec![ChangeType::AddColumn, ChangeType::Query]
        );
        assert_eq!(changes[1].query.as_deref(), Some("ANALYZE t"));
    }

    #[test]
    fn test_extension_hook_error_aborts() {
        let changer: SchemaChanger =
            Box::new(|_, _| Err(MigrateError::Hook("cannot plan".into())));
        let result = compare(&Model::default(), &Model::default(), &[changer], &PostgresDialect::new());
        assert!(matches!(result, Err(MigrateError::Hook(_))));
    }

    #[test]
    fn test_trigger_drops_precede_creates() {
        let mut source = model(vec![table("accounts", vec![id()])]);
        source.triggers = vec![
            trigger("stale", "RAISE EXCEPTION 'old'"),
            trigger("guard", "RAISE EXCEPTION 'v1'"),
        ];
        let mut target = model(vec![table("accounts", vec![id()])]);
        target.triggers = vec![
            trigger("guard", "RAISE EXCEPTION 'v2'"),
            trigger("fresh", "RAISE EXCEPTION 'new'"),
        ];

        let changes = run(&source, &target);
        let reasons: Vec<&str> = changes.iter().map(|c| c.reason.as_str()).collect();
        assert_eq!(
            reasons,
            vec![
                "drop trigger guard",
                "drop trigger stale",
                "create trigger guard",
                "create trigger fresh",
            ]
        );
        assert!(changes[0].query.as_deref().unwrap().starts_with("DROP TRIGGER"));
        assert!(changes[2].query.as_deref().unwrap().contains("'v2'"));
    }

    #[test]
    fn test_conditional_query_guards() {
        let mut source = model(vec![table("orders", vec![id(), column("legacy_total", "DECIMAL", 12)])]);
        source.tables[0].columns[1].decimal = 2;
        let mut target = source.clone();
        target.queries = vec![
            ConditionalQuery {
                table_exists: Some("orders".into()),
                query: "UPDATE orders SET legacy_total = 0 WHERE legacy_total IS NULL".into(),
                ..Default::default()
            },
            ConditionalQuery {
                table_exists: Some("invoices".into()),
                query: "DELETE FROM invoices".into(),
                ..Default::default()
            },
            ConditionalQuery {
                column_exists: Some("orders.legacy_total".into()),
                condition: Some("SELECT 1 FROM orders LIMIT 1".into()),
                query: "ALTER TABLE orders ALTER COLUMN legacy_total SET DEFAULT 0".into(),
                post_migrate_only: true,
                ..Default::default()
            },
            ConditionalQuery {
                column_exists: Some("orders.missing".into()),
                query: "SELECT 1".into(),
                ..Default::default()
            },
        ];

        let changes = run(&source, &target);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.change_type == ChangeType::Query));
        assert!(changes[0].condition.is_none());
        assert_eq!(changes[0].table.name, "orders");
        assert_eq!(changes[1].condition.as_deref(), Some("SELECT 1 FROM orders LIMIT 1"));
        assert!(changes[1].post_migrate_only);
    }

    #[test]
    fn test_compare_is_deterministic() {
        let target = model(vec![
            table("c", vec![id(), fk_column("a_id", "fk_c_a", "a")]),
            table("b", vec![id()]),
            table("a", vec![id()]),
        ]);
        let first = run(&Model::default(), &target);
        for _ in 0..5 {
            assert_eq!(run(&Model::default(), &target), first);
        }
    }
}
