//! Schema file loading.
//!
//! Builds the target [`Model`] from one or more schema documents:
//!
//! 1. Each file is read through a [`ResourceLoader`] and parsed (`.json` as
//!    JSON, anything else as YAML).
//! 2. Tables are validated and sanitized: type aliases are normalized by the
//!    dialect and inline sizes such as `DECIMAL(10,7)` are split into
//!    `size`/`decimal`.
//! 3. Tables with `cloneNames` are expanded into one copy per clone.
//! 4. Fragments are concatenated in file order.
//! 5. The selected profile is applied (soft-delete enforcement triggers).

mod resource;

pub use resource::{FileResourceLoader, MemoryResourceLoader, ResourceLoader, ENV_RESOURCE_PATH};

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::core::schema::{Model, Table, Trigger};
use crate::core::traits::Dialect;
use crate::error::{MigrateError, Result};

static INSIDE_PARENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^()]*)\)").expect("valid regex"));

/// Message raised by soft-delete enforcement triggers.
const SOFT_DELETE_MESSAGE: &str = "DELETE not allowed";

/// Loads schema files into a target model.
pub struct SchemaLoader<'a> {
    resources: &'a dyn ResourceLoader,
    dialect: &'a dyn Dialect,
    profile: Option<String>,
}

impl<'a> SchemaLoader<'a> {
    pub fn new(resources: &'a dyn ResourceLoader, dialect: &'a dyn Dialect) -> Self {
        Self {
            resources,
            dialect,
            profile: None,
        }
    }

    /// Select the profile applied after loading.
    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile.filter(|p| !p.is_empty());
        self
    }

    /// Load and merge every schema file, in order.
    pub fn load(&self, schema_files: &[String]) -> Result<Model> {
        let mut model = Model::default();
        let mut seen: HashSet<String> = HashSet::new();

        for file in schema_files {
            let fragment = self.load_file(file)?;
            for table in &fragment.tables {
                if !seen.insert(table.name.clone()) {
                    return Err(MigrateError::Load(format!(
                        "table '{}' is declared more than once (in {} or an earlier file)",
                        table.name, file
                    )));
                }
            }
            model.tables.extend(fragment.tables);
            model.triggers.extend(fragment.triggers);
            model.queries.extend(fragment.queries);
            model.profiles.extend(fragment.profiles);
        }

        info!(
            "Loaded {} tables from {} schema file(s)",
            model.tables.len(),
            schema_files.len()
        );

        if let Some(profile) = &self.profile {
            apply_profile(&mut model, profile, self.dialect);
        }

        Ok(model)
    }

    /// Load a single schema file: parse, validate, sanitize and expand clones.
    ///
    /// Profiles are not applied here; see [`SchemaLoader::load`].
    pub fn load_file(&self, file: &str) -> Result<Model> {
        let content = self.resources.string(file)?;
        let mut document = parse_document(file, &content)?;
        debug!("Tables in schema file {}: {}", file, document.tables.len());

        if document.tables.iter().any(|t| t.name.trim().is_empty()) {
            return Err(MigrateError::Load(format!(
                "schema file {} declares a table with an empty name",
                file
            )));
        }

        let mut tables = Vec::with_capacity(document.tables.len());
        for table in document.tables.drain(..) {
            let table = sanitize_table(table, self.dialect);
            let clones = expand_clones(&table);
            tables.push(table);
            tables.extend(clones);
        }
        document.tables = tables;

        Ok(document)
    }
}

fn parse_document(file: &str, content: &str) -> Result<Model> {
    if file.to_lowercase().ends_with(".json") {
        Ok(serde_json::from_str(content)?)
    } else {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Normalize column declarations.
///
/// Types are rewritten to the dialect's canonical spelling. A type with an inline size like `DECIMAL(10, 7)` sets `size` from the first
/// token and `decimal` from the second. Primary key columns are never nullable.
fn sanitize_table(mut table: Table, dialect: &dyn Dialect) -> Table {
    for column in &mut table.columns {
        column.data_type = dialect.normalize_type(&column.data_type);
        if column.data_type.contains('(') {
            if let Some(caps) = INSIDE_PARENS.captures(&column.data_type) {
                let tokens: Vec<&str> = caps[1].split(',').map(str::trim).collect();

                match tokens[0].parse::<u32>() {
                    Ok(size) => column.size = size,
                    Err(e) => warn!(
                        "error parsing size token '{}' of {}.{}: {}",
                        tokens[0], table.name, column.name, e
                    ),
                }
                if let Some(token) = tokens.get(1) {
                    match token.parse::<u32>() {
                        Ok(decimal) => column.decimal = decimal,
                        Err(e) => warn!(
                            "error parsing decimal precision token '{}' of {}.{}: {}",
                            token, table.name, column.name, e
                        ),
                    }
                }
                if tokens.len() > 2 {
                    warn!(
                        "data type {} of {}.{} has more than two size tokens; extras ignored",
                        column.data_type, table.name, column.name
                    );
                }
            }
        }
        if column.primary_key {
            column.nullable = false;
        }
    }
    table
}

/// One copy of `table` per clone name.
///
/// Foreign key names get the clone's name appended so constraint names stay
/// unique, and foreign keys pointing at the original table point at the clone.
fn expand_clones(table: &Table) -> Vec<Table> {
    table
        .clone_name_list()
        .into_iter()
        .map(|clone_name| {
            let mut clone = table.clone();
            clone.clone_names = String::new();
            clone.name = clone_name.to_string();
            for column in &mut clone.columns {
                if let Some(fk) = column.foreign_key.as_mut() {
                    if fk.name.is_empty() {
                        continue;
                    }
                    fk.name = format!("{}_{}", fk.name, clone_name);
                    if fk.table_name == table.name {
                        fk.table_name = clone_name.to_string();
                    }
                }
            }
            clone
        })
        .collect()
}

/// Apply a named profile to the merged model.
fn apply_profile(model: &mut Model, profile: &str, dialect: &dyn Dialect) {
    let Some(options) = model.profiles.get(profile).cloned() else {
        warn!("Unrecognized schema profile: {}", profile);
        return;
    };

    info!("Using schema profile: {}", profile);

    if options.enforce_soft_deletes {
        let statement = dialect.reject_statement(SOFT_DELETE_MESSAGE);
        let triggers: Vec<Trigger> = model
            .tables
            .iter()
            .filter(|t| t.enforces_soft_delete())
            .map(|t| Trigger {
                name: format!("{}_enforce_soft_delete", t.name),
                table: t.name.clone(),
                event: "DELETE".to_string(),
                timing: "BEFORE".to_string(),
                statement: statement.clone(),
            })
            .collect();
        debug!("Profile {} adds {} soft-delete trigger(s)", profile, triggers.len());
        model.triggers.extend(triggers);
    }
}
