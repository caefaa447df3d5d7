//! Error types for the schema migration library.

use thiserror::Error;

/// Main error type for schema migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema document failed validation (empty table name, duplicate table, etc.)
    #[error("Schema validation error: {0}")]
    Load(String),

    /// Schema resource could not be read
    #[error("Failed to read schema resource {path}: {source}")]
    Resource {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Live catalog data does not fit the schema model
    #[error("Schema introspection failed: {0}")]
    Introspection(String),

    /// A column exists in the database but not in the schema files
    #[error("Destructive changes are not allowed. Drop column: {table}.{column} manually")]
    DestructiveChange { table: String, column: String },

    /// A DDL statement was rejected by the database
    #[error("Failed to apply {change}: {message}")]
    Execution { change: String, message: String },

    /// Extension or post-migration hook failed
    #[error("Hook failed: {0}")]
    Hook(String),

    /// Another instance holds the migration lock
    #[error("Could not acquire migration lock '{key}' within {seconds}s")]
    LockTimeout { key: String, seconds: u64 },

    /// Compare found pending changes and drift is treated as failure
    #[error("Schema drift detected: {0} pending change(s)")]
    DriftDetected(usize),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an Execution error naming the failed change
    pub fn execution(change: impl ToString, message: impl ToString) -> Self {
        MigrateError::Execution {
            change: change.to_string(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error, used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::Load(_)
            | MigrateError::Yaml(_)
            | MigrateError::Json(_) => 1,
            MigrateError::Database(_)
            | MigrateError::Pool { .. }
            | MigrateError::Introspection(_) => 2,
            MigrateError::Execution { .. } => 3,
            MigrateError::DestructiveChange { .. } => 4,
            MigrateError::LockTimeout { .. } => 5,
            MigrateError::Hook(_) => 6,
            MigrateError::Io(_) | MigrateError::Resource { .. } => 7,
            MigrateError::DriftDetected(_) => 8,
            MigrateError::Cancelled => 130,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for schema migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
