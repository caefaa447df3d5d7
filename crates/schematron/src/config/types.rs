//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database holding the schema to reconcile (PostgreSQL).
    pub database: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Database connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database type (always "postgres" for now).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Schema (namespace) to reconcile (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Base directory schema files are read from. Falls back to the
    /// `SCHEMATRON_RESOURCE_PATH` environment variable when unset.
    #[serde(default)]
    pub resource_path: Option<String>,

    /// Schema files, relative to `resource_path`, in load order.
    #[serde(default)]
    pub schema_files: Vec<String>,

    /// Named profile to apply after loading (e.g. "production").
    #[serde(default)]
    pub profile: Option<String>,

    /// Issue `CREATE SCHEMA IF NOT EXISTS` before introspecting (default: true).
    #[serde(default = "default_true")]
    pub create_schema: bool,

    /// Advisory lock key serializing concurrent migrators.
    #[serde(default = "default_lock_key")]
    pub lock_key: String,

    /// Seconds to wait for the advisory lock (default: 300).
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Return without migrating when another instance holds the lock.
    #[serde(default)]
    pub skip_if_locked: bool,

    /// Connection pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            resource_path: None,
            schema_files: Vec::new(),
            profile: None,
            create_schema: default_true(),
            lock_key: default_lock_key(),
            lock_timeout_secs: default_lock_timeout_secs(),
            skip_if_locked: false,
            max_connections: default_max_connections(),
        }
    }
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_true() -> bool {
    true
}

fn default_lock_key() -> String {
    "lock:schematron".to_string()
}

fn default_lock_timeout_secs() -> u64 {
    300
}

fn default_max_connections() -> usize {
    4
}
