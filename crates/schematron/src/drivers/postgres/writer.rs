//! PostgreSQL DDL writer.
//!
//! Executes DDL through the shared pool and implements the migration lock as a
//! session-level advisory lock. The lock lives on one pooled connection that is
//! held for as long as the lock is held.

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::dialect::PostgresDialect;
use crate::core::traits::{DdlExecutor, Dialect, MigrationLock};
use crate::error::{MigrateError, Result};

/// Advisory lock key and the session holding it.
struct HeldLock {
    key: String,
    client: Object,
}

/// What a `try_lock` call means while this writer already holds `held`.
#[derive(Debug, PartialEq, Eq)]
enum Reentry {
    /// Nothing held: ask the server.
    Acquire,
    /// Same key: already ours.
    Held,
    /// Another key: one lock per writer.
    Busy,
}

fn reentry(held: Option<&str>, key: &str) -> Reentry {
    match held {
        None => Reentry::Acquire,
        Some(held) if held == key => Reentry::Held,
        Some(_) => Reentry::Busy,
    }
}

/// PostgreSQL DDL writer implementation.
pub struct PostgresWriter {
    pool: Pool,
    dialect: PostgresDialect,
    lock: Mutex<Option<HeldLock>>,
}

impl PostgresWriter {
    /// Create a writer on an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            dialect: PostgresDialect::new(),
            lock: Mutex::new(None),
        }
    }

    async fn client(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, format!("getting connection for {}", context)))
    }
}

#[async_trait]
impl DdlExecutor for PostgresWriter {
    async fn create_schema(&self, schema: &str) -> Result<()> {
        let client = self.client("create_schema").await?;

        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            self.dialect.quote_ident(schema)
        );
        client.batch_execute(&sql).await?;

        debug!("Ensured schema '{}' exists", schema);
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let client = self.client("execute").await?;
        // simple query protocol: trigger DDL carries several statements
        client.batch_execute(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl MigrationLock for PostgresWriter {
    async fn try_lock(&self, key: &str) -> Result<bool> {
        let mut held = self.lock.lock().await;
        match reentry(held.as_ref().map(|h| h.key.as_str()), key) {
            Reentry::Held => return Ok(true),
            Reentry::Busy => {
                warn!(
                    "Cannot take migration lock '{}' while holding another lock",
                    key
                );
                return Ok(false);
            }
            Reentry::Acquire => {}
        }

        let client = self.client("try_lock").await?;
        let row = client
            .query_one("SELECT pg_try_advisory_lock(hashtext($1))", &[&key])
            .await?;
        let acquired: bool = row.get(0);
        if acquired {
            info!("Acquired migration lock '{}'", key);
            *held = Some(HeldLock {
                key: key.to_string(),
                client,
            });
        }
        Ok(acquired)
    }

    async fn unlock(&self, key: &str) -> Result<()> {
        let mut held = self.lock.lock().await;
        if reentry(held.as_ref().map(|h| h.key.as_str()), key) != Reentry::Held {
            debug!("Migration lock '{}' is not held; nothing to release", key);
            return Ok(());
        }
        if let Some(lock) = held.take() {
            lock.client
                .query_one("SELECT pg_advisory_unlock(hashtext($1))", &[&key])
                .await?;
            info!("Released migration lock '{}'", key);
        }
        Ok(())
    }
}
