//! PostgreSQL driver.
//!
//! This module provides PostgreSQL-specific implementations:
//!
//! - [`PostgresDialect`]: DDL rendering and type translation
//! - [`PostgresReader`]: catalog introspection into a schema model
//! - [`PostgresWriter`]: DDL execution and the advisory migration lock
//!
//! Reader and writer share one pool created by [`connect`].

mod dialect;
mod reader;
mod writer;

pub use dialect::PostgresDialect;
pub use reader::PostgresReader;
#[cfg(test)]
pub(crate) use reader::CatalogColumn;
pub use writer::PostgresWriter;

use std::time::{Duration, Instant};

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::Config as PgConfig;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::drivers::common::TlsBuilder;
use crate::error::{MigrateError, Result};

/// Connection timeout for new pool connections.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a connection pool whose sessions resolve unqualified names in the
/// configured schema, and verify it with a test query.
pub async fn connect(config: &DatabaseConfig, max_conns: usize) -> Result<Pool> {
    let mut pg_config = PgConfig::new();
    pg_config.host(&config.host);
    pg_config.port(config.port);
    pg_config.dbname(&config.database);
    pg_config.user(&config.user);
    pg_config.password(&config.password);
    pg_config.application_name("schematron");
    pg_config.options(&format!(
        "-c search_path={}",
        config.schema.replace('\\', "\\\\").replace(' ', "\\ ")
    ));

    // Connection options for reliability
    pg_config.keepalives(true);
    pg_config.keepalives_idle(Duration::from_secs(30));
    pg_config.connect_timeout(CONNECT_TIMEOUT);

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let pool = match TlsBuilder::parse(&config.ssl_mode)?.build()? {
        None => {
            warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
            let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
            Pool::builder(mgr)
                .max_size(max_conns)
                .build()
                .map_err(|e| MigrateError::pool(e, "creating PostgreSQL pool"))?
        }
        Some(tls_connector) => {
            let mgr = Manager::from_config(pg_config, tls_connector, mgr_config);
            Pool::builder(mgr)
                .max_size(max_conns)
                .build()
                .map_err(|e| MigrateError::pool(e, "creating PostgreSQL pool"))?
        }
    };

    // Test connection
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::pool(e, "testing PostgreSQL connection"))?;
    client.simple_query("SELECT 1").await?;

    info!(
        "Connected to PostgreSQL: {}:{}/{} (schema '{}')",
        config.host, config.port, config.database, config.schema
    );

    Ok(pool)
}

/// Round-trip latency of a trivial query, in milliseconds.
pub async fn ping(pool: &Pool) -> Result<u64> {
    let start = Instant::now();
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::pool(e, "getting connection for health check"))?;
    client.simple_query("SELECT 1").await?;
    Ok(start.elapsed().as_millis() as u64)
}
