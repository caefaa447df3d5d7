//! Migration workflow coordinator.
//!
//! A run takes the migration lock, loads the target model from the schema
//! files, introspects the live schema, computes the changes and executes them
//! one by one. Execution is fail-fast with no rollback: the first rejected
//! statement ends the run and names the change that failed.

mod render;
mod report;

pub use render::render_change;
pub use report::{MigrationPhase, MigrationReport};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compare::SchemaChanger;
use crate::config::Config;
use crate::core::change::{Change, ChangeType};
use crate::core::schema::Model;
use crate::core::traits::{DdlExecutor, Dialect, MigrationLock, SchemaReader};
use crate::drivers::{dialect_for, postgres, PostgresReader, PostgresWriter};
use crate::error::{MigrateError, Result};
use crate::loader::{ResourceLoader, SchemaLoader};

/// Hook run with (source, target) after every change applied successfully.
pub type PostMigrator = Box<dyn Fn(&Model, &Model) -> Result<()> + Send + Sync>;

/// Interval between attempts to take a held migration lock.
const LOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Live schema, target schema and the changes between them.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub source: Model,
    pub target: Model,
    pub changes: Vec<Change>,
}

/// Migration coordinator.
pub struct Migrator {
    config: Config,
    dialect: Arc<dyn Dialect>,
    reader: Arc<dyn SchemaReader>,
    executor: Arc<dyn DdlExecutor>,
    lock: Arc<dyn MigrationLock>,
    changers: Vec<SchemaChanger>,
    post_migrators: Vec<PostMigrator>,
    cancel: CancellationToken,
}

impl Migrator {
    /// Create a migrator over already-connected database capabilities.
    pub fn new(
        config: Config,
        dialect: Arc<dyn Dialect>,
        reader: Arc<dyn SchemaReader>,
        executor: Arc<dyn DdlExecutor>,
        lock: Arc<dyn MigrationLock>,
    ) -> Self {
        Self {
            config,
            dialect,
            reader,
            executor,
            lock,
            changers: Vec::new(),
            post_migrators: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Connect to the configured database.
    pub async fn connect(config: Config) -> Result<Self> {
        let dialect: Arc<dyn Dialect> = Arc::from(dialect_for(&config.database.r#type)?);

        // the migration lock pins one connection for the whole run
        let max_conns = config.migration.max_connections.max(2);
        let pool = postgres::connect(&config.database, max_conns).await?;

        let writer = Arc::new(PostgresWriter::new(pool.clone()));
        let reader = Arc::new(PostgresReader::new(pool));
        Ok(Self::new(config, dialect, reader, writer.clone(), writer))
    }

    /// Register an extension hook contributing extra changes.
    pub fn with_changer(mut self, changer: SchemaChanger) -> Self {
        self.changers.push(changer);
        self
    }

    /// Register a hook run after a successful migration.
    pub fn with_post_migrator(mut self, hook: PostMigrator) -> Self {
        self.post_migrators.push(hook);
        self
    }

    /// Stop between statements once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Load the schema files into the target model, applying the configured profile.
    pub fn load_target(
        &self,
        resources: &dyn ResourceLoader,
        schema_files: &[String],
    ) -> Result<Model> {
        SchemaLoader::new(resources, self.dialect.as_ref())
            .with_profile(self.config.migration.profile.clone())
            .load(schema_files)
    }

    /// Compute the changes a migration would execute. Takes no lock and issues no DDL.
    ///
    /// Conditional queries whose condition returns no rows are left out.
    pub async fn plan(
        &self,
        resources: &dyn ResourceLoader,
        schema_files: &[String],
    ) -> Result<MigrationPlan> {
        let target = self.load_target(resources, schema_files)?;
        let source = self
            .reader
            .read_current_model(&self.config.database.schema)
            .await?;

        let mut changes = Vec::new();
        for change in crate::compare::compare(&source, &target, &self.changers, self.dialect())? {
            match &change.condition {
                Some(condition) if !self.reader.has_rows(condition).await? => {
                    debug!("Condition returned no rows, skipping: {}", change);
                }
                _ => changes.push(change),
            }
        }

        Ok(MigrationPlan {
            source,
            target,
            changes,
        })
    }

    /// Run one migration phase under the migration lock.
    pub async fn migrate(
        &self,
        resources: &dyn ResourceLoader,
        schema_files: &[String],
        phase: MigrationPhase,
    ) -> Result<MigrationReport> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut report = MigrationReport::start(run_id, phase);
        let key = &self.config.migration.lock_key;

        info!("Starting {} migration run: {}", phase, report.run_id);

        if !self.acquire_lock().await? {
            if self.config.migration.skip_if_locked {
                warn!("Migration lock '{}' is held elsewhere, skipping run", key);
                report.skipped_locked = true;
                return Ok(report.finish());
            }
            return Err(MigrateError::LockTimeout {
                key: key.clone(),
                seconds: self.config.migration.lock_timeout_secs,
            });
        }

        let result = self
            .run_locked(resources, schema_files, phase, &mut report)
            .await;
        let unlocked = self.lock.unlock(key).await;

        match (result, unlocked) {
            (Err(e), Err(unlock_err)) => {
                warn!("Failed to release migration lock '{}': {}", key, unlock_err);
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => {
                let report = report.finish();
                info!(
                    "Migration run {} complete: {} applied, {} deferred in {:.2}s",
                    report.run_id,
                    report.changes_applied,
                    report.changes_deferred,
                    report.duration_seconds
                );
                Ok(report)
            }
        }
    }

    /// Poll the lock until it is taken or the configured timeout passes.
    async fn acquire_lock(&self) -> Result<bool> {
        let key = &self.config.migration.lock_key;
        let deadline =
            Instant::now() + Duration::from_secs(self.config.migration.lock_timeout_secs);

        loop {
            if self.lock.try_lock(key).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            debug!("Migration lock '{}' is held, waiting", key);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(MigrateError::Cancelled),
                _ = sleep(LOCK_POLL_INTERVAL) => {}
            }
        }
    }

    async fn run_locked(
        &self,
        resources: &dyn ResourceLoader,
        schema_files: &[String],
        phase: MigrationPhase,
        report: &mut MigrationReport,
    ) -> Result<()> {
        if self.config.migration.create_schema {
            self.executor
                .create_schema(&self.config.database.schema)
                .await?;
        }

        let plan = self.plan(resources, schema_files).await?;
        let (selected, deferred): (Vec<&Change>, Vec<&Change>) =
            plan.changes.iter().partition(|c| phase.includes(c));

        report.changes_planned = plan.changes.len();
        report.changes_deferred = deferred.len();
        info!(
            "Planned {} change(s), {} selected for the {} phase",
            plan.changes.len(),
            selected.len(),
            phase
        );

        // refuse the whole plan before any DDL is issued
        if let Some(drop) = selected
            .iter()
            .find(|c| c.change_type == ChangeType::DropColumn)
        {
            return Err(MigrateError::DestructiveChange {
                table: drop.table.name.clone(),
                column: drop.column_name().unwrap_or_default().to_string(),
            });
        }

        for change in selected {
            if self.cancel.is_cancelled() {
                warn!("Cancellation requested, stopping before {}", change);
                return Err(MigrateError::Cancelled);
            }

            let sql = render_change(self.dialect(), change)?;
            info!("{}: {}", change, sql);
            self.executor
                .execute(&sql)
                .await
                .map_err(|e| MigrateError::execution(change, e))?;

            report.statements.push(sql);
            report.changes_applied += 1;
        }

        for hook in &self.post_migrators {
            hook(&plan.source, &plan.target)?;
        }

        Ok(())
    }
}

/// Apply the changes that are safe before new application code rolls out.
pub async fn pre_migrate(
    resources: &dyn ResourceLoader,
    config: &Config,
    schema_files: &[String],
) -> Result<MigrationReport> {
    Migrator::connect(config.clone())
        .await?
        .migrate(resources, schema_files, MigrationPhase::Pre)
        .await
}

/// Apply every outstanding change, deferred foreign keys included.
pub async fn post_migrate(
    resources: &dyn ResourceLoader,
    config: &Config,
    schema_files: &[String],
) -> Result<MigrationReport> {
    Migrator::connect(config.clone())
        .await?
        .migrate(resources, schema_files, MigrationPhase::Post)
        .await
}

/// Changes needed to bring the configured database in line with the schema files.
pub async fn compare(
    resources: &dyn ResourceLoader,
    config: &Config,
    schema_files: &[String],
    changers: Vec<SchemaChanger>,
) -> Result<Vec<Change>> {
    let migrator = changers.into_iter().fold(
        Migrator::connect(config.clone()).await?,
        Migrator::with_changer,
    );
    Ok(migrator.plan(resources, schema_files).await?.changes)
}
