//! schematron CLI - declarative schema migration for PostgreSQL.

use clap::{Parser, Subcommand, ValueEnum};
use schematron::drivers::{dialect_for, postgres};
use schematron::{
    render_change, Config, FileResourceLoader, MigrateError, MigrationPhase, MigrationReport,
    Migrator, SchemaLoader,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "schematron")]
#[command(about = "Declarative schema migration for PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Schema file to load instead of migration.schema_files (repeatable)
    #[arg(long = "schema-file")]
    schema_files: Vec<String>,

    /// Override the schema profile
    #[arg(long)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply schema changes
    Migrate {
        /// Which changes to apply
        #[arg(long, value_enum, default_value_t = Phase::Full)]
        phase: Phase,
    },

    /// Apply changes that are safe before an application rollout
    PreMigrate,

    /// Apply every outstanding change, deferred foreign keys included
    PostMigrate,

    /// List pending changes without applying them
    Compare {
        /// Exit with an error if any change is pending
        #[arg(long)]
        fail_on_drift: bool,
    },

    /// Print the DDL a migration would execute
    Plan,

    /// Test database connections
    HealthCheck,
}

#[derive(Clone, Copy, ValueEnum)]
enum Phase {
    Pre,
    Post,
    Full,
}

impl From<Phase> for MigrationPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Pre => MigrationPhase::Pre,
            Phase::Post => MigrationPhase::Post,
            Phase::Full => MigrationPhase::Full,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    if cli.profile.is_some() {
        config.migration.profile = cli.profile.clone();
    }
    let schema_files = if cli.schema_files.is_empty() {
        config.migration.schema_files.clone()
    } else {
        cli.schema_files.clone()
    };
    let resources = resource_loader(&cli.config, &config);

    if let Commands::HealthCheck = cli.command {
        return health_check(&config, cli.output_json).await;
    }

    // Schema files are validated before any database contact
    if schema_files.is_empty() {
        return Err(MigrateError::Config(
            "No schema files: set migration.schema_files or pass --schema-file".to_string(),
        ));
    }
    let dialect = dialect_for(&config.database.r#type)?;
    SchemaLoader::new(&resources, dialect.as_ref())
        .with_profile(config.migration.profile.clone())
        .load(&schema_files)?;

    let cancel_token = setup_signal_handler().await?;
    let migrator = Migrator::connect(config).await?.with_cancel(cancel_token);

    match cli.command {
        Commands::HealthCheck => unreachable!(), // Handled above
        Commands::Migrate { phase } => {
            let report = migrator
                .migrate(&resources, &schema_files, phase.into())
                .await?;
            print_report(&report, cli.output_json)?;
        }
        Commands::PreMigrate => {
            let report = migrator
                .migrate(&resources, &schema_files, MigrationPhase::Pre)
                .await?;
            print_report(&report, cli.output_json)?;
        }
        Commands::PostMigrate => {
            let report = migrator
                .migrate(&resources, &schema_files, MigrationPhase::Post)
                .await?;
            print_report(&report, cli.output_json)?;
        }
        Commands::Compare { fail_on_drift } => {
            let plan = migrator.plan(&resources, &schema_files).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan.changes)?);
            } else if plan.changes.is_empty() {
                println!("Schema is up to date");
            } else {
                println!("Pending changes ({}):", plan.changes.len());
                for change in &plan.changes {
                    let deferred = if change.post_migrate_only { " [post]" } else { "" };
                    println!("  {}{}", change, deferred);
                }
            }

            if fail_on_drift && !plan.changes.is_empty() {
                return Err(MigrateError::DriftDetected(plan.changes.len()));
            }
        }
        Commands::Plan => {
            let plan = migrator.plan(&resources, &schema_files).await?;
            let statements = plan
                .changes
                .iter()
                .map(|change| render_change(migrator.dialect(), change))
                .collect::<Result<Vec<_>, _>>()?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&statements)?);
            } else {
                for (change, sql) in plan.changes.iter().zip(&statements) {
                    println!("-- {}", change);
                    println!("{};\n", sql);
                }
            }
        }
    }

    Ok(())
}

/// Schema files resolve against `migration.resource_path`, relative paths
/// against the config file's directory. Without one the loader falls back to
/// `SCHEMATRON_RESOURCE_PATH`.
fn resource_loader(config_path: &Path, config: &Config) -> FileResourceLoader {
    match &config.migration.resource_path {
        Some(path) => {
            let path = Path::new(path);
            if path.is_absolute() {
                FileResourceLoader::new(path)
            } else {
                let base = config_path.parent().unwrap_or_else(|| Path::new(""));
                FileResourceLoader::new(base.join(path))
            }
        }
        None => FileResourceLoader::from_env(),
    }
}

fn print_report(report: &MigrationReport, output_json: bool) -> Result<(), MigrateError> {
    if output_json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    if report.skipped_locked {
        println!("\nMigration skipped: lock held by another instance");
        return Ok(());
    }

    println!("\nMigration completed!");
    println!("  Run ID: {}", report.run_id);
    println!("  Phase: {}", report.phase);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!(
        "  Changes: {}/{} applied",
        report.changes_applied, report.changes_planned
    );
    if report.changes_deferred > 0 {
        println!("  Deferred to post-migrate: {}", report.changes_deferred);
    }
    Ok(())
}

async fn health_check(config: &Config, output_json: bool) -> Result<(), MigrateError> {
    let result = match postgres::connect(&config.database, 1).await {
        Ok(pool) => postgres::ping(&pool).await,
        Err(e) => Err(e),
    };

    if output_json {
        let json = match &result {
            Ok(latency) => serde_json::json!({ "connected": true, "latency_ms": latency }),
            Err(e) => serde_json::json!({ "connected": false, "error": e.to_string() }),
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("Health Check Results:");
        match &result {
            Ok(latency) => println!(
                "  PostgreSQL {}:{}/{}: OK ({}ms)",
                config.database.host, config.database.port, config.database.database, latency
            ),
            Err(e) => {
                println!(
                    "  PostgreSQL {}:{}/{}: FAILED",
                    config.database.host, config.database.port, config.database.database
                );
                println!("    Error: {}", e);
            }
        }
    }

    result.map(|_| ())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries reports and JSON output
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM. The running migration stops
/// before its next statement.
#[cfg(unix)]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Stopping after the current statement...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
async fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current statement...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
