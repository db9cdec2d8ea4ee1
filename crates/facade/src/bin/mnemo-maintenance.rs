//! CLI entry point for the maintenance sweep: row-count checks, the full
//! 8-phase garbage-collection pass (optionally dry-run), and schema
//! migration management. A thin wrapper over `Facade` — all the actual
//! logic lives there.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mnemo_facade::credential_rotator::CredentialRotator;
use mnemo_facade::Facade;
use sa_domain::collaborators::LLMClient;
use sa_domain::config::{Config, ConfigSeverity};

/// Periodic maintenance for a memory store: row sanitation, summarization,
/// dedup, decay, and graph cleanup.
#[derive(Debug, Parser)]
#[command(name = "mnemo-maintenance", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report row counts for every managed table and the graph's size,
    /// without changing anything.
    Check,
    /// Run the full 8-phase maintenance sweep.
    Full {
        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Schema migration management.
    #[command(subcommand)]
    Migrations(MigrationsCommand),
}

#[derive(Debug, Subcommand)]
enum MigrationsCommand {
    /// Print the current schema version and whether migrations are pending.
    Status,
    /// List every known migration and whether it has been applied.
    List,
    /// Apply any pending migrations.
    Apply {
        /// Report what would be applied without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::from_env();

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let ok = match cli.command {
        Command::Check => run_check(config)?,
        Command::Full { dry_run } => run_full(config, dry_run).await?,
        Command::Migrations(MigrationsCommand::Status) => migrations_status(config)?,
        Command::Migrations(MigrationsCommand::List) => migrations_list(config)?,
        Command::Migrations(MigrationsCommand::Apply { dry_run }) => {
            migrations_apply(config, dry_run)?
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mnemo_facade=debug")),
        )
        .json()
        .init();
}

fn run_check(config: Config) -> anyhow::Result<bool> {
    let facade = Facade::open(config)?;
    let report = facade.run_maintenance_check()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(true)
}

async fn run_full(config: Config, dry_run: bool) -> anyhow::Result<bool> {
    let facade = Facade::open(config.clone())?;

    let rotator = build_rotator(&config);
    let report = facade.run_maintenance(dry_run, rotator.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.ok() {
        for error in &report.errors {
            tracing::error!(phase = %error.phase, error = %error.error, "maintenance phase failed");
        }
    }
    facade.close(false);
    Ok(report.ok())
}

/// Build a credential-rotation pool from `MNEMO_LLM_API_KEYS` (a
/// comma-separated list). Returns `None` when unset, in which case the
/// `summarize` phase of `full` is a no-op.
fn build_rotator(_config: &Config) -> Option<CredentialRotator> {
    let keys = std::env::var("MNEMO_LLM_API_KEYS").ok()?;
    let clients: Vec<Arc<dyn LLMClient>> = keys
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|key| -> Arc<dyn LLMClient> { Arc::new(NoopLlm { _key: key.to_string() }) })
        .collect();
    if clients.is_empty() {
        return None;
    }
    CredentialRotator::new(clients).ok()
}

/// Placeholder collaborator until a concrete provider is wired in by the
/// embedding application; `mnemo-maintenance` only needs a working rotator
/// shape to exercise the `summarize` phase end to end.
struct NoopLlm {
    _key: String,
}

#[async_trait::async_trait]
impl LLMClient for NoopLlm {
    async fn generate(
        &self,
        _prompt: &str,
        _opts: sa_domain::collaborators::GenerateOptions,
    ) -> sa_domain::error::Result<String> {
        Err(sa_domain::error::MemoryError::new(
            sa_domain::error::ErrorKind::ProviderError,
            "no LLM provider configured (set MNEMO_LLM_API_KEYS to a real provider binding)",
        ))
    }
}

fn migrations_status(config: Config) -> anyhow::Result<bool> {
    let facade = Facade::open(config)?;
    let status = facade.migrations_status()?;
    println!(
        "schema version {} of {} ({} pending)",
        status.current_version,
        status.latest_version,
        status.pending.len()
    );
    Ok(true)
}

fn migrations_list(config: Config) -> anyhow::Result<bool> {
    let facade = Facade::open(config)?;
    let status = facade.migrations_status()?;
    for filename in &status.applied {
        println!("{filename:<20} applied");
    }
    for filename in &status.pending {
        println!("{filename:<20} pending");
    }
    Ok(true)
}

fn migrations_apply(config: Config, dry_run: bool) -> anyhow::Result<bool> {
    let facade = Facade::open(config)?;
    let status = facade.migrations_status()?;
    if status.current_version >= status.latest_version {
        println!("schema already at version {}", status.current_version);
        return Ok(true);
    }
    if dry_run {
        println!(
            "would migrate from version {} to {}",
            status.current_version, status.latest_version
        );
        return Ok(true);
    }
    facade.apply_migrations()?;
    println!("migrated to version {}", status.latest_version);
    Ok(true)
}
