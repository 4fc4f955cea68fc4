use crate::{config::RunConfig, error::CliError};
use clap::{Parser, Subcommand};
use connectors::sql::{adapter::MySqlAdapter, session::TargetSession};
use engine_core::registry::SchemaRegistry;
use engine_runtime::{executor::Orchestrator, factory::RuntimeFactory};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "sluice", version, about = "Resilient bulk-upsert data synchronization")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run every configured sync task against the target store
    Sync {
        /// Path to the YAML run configuration
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
        /// Flush every statement but commit nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the resolved schema of a target table
    Schema {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
        /// Target table name
        table: String,
    },
}

pub async fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Sync { config, dry_run } => sync(&config, dry_run).await,
        Command::Schema { config, table } => show_schema(&config, &table).await,
    }
}

async fn sync(config_path: &std::path::Path, dry_run: bool) -> Result<(), CliError> {
    let mut config = RunConfig::load(config_path)?;
    if dry_run {
        config.settings.commit = false;
        info!("dry run: statements will be flushed but never committed");
    }
    let target = config.target().clone();
    info!(
        database = %target.database,
        tasks = config.tasks.len(),
        "starting sync run"
    );

    // Reflect whatever the config does not declare, once, before any rows move.
    let mut registry = SchemaRegistry::from_declared(config.schemas.clone());
    let adapter = MySqlAdapter::connect(&target)?;
    let tables: Vec<&str> = config.tasks.iter().map(|t| t.table.as_str()).collect();
    registry.introspect_missing(&adapter, tables).await?;
    adapter.disconnect().await;

    let mut store = TargetSession::open(&target, config.settings.commit).await?;
    let mut factory = RuntimeFactory::new(
        config.settings.clone(),
        config.connections.sources.clone(),
        registry,
    );

    let report = Orchestrator::run(&mut factory, &mut store, &config.tasks).await;
    store.close().await;
    report.log_summary();

    let failed = report.tasks.iter().filter(|t| !t.succeeded()).count();
    if failed > 0 {
        return Err(CliError::TasksFailed(failed));
    }
    Ok(())
}

async fn show_schema(config_path: &std::path::Path, table: &str) -> Result<(), CliError> {
    let config = RunConfig::load(config_path)?;
    let adapter = MySqlAdapter::connect(config.target())?;
    let schema = adapter.introspect(table).await?;
    adapter.disconnect().await;

    println!("{table}");
    for column in &schema.columns {
        let key = if schema.is_key_column(&column.name) {
            " [PK]"
        } else {
            ""
        };
        let null = if column.nullable { "NULL" } else { "NOT NULL" };
        println!("  {} {} {null}{key}", column.name, column.data_type);
    }
    Ok(())
}
