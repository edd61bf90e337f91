use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use common::config::Configuration;
use rotator::{
    MySqlPartitionStore, RotationMetrics, RotationService, RotatorError, TableRotator,
    TickOutcome, rotators_from_config, run_once,
};

#[derive(Parser, Debug)]
#[command(name = "partkeeper")]
#[command(about = "Keeps range-partitioned tables inside a rolling time window")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Common(CommonCommands),

    /// Read every table and print the plan without applying it
    Plan {
        /// Only plan this table (schema.name)
        #[arg(long)]
        table: Option<String>,

        /// Plan as of this timestamp, in the table's time unit
        #[arg(long)]
        now: Option<i64>,

        /// Include every missing partition back to the retention floor
        #[arg(long)]
        backfill: bool,
    },

    /// Run a single reconciliation pass for every table and exit
    Once {
        /// Include every missing partition back to the retention floor
        #[arg(long)]
        backfill: bool,
    },
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => log::info!("Received SIGINT"),
            _ = sigterm.recv() => log::info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        log::info!("Received Ctrl+C");
    }

    Ok(())
}

async fn build_rotators(
    config: &Configuration,
    metrics: &RotationMetrics,
) -> Result<Vec<TableRotator>> {
    let store = MySqlPartitionStore::connect(&config.database.dsn)
        .await
        .map_err(RotatorError::Connect)
        .context("Failed to initialize partition store")?;

    rotators_from_config(config, Arc::new(store), metrics).context("Failed to set up rotation")
}

async fn run_service(config: &Configuration) -> Result<()> {
    if !config.rotator.enabled {
        log::info!("Rotation is disabled in configuration, nothing to do");
        return Ok(());
    }

    if config.rotator.tables.is_empty() {
        log::warn!("No tables configured for rotation");
    }

    let metrics = RotationMetrics::new();
    let rotators = build_rotators(config, &metrics).await?;

    log::info!(
        "Starting partkeeper: {} table(s), tick interval {:?}, dry_run={}",
        rotators.len(),
        config.rotator.tick_interval,
        config.rotator.dry_run
    );

    let service = RotationService::spawn(rotators, config.rotator.tick_interval, metrics);

    wait_for_shutdown_signal().await?;

    log::info!("Received shutdown signal, stopping rotation");

    let metrics = service.metrics().clone();
    service.shutdown().await;
    metrics.summary().log();

    log::info!("Partkeeper stopped");

    Ok(())
}

async fn run_plan(
    config: &Configuration,
    table: Option<&str>,
    now: Option<i64>,
    backfill: bool,
) -> Result<()> {
    let metrics = RotationMetrics::new();
    let mut rotators = build_rotators(config, &metrics).await?;

    if let Some(wanted) = table {
        rotators.retain(|r| r.table().to_string() == wanted);
        if rotators.is_empty() {
            bail!("Table {wanted} is not configured");
        }
    }

    for rotator in &mut rotators {
        let now = now.unwrap_or_else(|| rotator.now());
        let plan = rotator
            .plan(now, backfill)
            .await
            .with_context(|| format!("Failed to plan {}", rotator.table()))?;

        println!(
            "{} (now={now}, window={}..={}, retention_floor={})",
            rotator.table(),
            plan.window_start,
            plan.window_end,
            plan.retention_floor
        );
        if plan.is_empty() {
            println!("  up to date");
        }
        for partition in &plan.to_create {
            println!(
                "  create p{} < {}",
                partition.sequence, partition.boundary
            );
        }
        for sequence in &plan.to_delete {
            println!("  drop p{sequence}");
        }
    }

    Ok(())
}

async fn run_single_pass(config: &Configuration, backfill: bool) -> Result<()> {
    let metrics = RotationMetrics::new();
    let mut rotators = build_rotators(config, &metrics).await?;

    let mut failed = 0;
    for (table, outcome) in run_once(&mut rotators, backfill).await {
        match outcome {
            Ok(TickOutcome::Applied { report, .. }) => {
                for failure in &report.failures {
                    log::error!("{table}: failed to {}: {}", failure.operation, failure.error);
                }
                failed += report.failures.len();
            }
            Ok(TickOutcome::Skipped) => {}
            Err(e) => {
                log::error!("{table}: {e}");
                failed += 1;
            }
        }
    }

    metrics.summary().log();

    if failed > 0 {
        bail!("{failed} partition operation(s) failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    match cli.command.unwrap_or(Command::Common(CommonCommands::Start)) {
        Command::Common(command) => {
            if utils::handle_common_command(&command, &config)? {
                return Ok(());
            }
            run_service(&config).await
        }
        Command::Plan {
            table,
            now,
            backfill,
        } => run_plan(&config, table.as_deref(), now, backfill).await,
        Command::Once { backfill } => run_single_pass(&config, backfill).await,
    }
}
