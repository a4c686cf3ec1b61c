//! # govsync
//!
//! Command-line entry point for the governance dataset sync engine.
//!
//! ```text
//! govsync run                  # schedule every enabled job until Ctrl-C
//! govsync once totals          # run one job now
//! govsync once all             # run every enabled job once, in order
//! govsync check-config         # load, validate and print the sanitized configuration
//! govsync check-sources        # ping every configured source
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use govsync_core::config::ConfigManager;
use govsync_core::engine::SyncEngine;
use govsync_core::jobs::{JobRegistry, JobScheduler, TriggerOutcome};
use govsync_core::logging::init_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "govsync")]
#[command(about = "Replicate governance datasets from read replicas into the materialized store")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration directory containing govsync.toml
    #[arg(short, long, env = "GOVSYNC_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Environment overlay to apply (govsync.<environment>.toml)
    #[arg(short, long, env = "GOVSYNC_ENV", default_value = "development")]
    environment: String,

    /// Refresh into an in-memory store instead of the destination database
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled job on its interval until interrupted
    Run,

    /// Run one job, or `all`, immediately and exit
    Once {
        /// Job name, or `all`
        job: String,
    },

    /// Load and validate configuration, then print it with credentials masked
    CheckConfig,

    /// Probe every configured source and report reachability
    CheckSources,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .context("failed to load configuration")?;
    init_logging(&manager.config().logging);

    match cli.command {
        Commands::CheckConfig => check_config(&manager),
        Commands::CheckSources => check_sources(&manager).await,
        Commands::Once { job } => run_once(&manager, &job, cli.dry_run).await,
        Commands::Run => run_scheduler(&manager, cli.dry_run).await,
    }
}

fn check_config(manager: &ConfigManager) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&manager.debug_config())?;
    println!("{rendered}");
    println!(
        "\n✅ Configuration valid for environment '{}' ({} usable sources)",
        manager.environment(),
        manager.config().source_registry().len()
    );
    Ok(())
}

async fn check_sources(manager: &ConfigManager) -> Result<()> {
    let engine = SyncEngine::bootstrap(manager, true).await?;
    let probes = engine.probe_sources().await;
    engine.shutdown().await;

    if probes.is_empty() {
        bail!("no usable sources configured");
    }

    for probe in &probes {
        match (&probe.latency_ms, &probe.error) {
            (Some(latency), _) => println!("✅ {:<20} reachable ({latency} ms)", probe.source),
            (None, Some(err)) => println!("❌ {:<20} unreachable: {err}", probe.source),
            (None, None) => println!("❌ {:<20} unreachable", probe.source),
        }
    }

    if probes.iter().all(|p| !p.reachable) {
        bail!("no source is reachable");
    }
    Ok(())
}

async fn run_once(manager: &ConfigManager, job: &str, dry_run: bool) -> Result<()> {
    let engine = SyncEngine::bootstrap(manager, dry_run).await?;
    let registry = JobRegistry::from_config(manager.config());

    let results = if job == "all" {
        registry.trigger_all(&engine).await
    } else {
        let name = registry
            .get(job)
            .map(|runner| runner.name())
            .with_context(|| format!("unknown or disabled job '{job}', expected one of {:?}", registry.names()))?;
        vec![(name, registry.trigger(job, &engine).await)]
    };
    engine.shutdown().await;

    let mut failures = 0;
    for (name, result) in results {
        match result {
            Ok(TriggerOutcome::Completed { stats, .. }) => println!(
                "✅ {name}: {:?}, fetched {} wrote {} ({} ids failed)",
                stats.outcome, stats.records_fetched, stats.records_written, stats.failed_ids
            ),
            Ok(TriggerOutcome::Skipped { .. }) => println!("⏭️ {name}: skipped, already running"),
            Err(err) => {
                failures += 1;
                println!("❌ {name}: {err}");
            }
        }
    }

    if failures > 0 {
        bail!("{failures} job(s) failed");
    }
    Ok(())
}

async fn run_scheduler(manager: &ConfigManager, dry_run: bool) -> Result<()> {
    let config = manager.config();
    let engine = Arc::new(SyncEngine::bootstrap(manager, dry_run).await?);
    let registry = Arc::new(JobRegistry::from_config(config));

    let mut scheduler = JobScheduler::new(
        Arc::clone(&engine),
        Arc::clone(&registry),
        std::time::Duration::from_secs(govsync_core::constants::defaults::JOB_INTERVAL_SECONDS),
    );
    for name in registry.names() {
        scheduler = scheduler.with_interval(name, config.job_interval(name));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    info!(jobs = ?registry.names(), "🚀 govsync running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "❌ Failed to listen for Ctrl-C, shutting down");
    }

    let _ = shutdown_tx.send(true);
    info!("⏳ Stopping scheduler, letting in-flight runs finish");
    // The engine must outlive every run the scheduler started
    scheduler_handle.await.context("scheduler task failed")?;
    engine.shutdown().await;
    Ok(())
}
