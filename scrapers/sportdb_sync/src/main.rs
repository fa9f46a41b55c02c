use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::info;

use sportdb_sync::{
    config::SyncConfig,
    listings_sync::{ListingsSettings, ListingsSync},
    memory_store::MemoryStore,
    metrics::MetricsCollector,
    postgres_store::PgStore,
    provider::HttpProvider,
    scheduler::{Jobs, Scheduler, SystemClock},
    store::MatchStore,
    sync_engine::{EngineSettings, SyncEngine},
    types::SyncSummary,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Keeps a Postgres copy of sports fixtures, live scores and match statistics", long_about = None)]
struct Cli {
    /// Keep all data in memory instead of Postgres
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Commands {
    /// Poll the provider until interrupted (default)
    Run,
    /// Run a single pass of every routine and exit
    Once,
    /// Create the database schema and exit
    Migrate,
}

async fn run_with_store<S: MatchStore + Clone>(config: &SyncConfig, store: S, once: bool) -> Result<()> {
    let metrics = MetricsCollector::new();
    let http = HttpProvider::new(&config.provider, metrics.clone()).context("Failed to create HTTP client")?;

    let engine = SyncEngine::new(http.clone(), store.clone(), EngineSettings::from_config(config));
    let listings = config.listings.url.as_ref().map(|url| {
        ListingsSync::new(
            http.clone(),
            store.clone(),
            ListingsSettings {
                url: url.clone(),
                sport: config.listings.sport.clone(),
                stats_delay: config.polling.stats_request_delay(),
                raw_policy: config.storage.raw_payload,
            },
        )
    });
    let jobs = Jobs::new(engine, listings).with_metrics(metrics);
    if jobs.has_listings() {
        info!("Listings routine enabled");
    }

    let mut scheduler = Scheduler::from_config(jobs, SystemClock, config);
    if !once {
        scheduler.run_forever().await;
        return Ok(());
    }

    let mut total = SyncSummary::default();
    for run in scheduler.run_pass().await {
        info!(
            "{}: {} ({} matches, {} stats)",
            run.routine, run.status, run.summary.matches, run.summary.stats_snapshots
        );
        total.absorb(run.summary);
    }
    info!(
        "Pass total: {} competitions, {} matches, {} stats, {} skipped, {} stats failures",
        total.competitions, total.matches, total.stats_snapshots, total.skipped, total.stats_failures
    );

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv().ok();

    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);
    let config = SyncConfig::from_env();
    info!("Monitoring sports: {}", config.sports.join(", "));

    if cli.dry_run {
        if let Commands::Migrate = command {
            info!("Dry run keeps data in memory, nothing to migrate");
            return Ok(());
        }
        info!("Dry run: using in-memory store");
        let store = MemoryStore::new(config.storage.stats_retention);
        return run_with_store(&config, store, matches!(command, Commands::Once)).await;
    }

    let database_url = config.database_url()?;
    let store = PgStore::connect(
        database_url,
        config.database.max_connections,
        config.storage.stats_retention,
    )
    .await
    .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to ensure database schema")?;

    if let Commands::Migrate = command {
        return Ok(());
    }

    run_with_store(&config, store, matches!(command, Commands::Once)).await
}
