use clap::Parser;
use rinkflow::adapters::PostgresStore;
use rinkflow::aggregate::AggregationJob;
use rinkflow::cli::{Cli, Commands};
use rinkflow::config::AppConfig;
use rinkflow::coordination::{listen_for_signals, Shutdown};
use rinkflow::error::{RinkError, Result};
use rinkflow::ingest::{Backfill, Scheduler};
use tracing::{error, info};

mod main_runtime;

use main_runtime::{build_feed, init_logging, Runtime};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = AppConfig::load_from(&cli.config_dir)?;
    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("config: {e}");
        }
        return Err(RinkError::Validation(errors.join("; ")));
    }
    init_logging(&cfg.logging);

    let result = dispatch(&cli, &cfg).await;
    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}

async fn dispatch(cli: &Cli, cfg: &AppConfig) -> Result<()> {
    match &cli.command {
        Commands::Migrate => {
            let store = PostgresStore::new(&cfg.database.url, cfg.database.max_connections).await?;
            store.migrate().await?;
            info!("Migrations applied");
        }
        Commands::Live => {
            let runtime = Runtime::new(cfg, cli.dry_run).await?;
            let pipeline = runtime.pipeline(cfg)?;
            let shutdown = Shutdown::new();
            let signals = listen_for_signals(shutdown.clone());

            let mut scheduler = Scheduler::new(build_feed(cfg)?, pipeline, cfg.scheduler.clone(), shutdown);
            scheduler.run().await?;
            signals.abort();
            runtime.finish();
        }
        Commands::Backfill { workers, .. } => {
            let Some(request) = cli.command.backfill_request()? else {
                return Ok(());
            };
            let runtime = Runtime::new(cfg, cli.dry_run).await?;
            let pipeline = runtime.pipeline(cfg)?;
            let shutdown = Shutdown::new();
            let signals = listen_for_signals(shutdown.clone());

            let backfill = Backfill::new(
                build_feed(cfg)?,
                pipeline,
                workers.unwrap_or(cfg.backfill.workers),
                shutdown,
            );
            let report = backfill.run(&request).await?;
            signals.abort();
            info!(
                discovered = report.discovered,
                processed = report.processed,
                failed = report.failed,
                "Backfill finished"
            );
            runtime.finish();
        }
        Commands::Process { limit } => {
            let runtime = Runtime::new(cfg, cli.dry_run).await?;
            let pipeline = runtime.pipeline(cfg)?;
            pipeline.run_pass(limit.unwrap_or(cfg.backfill.batch_size)).await?;
            runtime.finish();
        }
        Commands::Aggregate { season } => {
            let runtime = Runtime::new(cfg, cli.dry_run).await?;
            let report = AggregationJob::new(runtime.store.clone(), cfg.shrinkage.clone())
                .run(*season)
                .await?;
            println!(
                "season {}: {} shots, {} goalie rows, {} shooter rows",
                report.season, report.shots_read, report.goalie_rows, report.shooter_rows
            );
        }
    }
    Ok(())
}
