use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rinkflow::adapters::{FetchClient, GameFeed, MemoryStore, NhlApiClient, PostgresStore, TableStore};
use rinkflow::config::{AppConfig, LoggingConfig};
use rinkflow::error::Result;
use rinkflow::processing::Pipeline;
use rinkflow::scoring::ShotScorer;
use rinkflow::summary::RunSummary;

/// Initialize logging: console plus an optional daily rolling file.
pub fn init_logging(cfg: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},rinkflow=debug,sqlx=warn", cfg.level)));

    // `rolling::daily` panics if it cannot create the first file, so the
    // directory is preflighted.
    let file_layer = cfg.directory.as_ref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                dir.display(),
                e
            );
            return None;
        }
        let marker = dir.join(".rinkflow_write_test");
        match std::fs::OpenOptions::new().create(true).append(true).open(&marker) {
            Ok(_) => {
                let _ = std::fs::remove_file(&marker);
                let appender = tracing_appender::rolling::daily(dir, "rinkflow.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                // Lives as long as the process
                Box::leak(Box::new(guard));
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir.display(),
                    e
                );
                None
            }
        }
    });

    let (json_layer, text_layer) = if cfg.json {
        (Some(tracing_subscriber::fmt::layer().json().with_target(true)), None)
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        info!("File logging enabled");
    }
}

/// Shared pieces every command works with
pub struct Runtime {
    pub store: Arc<dyn TableStore>,
    pub summary: Arc<RunSummary>,
}

pub async fn open_store(cfg: &AppConfig, dry_run: bool) -> Result<Arc<dyn TableStore>> {
    if dry_run {
        info!("Dry run: using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = PostgresStore::new(&cfg.database.url, cfg.database.max_connections).await?;
    Ok(Arc::new(store))
}

impl Runtime {
    pub async fn new(cfg: &AppConfig, dry_run: bool) -> Result<Self> {
        Ok(Self {
            store: open_store(cfg, dry_run).await?,
            summary: Arc::new(RunSummary::new()),
        })
    }

    /// Model load failures are fatal at startup.
    pub fn pipeline(&self, cfg: &AppConfig) -> Result<Arc<Pipeline>> {
        let scorer = Arc::new(ShotScorer::load(&cfg.scoring)?);
        Ok(Arc::new(Pipeline::from_config(
            cfg,
            self.store.clone(),
            scorer,
            self.summary.clone(),
        )))
    }

    pub fn finish(&self) {
        self.summary.log();
        println!("{}", self.summary.render());
    }
}

pub fn build_feed(cfg: &AppConfig) -> Result<Arc<dyn GameFeed>> {
    let fetch = FetchClient::from_config(&cfg.upstream)?;
    Ok(Arc::new(NhlApiClient::new(fetch, &cfg.upstream.base_url)?))
}
