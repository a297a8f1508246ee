use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::{RinkError, Result};
use crate::ingest::BackfillRequest;

#[derive(Parser, Debug)]
#[command(name = "rinkflow")]
#[command(version)]
#[command(about = "NHL play-by-play ingestion, shot scoring and rate shrinkage", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(long, global = true, env = "RINK_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Keep everything in memory instead of Postgres
    #[arg(long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the schedule and process games as they are played
    Live,
    /// Fetch and process historical games
    Backfill {
        /// First schedule date (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        /// Last schedule date, inclusive
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
        /// Explicit game ids (repeatable)
        #[arg(long = "game-id")]
        game_ids: Vec<i64>,
        /// Override configured worker count
        #[arg(long)]
        workers: Option<usize>,
        /// Re-fetch and reprocess finalized games
        #[arg(long)]
        force: bool,
    },
    /// Process settled games that are still unprocessed
    Process {
        /// Max games in this pass (defaults to backfill.batch_size)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Regenerate shrunk goalie and shooter rates for a season
    Aggregate {
        /// Season start year, e.g. 2023 for 2023-24
        #[arg(long)]
        season: i64,
    },
    /// Apply database migrations
    Migrate,
}

impl Commands {
    /// Backfill arguments as a request; needs a date range or game ids.
    pub fn backfill_request(&self) -> Result<Option<BackfillRequest>> {
        let Commands::Backfill {
            from,
            to,
            game_ids,
            force,
            ..
        } = self
        else {
            return Ok(None);
        };
        if from.is_none() && game_ids.is_empty() {
            return Err(RinkError::Validation(
                "backfill needs --from/--to or at least one --game-id".into(),
            ));
        }
        Ok(Some(BackfillRequest {
            from: *from,
            to: *to,
            game_ids: game_ids.clone(),
            force: *force,
        }))
    }
}
