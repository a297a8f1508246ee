//! Historical backfill over a date range or explicit game ids.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::raw_store::{RawGameWriter, WriteOutcome};
use crate::adapters::{header_from_play_by_play, GameFeed};
use crate::coordination::Shutdown;
use crate::domain::{GameRecord, LifecycleState};
use crate::error::{RinkError, Result};
use crate::processing::Pipeline;
use crate::summary::RunSummary;

#[derive(Debug, Clone, Default)]
pub struct BackfillRequest {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub game_ids: Vec<i64>,
    /// Re-fetch and reprocess even finalized, processed games
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub discovered: usize,
    pub processed: usize,
    pub up_to_date: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameResult {
    Processed,
    UpToDate,
    NotStarted,
}

#[derive(Default)]
struct Tally {
    processed: AtomicUsize,
    up_to_date: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

pub struct Backfill {
    feed: Arc<dyn GameFeed>,
    raw: RawGameWriter,
    pipeline: Arc<Pipeline>,
    summary: Arc<RunSummary>,
    workers: usize,
    shutdown: Shutdown,
}

impl Backfill {
    pub fn new(feed: Arc<dyn GameFeed>, pipeline: Arc<Pipeline>, workers: usize, shutdown: Shutdown) -> Self {
        Self {
            feed,
            raw: pipeline.raw().clone(),
            summary: pipeline.summary().clone(),
            pipeline,
            workers: workers.max(1),
            shutdown,
        }
    }

    /// Game ids to visit: explicit ids plus every started game listed on
    /// the schedule between `from` and `to` inclusive. A date whose
    /// schedule cannot be fetched contributes nothing.
    pub async fn discover(&self, req: &BackfillRequest) -> Result<Vec<i64>> {
        let mut ids: BTreeSet<i64> = req.game_ids.iter().copied().collect();
        if let (Some(from), Some(to)) = (req.from, req.to) {
            if to < from {
                return Err(RinkError::Validation(format!("backfill range {from}..{to} is empty")));
            }
            let mut date = from;
            while date <= to {
                match self.feed.schedule(date).await {
                    Ok(games) => ids.extend(
                        games
                            .into_iter()
                            .filter(|g| g.header.state != LifecycleState::Scheduled)
                            .map(|g| g.header.game_id),
                    ),
                    Err(e) => warn!(%date, error = %e, "Schedule fetch failed, date skipped"),
                }
                date += ChronoDuration::days(1);
            }
        }
        Ok(ids.into_iter().collect())
    }

    #[instrument(skip(self, req), fields(force = req.force, workers = self.workers))]
    pub async fn run(&self, req: &BackfillRequest) -> Result<BackfillReport> {
        let ids = self.discover(req).await?;
        info!(games = ids.len(), "Backfill starting");

        let tally = Tally::default();
        let tally_ref = &tally;
        stream::iter(ids.iter().copied())
            .for_each_concurrent(self.workers, |game_id| async move {
                if self.shutdown.is_requested() {
                    return;
                }
                match self.backfill_game(game_id, req.force).await {
                    Ok(GameResult::Processed) => {
                        tally_ref.processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(GameResult::UpToDate) => {
                        tally_ref.up_to_date.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(GameResult::NotStarted) => {
                        self.summary.record_skipped();
                        tally_ref.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!(game_id, error = %e, "Backfill failed for game");
                        self.summary.record_failure(game_id, &e);
                        tally_ref.failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
            .await;

        let report = BackfillReport {
            discovered: ids.len(),
            processed: tally.processed.load(Ordering::Relaxed),
            up_to_date: tally.up_to_date.load(Ordering::Relaxed),
            skipped: tally.skipped.load(Ordering::Relaxed),
            failed: tally.failed.load(Ordering::Relaxed),
        };
        info!(?report, "Backfill complete");
        Ok(report)
    }

    async fn backfill_game(&self, game_id: i64, force: bool) -> Result<GameResult> {
        if !force {
            if let Some(existing) = self.raw.load(game_id).await? {
                if existing.finalized && existing.processed {
                    debug!(game_id, "Already finalized and processed");
                    return Ok(GameResult::UpToDate);
                }
            }
        }

        let payload = self.feed.play_by_play(game_id).await?;
        let header = header_from_play_by_play(&payload)?;
        if header.game_id != game_id {
            return Err(RinkError::InvalidPayload {
                game_id,
                reason: format!("payload is for game {}", header.game_id),
            });
        }
        if header.state == LifecycleState::Scheduled {
            return Ok(GameResult::NotStarted);
        }

        let is_final = header.state == LifecycleState::Final;
        let mut record = GameRecord::from_fetch(&header, payload, None, Utc::now());
        if is_final {
            record = record.with_boxscore(self.feed.boxscore(game_id).await?);
        }

        let outcome = if force {
            self.raw.overwrite(&record).await?;
            WriteOutcome::Written
        } else {
            self.raw.upsert(&record).await?
        };
        match outcome {
            WriteOutcome::Written => self.summary.record_fetched(),
            WriteOutcome::Unchanged | WriteOutcome::Locked => self.summary.record_unchanged(),
        }
        if is_final {
            self.raw.mark_finalized(game_id).await?;
            self.summary.record_finalized();
        }

        let stored = self
            .raw
            .load(game_id)
            .await?
            .ok_or_else(|| RinkError::Store(format!("game {game_id} missing after write")))?;
        if stored.processed {
            return Ok(GameResult::UpToDate);
        }
        self.pipeline.process_game(&stored).await?;
        Ok(GameResult::Processed)
    }
}
