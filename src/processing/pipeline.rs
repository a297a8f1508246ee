//! Per-game processing: parse → extract → score → commit.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::writer::ProcessedWriter;
use crate::adapters::TableStore;
use crate::config::AppConfig;
use crate::domain::{GameRecord, ShotKind};
use crate::error::Result;
use crate::features::{parse_game, EventExtractor, ExtractorSettings};
use crate::ingest::raw_store::RawGameWriter;
use crate::scoring::ShotScorer;
use crate::summary::RunSummary;

/// What processing one game produced
#[derive(Debug, Clone, PartialEq)]
pub struct GameOutcome {
    pub game_id: i64,
    pub shots: usize,
    pub goals: usize,
    pub skipped_geometry: usize,
    pub malformed_events: usize,
    pub anomalies: usize,
    /// Goal events disagree with the boxscore score
    pub boxscore_mismatch: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub attempted: usize,
    pub processed: usize,
    pub failed: usize,
}

pub struct Pipeline {
    raw: RawGameWriter,
    writer: ProcessedWriter,
    extractor: EventExtractor,
    scorer: Arc<ShotScorer>,
    summary: Arc<RunSummary>,
    settle: Duration,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn TableStore>,
        extractor: EventExtractor,
        scorer: Arc<ShotScorer>,
        summary: Arc<RunSummary>,
        settle: Duration,
    ) -> Self {
        Self {
            raw: RawGameWriter::new(store.clone()),
            writer: ProcessedWriter::new(store),
            extractor,
            scorer,
            summary,
            settle,
        }
    }

    pub fn from_config(
        cfg: &AppConfig,
        store: Arc<dyn TableStore>,
        scorer: Arc<ShotScorer>,
        summary: Arc<RunSummary>,
    ) -> Self {
        Self::new(
            store,
            EventExtractor::new(ExtractorSettings::from(&cfg.extraction)),
            scorer,
            summary,
            Duration::from_secs(cfg.scheduler.settle_secs),
        )
    }

    pub fn summary(&self) -> &Arc<RunSummary> {
        &self.summary
    }

    pub fn raw(&self) -> &RawGameWriter {
        &self.raw
    }

    #[instrument(skip(self, record), fields(game_id = record.game_id))]
    pub async fn process_game(&self, record: &GameRecord) -> Result<GameOutcome> {
        let parsed = parse_game(record.game_id, &record.raw_payload)?;
        let goal_events = parsed
            .events
            .iter()
            .filter(|e| e.shot_kind() == Some(ShotKind::Goal))
            .count();

        let extraction = self.extractor.extract(&parsed);
        let stats = extraction.stats.clone();
        let anomalies = extraction.anomalies.len();

        let records = self.scorer.score_game(extraction.shots)?;
        let committed = self.writer.commit_game(record.game_id, &records).await?;

        let boxscore_mismatch = match record.boxscore.as_ref().and_then(boxscore_goals) {
            Some(expected) if expected != goal_events => {
                warn!(
                    game_id = record.game_id,
                    goal_events,
                    boxscore_goals = expected,
                    "Goal events disagree with boxscore"
                );
                true
            }
            _ => false,
        };

        self.summary
            .record_processed(record.game_id, committed, stats.skipped_missing_geometry, stats.malformed_events);
        Ok(GameOutcome {
            game_id: record.game_id,
            shots: committed,
            goals: stats.goals,
            skipped_geometry: stats.skipped_missing_geometry,
            malformed_events: stats.malformed_events,
            anomalies,
            boxscore_mismatch,
        })
    }

    /// Process and book the result in the run summary; never fails the caller.
    pub async fn process_and_record(&self, record: &GameRecord) -> Option<GameOutcome> {
        match self.process_game(record).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(game_id = record.game_id, error = %e, "Processing failed, game stays unprocessed");
                self.summary.record_failure(record.game_id, &e);
                None
            }
        }
    }

    /// One resumable pass over settled, unprocessed games.
    #[instrument(skip(self))]
    pub async fn run_pass(&self, limit: usize) -> Result<PassReport> {
        let settle = chrono::Duration::from_std(self.settle).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - settle;
        let pending = self.raw.unprocessed(cutoff, limit).await?;

        let mut report = PassReport {
            attempted: pending.len(),
            ..PassReport::default()
        };
        for game in &pending {
            match self.process_and_record(game).await {
                Some(_) => report.processed += 1,
                None => report.failed += 1,
            }
        }
        info!(
            attempted = report.attempted,
            processed = report.processed,
            failed = report.failed,
            "Processing pass complete"
        );
        Ok(report)
    }
}

/// Total goals on a boxscore; `None` when unknown or decided by shootout
/// (shootout goals are not play-by-play goal events).
pub fn boxscore_goals(boxscore: &Value) -> Option<usize> {
    let shootout = boxscore
        .pointer("/gameOutcome/lastPeriodType")
        .or_else(|| boxscore.pointer("/periodDescriptor/periodType"))
        .and_then(Value::as_str)
        .map(|t| t.eq_ignore_ascii_case("SO"))
        .unwrap_or(false);
    if shootout {
        return None;
    }
    let home = boxscore.pointer("/homeTeam/score")?.as_u64()?;
    let away = boxscore.pointer("/awayTeam/score")?.as_u64()?;
    Some((home + away) as usize)
}
