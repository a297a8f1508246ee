//! Live discovery loop.
//!
//! Polls the schedule for today and the previous few dates, fetches games
//! whose freshness marker moved or whose cooldown elapsed, and does exactly
//! one gold fetch (play-by-play plus boxscore) once a game is final. Rows
//! locked by an earlier run are never fetched again, and each cycle ends
//! with a processing pass over settled games still left unprocessed.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::raw_store::{RawGameWriter, WriteOutcome};
use crate::adapters::{GameFeed, ScheduledGame};
use crate::config::SchedulerConfig;
use crate::coordination::Shutdown;
use crate::domain::{GameRecord, LifecycleState};
use crate::error::Result;
use crate::processing::Pipeline;
use crate::summary::RunSummary;

// ── Tracker ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    NotSeen,
    Tracked,
    /// Gold fetch done; never fetched again
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    /// Not trackable (scheduled) or already finalized
    Ignore,
    /// Tracked but nothing new and cooldown not elapsed
    Skip,
    Fetch,
    GoldFetch,
}

#[derive(Debug, Clone)]
struct TrackedGame {
    state: TrackState,
    last_fetch: Option<Instant>,
    last_marker: Option<String>,
}

/// Per-game polling state, owned by one scheduler
#[derive(Debug)]
pub struct GameTracker {
    games: HashMap<i64, TrackedGame>,
    cooldown: Duration,
}

impl GameTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            games: HashMap::new(),
            cooldown,
        }
    }

    pub fn state(&self, game_id: i64) -> TrackState {
        self.games
            .get(&game_id)
            .map(|g| g.state)
            .unwrap_or(TrackState::NotSeen)
    }

    pub fn tracked_count(&self) -> usize {
        self.games
            .values()
            .filter(|g| g.state == TrackState::Tracked)
            .count()
    }

    pub fn decide(&self, game: &ScheduledGame, now: Instant) -> FetchDecision {
        let state = game.header.state;
        let Some(tracked) = self.games.get(&game.header.game_id) else {
            return if state.is_trackable() {
                FetchDecision::Fetch
            } else {
                FetchDecision::Ignore
            };
        };

        match tracked.state {
            TrackState::Finalized => FetchDecision::Ignore,
            TrackState::NotSeen | TrackState::Tracked => {
                let Some(last) = tracked.last_fetch else {
                    // Observed but every fetch so far failed
                    return FetchDecision::Fetch;
                };
                let cooled = now.saturating_duration_since(last) >= self.cooldown;
                if state == LifecycleState::Final {
                    return if cooled {
                        FetchDecision::GoldFetch
                    } else {
                        FetchDecision::Skip
                    };
                }
                if cooled || game.marker != tracked.last_marker {
                    FetchDecision::Fetch
                } else {
                    FetchDecision::Skip
                }
            }
        }
    }

    fn entry(&mut self, game_id: i64) -> &mut TrackedGame {
        self.games.entry(game_id).or_insert_with(|| TrackedGame {
            state: TrackState::Tracked,
            last_fetch: None,
            last_marker: None,
        })
    }

    /// First observation of a trackable game.
    pub fn observe(&mut self, game: &ScheduledGame) {
        if game.header.state.is_trackable() {
            self.entry(game.header.game_id);
        }
    }

    pub fn record_fetch(&mut self, game_id: i64, marker: Option<String>, now: Instant) {
        let entry = self.entry(game_id);
        entry.last_fetch = Some(now);
        entry.last_marker = marker;
    }

    pub fn record_gold(&mut self, game_id: i64, now: Instant) {
        let entry = self.entry(game_id);
        entry.state = TrackState::Finalized;
        entry.last_fetch = Some(now);
    }

    /// Seed a game whose stored row was locked by an earlier run.
    pub fn restore_finalized(&mut self, game_id: i64) {
        self.entry(game_id).state = TrackState::Finalized;
    }
}

// ── Scheduler ───────────────────────────────────────────────────

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub observed: usize,
    pub fetched: usize,
    pub gold_fetched: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Already locked in the store on first sight
    pub restored: usize,
    /// Unprocessed games picked up by the retry pass
    pub retried: usize,
    /// Any observed game is live, critical or in intermission
    pub any_active: bool,
    pub interrupted: bool,
}

pub struct Scheduler {
    feed: Arc<dyn GameFeed>,
    raw: RawGameWriter,
    pipeline: Arc<Pipeline>,
    summary: Arc<RunSummary>,
    cfg: SchedulerConfig,
    tracker: GameTracker,
    shutdown: Shutdown,
}

impl Scheduler {
    pub fn new(feed: Arc<dyn GameFeed>, pipeline: Arc<Pipeline>, cfg: SchedulerConfig, shutdown: Shutdown) -> Self {
        Self {
            feed,
            raw: pipeline.raw().clone(),
            summary: pipeline.summary().clone(),
            pipeline,
            tracker: GameTracker::new(Duration::from_secs(cfg.game_cooldown_secs)),
            cfg,
            shutdown,
        }
    }

    pub fn tracker(&self) -> &GameTracker {
        &self.tracker
    }

    /// Dates polled for `today`, oldest first.
    pub fn schedule_window(&self, today: NaiveDate) -> Vec<NaiveDate> {
        (0..=self.cfg.lookback_days as i64)
            .rev()
            .map(|back| today - ChronoDuration::days(back))
            .collect()
    }

    /// Run until shutdown is requested.
    pub async fn run(&mut self) -> Result<()> {
        let active = Duration::from_secs(self.cfg.active_interval_secs);
        let idle = Duration::from_secs(self.cfg.idle_interval_secs);
        let every = self.cfg.cadence_reevaluate_every.max(1) as u64;
        let mut interval = idle;
        let mut iteration: u64 = 0;

        info!(
            active_secs = self.cfg.active_interval_secs,
            idle_secs = self.cfg.idle_interval_secs,
            lookback_days = self.cfg.lookback_days,
            "Scheduler starting"
        );

        loop {
            if self.shutdown.is_requested() {
                break;
            }
            let report = self.run_cycle(Utc::now().date_naive()).await;
            if iteration % every == 0 {
                let next = if report.any_active { active } else { idle };
                if next != interval {
                    info!(interval_secs = next.as_secs(), "Cadence changed");
                }
                interval = next;
            }
            iteration += 1;
            self.summary.log();

            if report.interrupted || self.shutdown.sleep(interval).await {
                break;
            }
        }
        info!(tracked = self.tracker.tracked_count(), "Scheduler stopped");
        Ok(())
    }

    /// One pass over the schedule window.
    #[instrument(skip(self))]
    pub async fn run_cycle(&mut self, today: NaiveDate) -> CycleReport {
        let mut report = CycleReport::default();
        let mut games: Vec<ScheduledGame> = Vec::new();
        for date in self.schedule_window(today) {
            match self.feed.schedule(date).await {
                Ok(listed) => games.extend(listed),
                Err(e) => warn!(%date, error = %e, "Schedule fetch failed"),
            }
        }
        let mut seen = HashSet::new();
        games.retain(|g| seen.insert(g.header.game_id));

        for game in games {
            if self.shutdown.is_requested() {
                report.interrupted = true;
                break;
            }
            report.observed += 1;
            report.any_active |= game.header.state.is_active();

            let game_id = game.header.game_id;
            if self.restore_if_locked(&game).await {
                report.restored += 1;
                continue;
            }
            match self.tracker.decide(&game, Instant::now()) {
                FetchDecision::Ignore => {}
                FetchDecision::Skip => report.skipped += 1,
                FetchDecision::Fetch => {
                    self.tracker.observe(&game);
                    match self.fetch_game(&game).await {
                        Ok(()) => {
                            self.tracker.record_fetch(game_id, game.marker.clone(), Instant::now());
                            report.fetched += 1;
                        }
                        Err(e) => {
                            warn!(game_id, error = %e, "Fetch failed, retrying next cycle");
                            self.summary.record_failure(game_id, &e);
                            report.failed += 1;
                        }
                    }
                }
                FetchDecision::GoldFetch => match self.gold_fetch(&game).await {
                    Ok(()) => {
                        self.tracker.record_gold(game_id, Instant::now());
                        report.gold_fetched += 1;
                    }
                    Err(e) => {
                        warn!(game_id, error = %e, "Gold fetch failed, game stays tracked");
                        self.summary.record_failure(game_id, &e);
                        report.failed += 1;
                    }
                },
            }
        }

        // Games whose processing failed stay unprocessed until a pass picks them up
        if !report.interrupted && !self.shutdown.is_requested() {
            match self.pipeline.run_pass(self.cfg.retry_batch).await {
                Ok(pass) => report.retried = pass.processed,
                Err(e) => warn!(error = %e, "Retry pass failed"),
            }
        }

        debug!(?report, "Cycle complete");
        report
    }

    /// First sight of a game whose row is already finalized: track it as
    /// finalized without fetching.
    async fn restore_if_locked(&mut self, game: &ScheduledGame) -> bool {
        let game_id = game.header.game_id;
        if self.tracker.state(game_id) != TrackState::NotSeen || !game.header.state.is_trackable() {
            return false;
        }
        match self.raw.load(game_id).await {
            Ok(Some(row)) if row.finalized => {
                debug!(game_id, "Stored row already finalized");
                self.tracker.restore_finalized(game_id);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(game_id, error = %e, "Stored row lookup failed");
                false
            }
        }
    }

    async fn fetch_game(&self, game: &ScheduledGame) -> Result<()> {
        let game_id = game.header.game_id;
        let payload = self.feed.play_by_play(game_id).await?;
        let record = GameRecord::from_fetch(&game.header, payload, game.marker.clone(), Utc::now());
        match self.raw.upsert(&record).await? {
            WriteOutcome::Written => {
                self.summary.record_fetched();
                self.pipeline.process_and_record(&record).await;
            }
            WriteOutcome::Unchanged => self.summary.record_unchanged(),
            WriteOutcome::Locked => debug!(game_id, "Row already finalized"),
        }
        Ok(())
    }

    async fn gold_fetch(&self, game: &ScheduledGame) -> Result<()> {
        let game_id = game.header.game_id;
        let payload = self.feed.play_by_play(game_id).await?;
        let boxscore = self.feed.boxscore(game_id).await?;
        let record = GameRecord::from_fetch(&game.header, payload, game.marker.clone(), Utc::now())
            .with_boxscore(boxscore);

        let outcome = self.raw.upsert(&record).await?;
        self.raw.mark_finalized(game_id).await?;
        self.summary.record_fetched();
        self.summary.record_finalized();
        info!(game_id, ?outcome, "Gold fetch stored, row locked");

        // A failure here leaves the row unprocessed for the next pass
        if let Some(stored) = self.raw.load(game_id).await? {
            if !stored.processed {
                self.pipeline.process_and_record(&stored).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GameHeader;

    fn game(id: i64, state: LifecycleState, marker: &str) -> ScheduledGame {
        ScheduledGame {
            header: GameHeader {
                game_id: id,
                game_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
                home_abbrev: "BOS".into(),
                away_abbrev: "NYR".into(),
                state,
            },
            marker: Some(marker.to_string()),
        }
    }

    #[test]
    fn scheduled_games_are_ignored() {
        let tracker = GameTracker::new(Duration::from_secs(60));
        let g = game(1, LifecycleState::Scheduled, "a");
        assert_eq!(tracker.decide(&g, Instant::now()), FetchDecision::Ignore);
        assert_eq!(tracker.state(1), TrackState::NotSeen);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_or_marker_change_triggers_fetch() {
        let mut tracker = GameTracker::new(Duration::from_secs(60));
        let g = game(1, LifecycleState::Live, "a");
        assert_eq!(tracker.decide(&g, Instant::now()), FetchDecision::Fetch);
        tracker.observe(&g);
        tracker.record_fetch(1, g.marker.clone(), Instant::now());
        assert_eq!(tracker.state(1), TrackState::Tracked);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(tracker.decide(&g, Instant::now()), FetchDecision::Skip);
        assert_eq!(
            tracker.decide(&game(1, LifecycleState::Live, "b"), Instant::now()),
            FetchDecision::Fetch
        );

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(tracker.decide(&g, Instant::now()), FetchDecision::Fetch);
    }

    #[tokio::test(start_paused = true)]
    async fn final_game_gets_one_gold_fetch() {
        let mut tracker = GameTracker::new(Duration::from_secs(60));
        let live = game(1, LifecycleState::Live, "a");
        tracker.observe(&live);
        tracker.record_fetch(1, live.marker.clone(), Instant::now());

        let fin = game(1, LifecycleState::Final, "f");
        assert_eq!(tracker.decide(&fin, Instant::now()), FetchDecision::Skip);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(tracker.decide(&fin, Instant::now()), FetchDecision::GoldFetch);

        tracker.record_gold(1, Instant::now());
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(tracker.decide(&fin, Instant::now()), FetchDecision::Ignore);
        assert_eq!(tracker.state(1), TrackState::Finalized);
    }

    #[test]
    fn restored_game_is_never_fetched() {
        let mut tracker = GameTracker::new(Duration::from_secs(60));
        tracker.restore_finalized(3);
        assert_eq!(tracker.state(3), TrackState::Finalized);
        assert_eq!(
            tracker.decide(&game(3, LifecycleState::Final, "f"), Instant::now()),
            FetchDecision::Ignore
        );
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_seen_final_gets_initial_fetch() {
        let mut tracker = GameTracker::new(Duration::from_secs(60));
        let fin = game(2, LifecycleState::Final, "f");
        assert_eq!(tracker.decide(&fin, Instant::now()), FetchDecision::Fetch);

        // Failed initial fetch: still observed, retried as a plain fetch
        tracker.observe(&fin);
        assert_eq!(tracker.decide(&fin, Instant::now()), FetchDecision::Fetch);
    }
}
