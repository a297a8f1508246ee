//! Run summary for operators: counters plus the games left unprocessed.

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tabled::{Table, Tabled};
use tracing::info;

use crate::error::{FetchError, RinkError};

/// Why a game was left unprocessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    FetchTransient,
    FetchPermanent,
    Payload,
    Verification,
    Store,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::FetchTransient => "fetch_transient",
            ReasonCode::FetchPermanent => "fetch_permanent",
            ReasonCode::Payload => "payload",
            ReasonCode::Verification => "verification",
            ReasonCode::Store => "store",
        }
    }

    pub fn from_error(err: &RinkError) -> Self {
        match err {
            RinkError::Fetch(FetchError::Transient { .. }) | RinkError::Http(_) => ReasonCode::FetchTransient,
            RinkError::Fetch(FetchError::Permanent { .. }) => ReasonCode::FetchPermanent,
            RinkError::Fetch(FetchError::Decode { .. })
            | RinkError::InvalidPayload { .. }
            | RinkError::Json(_)
            | RinkError::Scoring(_) => ReasonCode::Payload,
            RinkError::PersistenceVerification { .. } => ReasonCode::Verification,
            _ => ReasonCode::Store,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnprocessedGame {
    pub game_id: i64,
    pub reason: ReasonCode,
    pub detail: String,
}

/// Counters shared by every worker of a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub games_fetched: AtomicU64,
    pub games_unchanged: AtomicU64,
    pub games_finalized: AtomicU64,
    pub games_extracted: AtomicU64,
    pub games_scored: AtomicU64,
    pub games_skipped: AtomicU64,
    pub shots_scored: AtomicU64,
    pub shots_skipped_geometry: AtomicU64,
    pub malformed_events: AtomicU64,
    unprocessed: DashMap<i64, UnprocessedGame>,
}

#[derive(Debug, Serialize, Tabled)]
struct CounterRow {
    metric: &'static str,
    value: u64,
}

#[derive(Debug, Serialize, Tabled)]
struct UnprocessedRow {
    game_id: i64,
    reason: String,
    detail: String,
}

fn inc(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetched(&self) {
        inc(&self.games_fetched, 1);
    }

    pub fn record_unchanged(&self) {
        inc(&self.games_unchanged, 1);
    }

    pub fn record_finalized(&self) {
        inc(&self.games_finalized, 1);
    }

    pub fn record_skipped(&self) {
        inc(&self.games_skipped, 1);
    }

    /// A game went through extraction and scoring and was committed.
    pub fn record_processed(&self, game_id: i64, shots: usize, skipped_geometry: usize, malformed: usize) {
        inc(&self.games_extracted, 1);
        inc(&self.games_scored, 1);
        inc(&self.shots_scored, shots as u64);
        inc(&self.shots_skipped_geometry, skipped_geometry as u64);
        inc(&self.malformed_events, malformed as u64);
        self.unprocessed.remove(&game_id);
    }

    /// Remember a failed game; a later success clears it.
    pub fn record_failure(&self, game_id: i64, err: &RinkError) {
        let reason = ReasonCode::from_error(err);
        self.unprocessed.insert(
            game_id,
            UnprocessedGame {
                game_id,
                reason,
                detail: err.to_string(),
            },
        );
    }

    pub fn clear_failure(&self, game_id: i64) {
        self.unprocessed.remove(&game_id);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Unprocessed games, ordered by id
    pub fn unprocessed(&self) -> Vec<UnprocessedGame> {
        let mut games: Vec<UnprocessedGame> = self.unprocessed.iter().map(|e| e.value().clone()).collect();
        games.sort_by_key(|g| g.game_id);
        games
    }

    fn counter_rows(&self) -> Vec<CounterRow> {
        vec![
            CounterRow { metric: "games fetched", value: Self::get(&self.games_fetched) },
            CounterRow { metric: "games unchanged", value: Self::get(&self.games_unchanged) },
            CounterRow { metric: "games finalized", value: Self::get(&self.games_finalized) },
            CounterRow { metric: "games extracted", value: Self::get(&self.games_extracted) },
            CounterRow { metric: "games scored", value: Self::get(&self.games_scored) },
            CounterRow { metric: "games skipped", value: Self::get(&self.games_skipped) },
            CounterRow { metric: "shots scored", value: Self::get(&self.shots_scored) },
            CounterRow { metric: "shots skipped (geometry)", value: Self::get(&self.shots_skipped_geometry) },
            CounterRow { metric: "malformed events", value: Self::get(&self.malformed_events) },
        ]
    }

    pub fn render(&self) -> String {
        let mut out = Table::new(self.counter_rows()).to_string();
        let unprocessed = self.unprocessed();
        if !unprocessed.is_empty() {
            let rows: Vec<UnprocessedRow> = unprocessed
                .into_iter()
                .map(|g| UnprocessedRow {
                    game_id: g.game_id,
                    reason: g.reason.to_string(),
                    detail: g.detail,
                })
                .collect();
            out.push('\n');
            out.push_str(&Table::new(rows).to_string());
        }
        out
    }

    pub fn log(&self) {
        info!(
            fetched = Self::get(&self.games_fetched),
            scored = Self::get(&self.games_scored),
            shots = Self::get(&self.shots_scored),
            unprocessed = self.unprocessed.len(),
            "Run summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_from_errors() {
        let transient = RinkError::Fetch(FetchError::Transient {
            url: "u".into(),
            status: Some(503),
            attempts: 4,
            message: "server status 503".into(),
        });
        assert_eq!(ReasonCode::from_error(&transient), ReasonCode::FetchTransient);

        let permanent = RinkError::Fetch(FetchError::Permanent {
            url: "u".into(),
            status: 404,
        });
        assert_eq!(ReasonCode::from_error(&permanent), ReasonCode::FetchPermanent);

        let verify = RinkError::PersistenceVerification {
            game_id: 1,
            expected: 3,
            found: 2,
        };
        assert_eq!(ReasonCode::from_error(&verify), ReasonCode::Verification);
        assert_eq!(ReasonCode::from_error(&RinkError::Store("x".into())), ReasonCode::Store);
        assert_eq!(
            ReasonCode::from_error(&RinkError::InvalidPayload {
                game_id: 1,
                reason: "no plays".into()
            }),
            ReasonCode::Payload
        );
    }

    #[test]
    fn success_clears_earlier_failure() {
        let summary = RunSummary::new();
        summary.record_failure(7, &RinkError::Store("down".into()));
        summary.record_failure(3, &RinkError::Store("down".into()));
        assert_eq!(summary.unprocessed().iter().map(|g| g.game_id).collect::<Vec<_>>(), vec![3, 7]);

        summary.record_processed(7, 40, 1, 0);
        assert_eq!(summary.unprocessed().len(), 1);
        assert_eq!(RunSummary::get(&summary.shots_scored), 40);
        assert_eq!(RunSummary::get(&summary.games_scored), 1);
    }

    #[test]
    fn render_lists_unprocessed_games() {
        let summary = RunSummary::new();
        summary.record_fetched();
        summary.record_failure(2023020001, &RinkError::Store("down".into()));
        let text = summary.render();
        assert!(text.contains("games fetched"));
        assert!(text.contains("2023020001"));
        assert!(text.contains("store"));
    }
}
