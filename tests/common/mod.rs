#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rinkflow::adapters::{MemoryStore, ScheduledGame, TableStore};
use rinkflow::config::ScoringConfig;
use rinkflow::domain::{GameHeader, GameRecord, LifecycleState};
use rinkflow::features::{EventExtractor, ExtractorSettings};
use rinkflow::processing::Pipeline;
use rinkflow::scoring::ShotScorer;
use rinkflow::summary::RunSummary;

pub const HOME: i64 = 14;
pub const AWAY: i64 = 18;

pub fn models_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models")
}

pub fn scorer() -> Arc<ShotScorer> {
    let dir = models_dir();
    let cfg = ScoringConfig {
        xg_model_path: dir.join("xg_model.json"),
        xg_manifest_path: dir.join("xg_manifest.json"),
        xa_model_path: dir.join("xa_model.json"),
        xa_manifest_path: dir.join("xa_manifest.json"),
        flurry_window_secs: 1.5,
    };
    Arc::new(ShotScorer::load(&cfg).expect("bundled models load"))
}

pub fn pipeline(store: Arc<dyn TableStore>) -> Arc<Pipeline> {
    Arc::new(Pipeline::new(
        store,
        EventExtractor::new(ExtractorSettings::default()),
        scorer(),
        Arc::new(RunSummary::new()),
        Duration::ZERO,
    ))
}

pub fn memory_store() -> Arc<dyn TableStore> {
    Arc::new(MemoryStore::new())
}

pub fn game_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 10, 10).unwrap()
}

fn play(sort: i64, clock: &str, type_key: &str, details: Value) -> Value {
    json!({
        "eventId": sort,
        "sortOrder": sort,
        "periodDescriptor": {"number": 1, "periodType": "REG"},
        "timeInPeriod": clock,
        "situationCode": "1551",
        "homeTeamDefendingSide": "left",
        "typeDescKey": type_key,
        "details": details,
    })
}

/// Faceoff, a pass, a shot 1.5s later from five feet, then a rebound goal.
pub fn play_by_play(game_id: i64, state: &str) -> Value {
    json!({
        "id": game_id,
        "gameDate": "2023-10-10",
        "gameState": state,
        "homeTeam": {"id": HOME, "abbrev": "TBL"},
        "awayTeam": {"id": AWAY, "abbrev": "NSH"},
        "plays": [
            play(1, "00:00", "faceoff", json!({
                "eventOwnerTeamId": HOME, "xCoord": 0, "yCoord": 0, "zoneCode": "N",
                "winningPlayerId": 71, "losingPlayerId": 81
            })),
            play(2, "00:10", "pass", json!({
                "eventOwnerTeamId": HOME, "xCoord": 60, "yCoord": 10, "zoneCode": "O",
                "playerId": 72
            })),
            play(3, "00:11.5", "shot-on-goal", json!({
                "eventOwnerTeamId": HOME, "xCoord": 85, "yCoord": 3, "zoneCode": "O",
                "shootingPlayerId": 73, "goalieInNetId": 35, "shotType": "wrist"
            })),
            play(4, "00:13", "goal", json!({
                "eventOwnerTeamId": HOME, "xCoord": 86, "yCoord": 1, "zoneCode": "O",
                "scoringPlayerId": 74, "goalieInNetId": 35, "shotType": "tip-in"
            })),
        ]
    })
}

/// Faceoff, pass and a single shot on goal: the goal is left out.
pub fn three_event_play_by_play(game_id: i64) -> Value {
    let mut payload = play_by_play(game_id, "OFF");
    if let Some(plays) = payload["plays"].as_array_mut() {
        plays.truncate(3);
    }
    payload
}

pub fn boxscore(home: u64, away: u64) -> Value {
    json!({
        "homeTeam": {"score": home},
        "awayTeam": {"score": away},
        "gameOutcome": {"lastPeriodType": "REG"}
    })
}

pub fn header(game_id: i64, state: LifecycleState) -> GameHeader {
    GameHeader {
        game_id,
        game_date: game_date(),
        home_abbrev: "TBL".into(),
        away_abbrev: "NSH".into(),
        state,
    }
}

pub fn scheduled(game_id: i64, state: LifecycleState, marker: &str) -> ScheduledGame {
    ScheduledGame {
        header: header(game_id, state),
        marker: Some(marker.to_string()),
    }
}

pub fn record(game_id: i64) -> GameRecord {
    GameRecord::from_fetch(
        &header(game_id, LifecycleState::Final),
        play_by_play(game_id, "OFF"),
        None,
        Utc::now(),
    )
}
