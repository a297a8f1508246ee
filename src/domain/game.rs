use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::LifecycleState;

/// One game's raw ingestion row.
///
/// Owned by ingestion; extraction only reads it and flips `processed`
/// through the processed-store writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: i64,
    pub game_date: NaiveDate,
    pub home_abbrev: String,
    pub away_abbrev: String,
    pub lifecycle_state: LifecycleState,
    /// Play-by-play payload exactly as the provider returned it
    pub raw_payload: serde_json::Value,
    /// Boxscore, fetched with the gold fetch
    #[serde(default)]
    pub boxscore: Option<serde_json::Value>,
    /// SHA-256 of `raw_payload`
    pub payload_hash: String,
    /// Provider-side freshness marker observed on the schedule
    #[serde(default)]
    pub last_updated_marker: Option<String>,
    pub fetched_at: DateTime<Utc>,
    /// Set by the gold fetch; a finalized row is never overwritten
    #[serde(default)]
    pub finalized: bool,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
}

impl GameRecord {
    /// Build a fresh, unprocessed record from a fetched payload.
    pub fn from_fetch(
        header: &GameHeader,
        raw_payload: serde_json::Value,
        marker: Option<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let payload_hash = payload_hash(&raw_payload);
        Self {
            game_id: header.game_id,
            game_date: header.game_date,
            home_abbrev: header.home_abbrev.clone(),
            away_abbrev: header.away_abbrev.clone(),
            lifecycle_state: header.state,
            raw_payload,
            boxscore: None,
            payload_hash,
            last_updated_marker: marker,
            fetched_at,
            finalized: false,
            processed: false,
            processed_at: None,
        }
    }

    pub fn with_boxscore(mut self, boxscore: serde_json::Value) -> Self {
        self.boxscore = Some(boxscore);
        self
    }

    /// Season key used to scope aggregates (e.g. 2023020001 → 2023).
    pub fn season(&self) -> i64 {
        season_of(self.game_id)
    }
}

/// Identity and state of a game as seen on the schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameHeader {
    pub game_id: i64,
    pub game_date: NaiveDate,
    pub home_abbrev: String,
    pub away_abbrev: String,
    pub state: LifecycleState,
}

/// Hex SHA-256 of the canonical JSON text of a payload.
pub fn payload_hash(payload: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Provider game ids are `SSSSTTNNNN`: season start year, game type, number.
pub fn season_of(game_id: i64) -> i64 {
    game_id / 1_000_000
}

/// Inclusive game-id range for one season.
pub fn season_game_id_range(season: i64) -> (i64, i64) {
    (season * 1_000_000, season * 1_000_000 + 999_999)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_stable_and_sensitive() {
        let a = json!({"plays": [{"eventId": 1}]});
        let b = json!({"plays": [{"eventId": 2}]});
        assert_eq!(payload_hash(&a), payload_hash(&a.clone()));
        assert_ne!(payload_hash(&a), payload_hash(&b));
        assert_eq!(payload_hash(&a).len(), 64);
    }

    #[test]
    fn season_from_game_id() {
        assert_eq!(season_of(2023020456), 2023);
        let (lo, hi) = season_game_id_range(2023);
        assert!(lo <= 2023020456 && 2023020456 <= hi);
        assert!(hi < 2024000000);
    }

    #[test]
    fn fresh_record_is_unprocessed() {
        let header = GameHeader {
            game_id: 2023020001,
            game_date: NaiveDate::from_ymd_opt(2023, 10, 10).unwrap(),
            home_abbrev: "TOR".into(),
            away_abbrev: "MTL".into(),
            state: LifecycleState::Live,
        };
        let rec = GameRecord::from_fetch(&header, json!({"plays": []}), None, Utc::now());
        assert!(!rec.processed);
        assert!(!rec.finalized);
        assert_eq!(rec.season(), 2023);
    }
}
