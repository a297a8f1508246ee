//! Processed store writer: whole-game replacement of scored shots.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::adapters::{from_row, to_row, Filter, Query, TableStore};
use crate::domain::ShotRecord;
use crate::error::{RinkError, Result};
use crate::ingest::raw_store::RawGameWriter;

pub const SHOTS_TABLE: &str = "shots";
const SHOT_KEY: &[&str] = &["game_id", "event_index"];

#[derive(Clone)]
pub struct ProcessedWriter {
    store: Arc<dyn TableStore>,
    games: RawGameWriter,
}

impl ProcessedWriter {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        let games = RawGameWriter::new(store.clone());
        Self { store, games }
    }

    /// Replace the game's shot set, verify it, then mark the game processed.
    ///
    /// On a count mismatch the game stays unprocessed and the next pass
    /// replaces the set again.
    #[instrument(skip(self, records), fields(shots = records.len()))]
    pub async fn commit_game(&self, game_id: i64, records: &[ShotRecord]) -> Result<usize> {
        if let Some(stray) = records.iter().find(|r| r.game_id() != game_id) {
            return Err(RinkError::Validation(format!(
                "shot for game {} in batch for game {}",
                stray.game_id(),
                game_id
            )));
        }
        let rows = records.iter().map(to_row).collect::<Result<Vec<_>>>()?;

        self.store
            .replace_for_key(SHOTS_TABLE, "game_id", &json!(game_id), &rows, SHOT_KEY)
            .await?;

        let found = self
            .store
            .count(SHOTS_TABLE, &[Filter::eq("game_id", game_id)])
            .await?;
        if found != rows.len() {
            return Err(RinkError::PersistenceVerification {
                game_id,
                expected: rows.len(),
                found,
            });
        }

        self.games.mark_processed(game_id, Utc::now()).await?;
        info!(game_id, shots = found, "Committed shot set");
        Ok(found)
    }

    pub async fn shots_for_game(&self, game_id: i64) -> Result<Vec<ShotRecord>> {
        let query = Query::table(SHOTS_TABLE)
            .eq("game_id", game_id)
            .order_by("event_index");
        self.store
            .select(&query)
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }
}
