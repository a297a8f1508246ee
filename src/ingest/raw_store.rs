//! Raw game rows: the only writer of the `games` table payload columns.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::adapters::{from_row, to_row, Filter, Query, Row, TableStore};
use crate::domain::GameRecord;
use crate::error::{RinkError, Result};

pub const GAMES_TABLE: &str = "games";

/// Result of a raw upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Row inserted or replaced; the game needs processing again
    Written,
    /// Stored payload hash matches, nothing written
    Unchanged,
    /// Stored row is finalized and never overwritten
    Locked,
}

#[derive(Clone)]
pub struct RawGameWriter {
    store: Arc<dyn TableStore>,
}

impl RawGameWriter {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    pub async fn load(&self, game_id: i64) -> Result<Option<GameRecord>> {
        let rows = self
            .store
            .select(&Query::table(GAMES_TABLE).eq("game_id", game_id).limit(1))
            .await?;
        rows.into_iter().next().map(from_row).transpose()
    }

    /// Upsert a freshly fetched game.
    ///
    /// A new boxscore on an otherwise identical payload is stored without
    /// touching `processed`.
    #[instrument(skip(self, record), fields(game_id = record.game_id))]
    pub async fn upsert(&self, record: &GameRecord) -> Result<WriteOutcome> {
        if let Some(existing) = self.load(record.game_id).await? {
            if existing.finalized {
                debug!("Row is finalized, not overwriting");
                return Ok(WriteOutcome::Locked);
            }
            if existing.payload_hash == record.payload_hash {
                let new_boxscore = record.boxscore.is_some() && record.boxscore != existing.boxscore;
                if !new_boxscore {
                    return Ok(WriteOutcome::Unchanged);
                }
                let mut patch = Row::new();
                patch.insert("boxscore".into(), record.boxscore.clone().unwrap_or(Value::Null));
                patch.insert("lifecycle_state".into(), json!(record.lifecycle_state));
                self.store
                    .update(GAMES_TABLE, &[Filter::eq("game_id", record.game_id)], &patch)
                    .await?;
                return Ok(WriteOutcome::Unchanged);
            }
        }
        self.write(record).await?;
        Ok(WriteOutcome::Written)
    }

    /// Write regardless of lock and hash (forced backfill). The row comes
    /// back unlocked and unprocessed.
    pub async fn overwrite(&self, record: &GameRecord) -> Result<()> {
        self.write(record).await
    }

    async fn write(&self, record: &GameRecord) -> Result<()> {
        let mut row = to_row(record)?;
        row.insert("processed".into(), Value::Bool(false));
        row.insert("processed_at".into(), Value::Null);
        row.insert("finalized".into(), Value::Bool(false));
        self.store.upsert(GAMES_TABLE, &[row], &["game_id"]).await?;
        debug!(game_id = record.game_id, hash = %record.payload_hash, "Raw payload written");
        Ok(())
    }

    /// Lock the row after the gold fetch.
    pub async fn mark_finalized(&self, game_id: i64) -> Result<()> {
        let mut patch = Row::new();
        patch.insert("finalized".into(), Value::Bool(true));
        let n = self
            .store
            .update(GAMES_TABLE, &[Filter::eq("game_id", game_id)], &patch)
            .await?;
        if n == 0 {
            return Err(RinkError::Store(format!("cannot finalize unknown game {game_id}")));
        }
        Ok(())
    }

    /// Flip the processed flag once the shot set is verified.
    pub async fn mark_processed(&self, game_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut patch = Row::new();
        patch.insert("processed".into(), Value::Bool(true));
        patch.insert("processed_at".into(), json!(at));
        let n = self
            .store
            .update(GAMES_TABLE, &[Filter::eq("game_id", game_id)], &patch)
            .await?;
        if n == 0 {
            return Err(RinkError::Store(format!("cannot mark unknown game {game_id} processed")));
        }
        Ok(())
    }

    /// Unprocessed games fetched before `settled_before`, oldest first.
    pub async fn unprocessed(&self, settled_before: DateTime<Utc>, limit: usize) -> Result<Vec<GameRecord>> {
        let query = Query::table(GAMES_TABLE)
            .eq("processed", false)
            .lt("fetched_at", json!(settled_before))
            .order_by("fetched_at")
            .order_by("game_id")
            .limit(limit);
        self.store
            .select(&query)
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::domain::{GameHeader, LifecycleState};
    use chrono::{Duration, NaiveDate};
    use tokio_test::{assert_err, assert_ok};

    fn record(game_id: i64, payload: Value, fetched_at: DateTime<Utc>) -> GameRecord {
        let header = GameHeader {
            game_id,
            game_date: NaiveDate::from_ymd_opt(2023, 10, 10).unwrap(),
            home_abbrev: "TBL".into(),
            away_abbrev: "NSH".into(),
            state: LifecycleState::Live,
        };
        GameRecord::from_fetch(&header, payload, Some("m1".into()), fetched_at)
    }

    fn writer() -> RawGameWriter {
        RawGameWriter::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn written_then_unchanged() {
        let w = writer();
        let r = record(1, json!({"plays": []}), Utc::now());
        assert_eq!(w.upsert(&r).await.unwrap(), WriteOutcome::Written);
        assert_eq!(w.upsert(&r).await.unwrap(), WriteOutcome::Unchanged);

        let loaded = w.load(1).await.unwrap().unwrap();
        assert_eq!(loaded, r);
    }

    #[tokio::test]
    async fn new_payload_resets_processed() {
        let w = writer();
        let r = record(1, json!({"plays": []}), Utc::now());
        w.upsert(&r).await.unwrap();
        w.mark_processed(1, Utc::now()).await.unwrap();
        assert!(w.load(1).await.unwrap().unwrap().processed);

        let changed = record(1, json!({"plays": [{"eventId": 1}]}), Utc::now());
        assert_eq!(w.upsert(&changed).await.unwrap(), WriteOutcome::Written);
        let loaded = w.load(1).await.unwrap().unwrap();
        assert!(!loaded.processed);
        assert_eq!(loaded.processed_at, None);
    }

    #[tokio::test]
    async fn finalized_rows_are_locked() {
        let w = writer();
        w.upsert(&record(1, json!({"plays": []}), Utc::now())).await.unwrap();
        assert_ok!(w.mark_finalized(1).await);
        let changed = record(1, json!({"plays": [{"eventId": 9}]}), Utc::now());
        assert_eq!(w.upsert(&changed).await.unwrap(), WriteOutcome::Locked);

        w.overwrite(&changed).await.unwrap();
        let loaded = w.load(1).await.unwrap().unwrap();
        assert_eq!(loaded.payload_hash, changed.payload_hash);
        assert!(!loaded.finalized);
    }

    #[tokio::test]
    async fn boxscore_lands_without_reprocessing() {
        let w = writer();
        let r = record(1, json!({"plays": []}), Utc::now());
        w.upsert(&r).await.unwrap();
        w.mark_processed(1, Utc::now()).await.unwrap();

        let gold = r.clone().with_boxscore(json!({"homeTeam": {"score": 3}}));
        assert_eq!(w.upsert(&gold).await.unwrap(), WriteOutcome::Unchanged);
        let loaded = w.load(1).await.unwrap().unwrap();
        assert!(loaded.processed);
        assert!(loaded.boxscore.is_some());
    }

    #[tokio::test]
    async fn unprocessed_respects_settle_window() {
        let w = writer();
        let now = Utc::now();
        w.upsert(&record(1, json!({"a": 1}), now - Duration::minutes(30))).await.unwrap();
        w.upsert(&record(2, json!({"a": 2}), now - Duration::minutes(10))).await.unwrap();
        w.upsert(&record(3, json!({"a": 3}), now)).await.unwrap();
        w.mark_processed(1, now).await.unwrap();

        let pending = w.unprocessed(now - Duration::minutes(5), 10).await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|g| g.game_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn finalizing_unknown_game_fails() {
        assert_err!(writer().mark_finalized(42).await);
        assert_err!(writer().mark_processed(42, Utc::now()).await);
    }
}
