//! Season aggregation job: shots table → shrunk per-entity rates.

use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::shrinkage::{consistency_check, shrink_population, RateInput};
use crate::adapters::{from_row, select_all, to_row, Query, TableStore};
use crate::config::ShrinkageConfig;
use crate::domain::{rate_scope, season_game_id_range, EntityRateAggregate, EntityType, RateSituation, ShotRecord};
use crate::error::Result;
use crate::processing::SHOTS_TABLE;

pub const RATES_TABLE: &str = "entity_rates";
const RATE_KEY: &[&str] = &["scope", "entity_id", "situation"];
const PAGE_SIZE: usize = 5_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationReport {
    pub season: i64,
    pub shots_read: usize,
    pub goalie_rows: usize,
    pub shooter_rows: usize,
}

/// Situation buckets a shot counts toward, from the entity's side.
fn buckets(entity_type: EntityType, shot: &ShotRecord) -> Vec<RateSituation> {
    let mut out = vec![RateSituation::All];
    if let Some(situation) = RateSituation::from_strength(shot.features.strength) {
        out.push(match entity_type {
            EntityType::Shooter => situation,
            EntityType::Goalie => situation.mirrored(),
        });
    }
    out
}

/// Per-situation raw counts for one entity type.
pub fn collect_inputs(entity_type: EntityType, shots: &[ShotRecord]) -> BTreeMap<RateSituation, Vec<RateInput>> {
    let mut counts: BTreeMap<RateSituation, BTreeMap<i64, (f64, f64)>> = BTreeMap::new();
    for shot in shots {
        let f = &shot.features;
        if !f.shot_kind.is_unblocked() {
            continue;
        }
        let entity = match entity_type {
            EntityType::Shooter => f.shooter_id,
            EntityType::Goalie => {
                if !f.shot_kind.is_on_net() || f.is_empty_net == Some(true) {
                    continue;
                }
                let Some(goalie) = f.goalie_id else { continue };
                goalie
            }
        };
        let goal = if f.is_goal { 1.0 } else { 0.0 };
        for situation in buckets(entity_type, shot) {
            let slot = counts.entry(situation).or_default().entry(entity).or_insert((0.0, 0.0));
            slot.0 += goal;
            slot.1 += 1.0;
        }
    }
    counts
        .into_iter()
        .map(|(situation, by_entity)| {
            let inputs = by_entity
                .into_iter()
                .map(|(id, (num, den))| RateInput::new(id, num, den))
                .collect();
            (situation, inputs)
        })
        .collect()
}

/// Shrunk rates for every entity of one type in one season.
pub fn build_aggregates(
    entity_type: EntityType,
    season: i64,
    shots: &[ShotRecord],
    prior_strength: f64,
    tolerance: f64,
) -> Result<Vec<EntityRateAggregate>> {
    let scope = rate_scope(entity_type, season);
    let mut out = Vec::new();
    for (situation, inputs) in collect_inputs(entity_type, shots) {
        let Some(population) = shrink_population(&inputs, prior_strength) else {
            continue;
        };
        consistency_check(&inputs, population.prior, tolerance)?;
        out.extend(population.rates.into_iter().map(|r| EntityRateAggregate {
            scope: scope.clone(),
            entity_type,
            entity_id: r.entity_id,
            situation,
            season,
            sample_size: r.sample_size,
            raw_rate: r.raw_rate,
            regressed_rate: r.regressed_rate,
            baseline_rate: population.prior,
            prior_strength,
        }));
    }
    Ok(out)
}

pub struct AggregationJob {
    store: Arc<dyn TableStore>,
    cfg: ShrinkageConfig,
}

impl AggregationJob {
    pub fn new(store: Arc<dyn TableStore>, cfg: ShrinkageConfig) -> Self {
        Self { store, cfg }
    }

    async fn season_shots(&self, season: i64) -> Result<Vec<ShotRecord>> {
        let (lo, hi) = season_game_id_range(season);
        let query = Query::table(SHOTS_TABLE)
            .gte("game_id", lo)
            .lte("game_id", hi)
            .order_by("game_id")
            .order_by("event_index");
        select_all(self.store.as_ref(), query, PAGE_SIZE)
            .await?
            .into_iter()
            .map(from_row)
            .collect()
    }

    /// Regenerate both entity scopes of a season.
    #[instrument(skip(self))]
    pub async fn run(&self, season: i64) -> Result<AggregationReport> {
        let shots = self.season_shots(season).await?;
        if shots.is_empty() {
            warn!(season, "No shots stored for season");
        }

        let mut report = AggregationReport {
            season,
            shots_read: shots.len(),
            ..AggregationReport::default()
        };
        for (entity_type, prior_strength) in [
            (EntityType::Goalie, self.cfg.goalie_prior_strength),
            (EntityType::Shooter, self.cfg.shooter_prior_strength),
        ] {
            let aggregates = build_aggregates(
                entity_type,
                season,
                &shots,
                prior_strength,
                self.cfg.consistency_tolerance,
            )?;
            let rows = aggregates.iter().map(to_row).collect::<Result<Vec<_>>>()?;
            let scope = rate_scope(entity_type, season);
            self.store
                .replace_for_key(RATES_TABLE, "scope", &json!(scope), &rows, RATE_KEY)
                .await?;
            info!(%scope, rows = rows.len(), "Entity rates regenerated");
            match entity_type {
                EntityType::Goalie => report.goalie_rows = rows.len(),
                EntityType::Shooter => report.shooter_rows = rows.len(),
            }
        }
        Ok(report)
    }
}
