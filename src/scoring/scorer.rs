//! xG / xA scoring and the flurry adjustment.

use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use super::dense::DenseNetwork;
use super::manifest::{FeatureManifest, FeatureVectorBuilder};
use crate::config::ScoringConfig;
use crate::domain::{ShotFeatures, ShotRecord};
use crate::error::{RinkError, Result};

/// One network paired with the manifest that feeds it
#[derive(Debug, Clone)]
pub struct ScoringModel {
    name: String,
    network: DenseNetwork,
    builder: FeatureVectorBuilder,
}

impl ScoringModel {
    pub fn new(name: &str, network: DenseNetwork, manifest: FeatureManifest) -> Result<Self> {
        manifest
            .validate()
            .map_err(|e| RinkError::ModelLoad(format!("{name} manifest: {e}")))?;
        network
            .validate()
            .map_err(|e| RinkError::ModelLoad(format!("{name} model: {e}")))?;
        if !network.is_probability_head() {
            return Err(RinkError::ModelLoad(format!(
                "{name} model must end in a single sigmoid output"
            )));
        }
        if network.input_dim != manifest.dimension() {
            return Err(RinkError::ModelLoad(format!(
                "{name}: model expects {} inputs, manifest lists {} features",
                network.input_dim,
                manifest.dimension()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            network,
            builder: FeatureVectorBuilder::new(manifest),
        })
    }

    pub fn load(name: &str, model_path: &Path, manifest_path: &Path) -> Result<Self> {
        let network = DenseNetwork::from_file(model_path)?;
        let manifest = FeatureManifest::from_file(manifest_path)?;
        let model = Self::new(name, network, manifest)?;
        info!(
            model = name,
            features = model.builder.manifest().dimension(),
            version = model.builder.manifest().version.as_deref().unwrap_or("unversioned"),
            "Loaded scoring model"
        );
        Ok(model)
    }

    /// Calibrated probability for one shot
    pub fn score(&self, shot: &ShotFeatures) -> Result<f64> {
        let input = self.builder.build(shot);
        let p = self.network.forward_scalar(&input).map_err(|e| {
            RinkError::Scoring(format!(
                "{} on game {} event {}: {e}",
                self.name, shot.game_id, shot.event_index
            ))
        })?;
        Ok(self.builder.manifest().calibration.apply(p))
    }
}

pub struct ShotScorer {
    xg: ScoringModel,
    xa: ScoringModel,
    flurry_window_secs: f64,
}

impl ShotScorer {
    pub fn new(xg: ScoringModel, xa: ScoringModel, flurry_window_secs: f64) -> Self {
        Self {
            xg,
            xa,
            flurry_window_secs,
        }
    }

    /// Load both models. Any failure here is fatal for the process.
    pub fn load(cfg: &ScoringConfig) -> Result<Self> {
        let xg = ScoringModel::load("xg", &cfg.xg_model_path, &cfg.xg_manifest_path)?;
        let xa = ScoringModel::load("xa", &cfg.xa_model_path, &cfg.xa_manifest_path)?;
        Ok(Self::new(xg, xa, cfg.flurry_window_secs))
    }

    /// Score a game's drafts in event order.
    pub fn score_game(&self, drafts: Vec<ShotFeatures>) -> Result<Vec<ShotRecord>> {
        let mut flurry_by_index: HashMap<usize, f64> = HashMap::with_capacity(drafts.len());
        let mut records = Vec::with_capacity(drafts.len());

        for features in drafts {
            let xg = self.xg.score(&features)?;
            let xa = if features.pass_context.is_some() {
                Some(self.xa.score(&features)?)
            } else {
                None
            };
            let flurry = self.flurry_adjusted(&features, xg, &flurry_by_index);
            flurry_by_index.insert(features.event_index, flurry);

            records.push(ShotRecord {
                features,
                expected_goal_value: xg,
                expected_assist_value: xa,
                flurry_adjusted_value: flurry,
            });
        }
        Ok(records)
    }

    fn flurry_adjusted(&self, shot: &ShotFeatures, xg: f64, previous: &HashMap<usize, f64>) -> f64 {
        if shot.rebound_chain < 2 {
            return xg;
        }
        let within_window = shot
            .time_since_last_shot
            .map(|t| t <= self.flurry_window_secs)
            .unwrap_or(false);
        match shot.rebound_source_index.and_then(|i| previous.get(&i)) {
            Some(source) if within_window => (xg * (1.0 - source)).max(0.0),
            _ => xg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PassContext, SetupZone, ShotKind};
    use crate::scoring::dense::{Activation, DenseLayer};
    use crate::scoring::manifest::Calibration;
    use serde_json::json;

    fn net(weights: Vec<f64>, bias: f64) -> DenseNetwork {
        DenseNetwork {
            input_dim: weights.len(),
            input_mean: None,
            input_std: None,
            layers: vec![DenseLayer {
                weights: vec![weights],
                bias: vec![bias],
                activation: Activation::Sigmoid,
            }],
            metadata: json!({}),
        }
    }

    fn distance_manifest(cap: f64) -> FeatureManifest {
        serde_json::from_value(json!({
            "features": [{"name": "distance", "kind": "continuous"}],
            "calibration": {"power": 1.0, "scale": 1.0, "cap": cap}
        }))
        .unwrap()
    }

    fn scorer() -> ShotScorer {
        let xg = ScoringModel::new("xg", net(vec![-0.1], 0.0), distance_manifest(0.95)).unwrap();
        let xa = ScoringModel::new("xa", net(vec![-0.05], 0.0), distance_manifest(0.95)).unwrap();
        ShotScorer::new(xg, xa, 1.5)
    }

    fn draft(index: usize, distance: f64) -> ShotFeatures {
        ShotFeatures {
            game_id: 1,
            event_index: index,
            period: 1,
            time_in_period: 10.0,
            team_id: 1,
            shooter_id: 9,
            goalie_id: None,
            shot_kind: ShotKind::OnGoal,
            shot_type: None,
            is_goal: false,
            x: 80.0,
            y: 0.0,
            distance,
            angle: 0.0,
            is_rebound: false,
            time_since_last_event: None,
            time_since_last_shot: None,
            rebound_chain: 0,
            rebound_source_index: None,
            strength: None,
            own_skaters: None,
            opp_skaters: None,
            is_power_play: None,
            is_empty_net: None,
            pass_context: None,
        }
    }

    fn pass() -> PassContext {
        PassContext {
            setup_index: 0,
            setup_kind: "pass".into(),
            setup_player_id: None,
            setup_x: 60.0,
            setup_y: 10.0,
            elapsed: 1.0,
            lateral_distance: 7.0,
            setup_distance: 30.0,
            setup_angle: 19.0,
            zone: SetupZone::Circle,
            immediacy_score: 0.6,
            setup_quality: 0.5,
            is_cross_ice: false,
        }
    }

    #[test]
    fn dimension_mismatch_is_model_load() {
        let err = ScoringModel::new("xg", net(vec![1.0, 1.0], 0.0), distance_manifest(1.0)).unwrap_err();
        assert!(matches!(err, RinkError::ModelLoad(_)));
    }

    #[test]
    fn non_probability_head_is_rejected() {
        let mut linear = net(vec![1.0], 0.0);
        linear.layers[0].activation = Activation::Linear;
        assert!(ScoringModel::new("xg", linear, distance_manifest(1.0)).is_err());
    }

    #[test]
    fn xa_only_with_setup() {
        let mut with_pass = draft(1, 10.0);
        with_pass.pass_context = Some(pass());
        let records = scorer().score_game(vec![draft(0, 20.0), with_pass]).unwrap();
        assert!(records[0].expected_assist_value.is_none());
        assert!(records[1].expected_assist_value.is_some());
        for r in &records {
            assert!((0.0..=0.95).contains(&r.expected_goal_value));
        }
        // closer shot scores higher
        assert!(records[1].expected_goal_value > records[0].expected_goal_value);
    }

    #[test]
    fn flurry_discounts_rebound_of_rebound() {
        let first = draft(0, 10.0);
        let mut second = draft(1, 5.0);
        second.is_rebound = true;
        second.rebound_chain = 1;
        second.rebound_source_index = Some(0);
        second.time_since_last_shot = Some(1.0);
        let mut third = draft(2, 5.0);
        third.is_rebound = true;
        third.rebound_chain = 2;
        third.rebound_source_index = Some(1);
        third.time_since_last_shot = Some(1.0);

        let records = scorer().score_game(vec![first, second, third]).unwrap();
        // chain 1 is not discounted
        assert_eq!(records[1].flurry_adjusted_value, records[1].expected_goal_value);
        let expected = records[2].expected_goal_value * (1.0 - records[1].flurry_adjusted_value);
        assert!((records[2].flurry_adjusted_value - expected).abs() < 1e-12);
        assert!(records[2].flurry_adjusted_value < records[2].expected_goal_value);
    }

    #[test]
    fn flurry_window_is_respected() {
        let first = draft(0, 10.0);
        let mut second = draft(1, 5.0);
        second.rebound_chain = 2;
        second.rebound_source_index = Some(0);
        second.time_since_last_shot = Some(2.5);
        let records = scorer().score_game(vec![first, second]).unwrap();
        assert_eq!(records[1].flurry_adjusted_value, records[1].expected_goal_value);
    }

    #[test]
    fn calibration_applies_cap() {
        let manifest = FeatureManifest {
            version: None,
            features: distance_manifest(1.0).features,
            calibration: Calibration {
                power: 1.0,
                scale: 1.0,
                cap: 0.3,
            },
        };
        let model = ScoringModel::new("xg", net(vec![-1.0], 5.0), manifest).unwrap();
        let p = model.score(&draft(0, 0.0)).unwrap();
        assert_eq!(p, 0.3);
    }
}
