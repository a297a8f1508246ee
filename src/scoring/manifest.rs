//! Feature manifest: the declarative table that turns a shot into a
//! model input vector.
//!
//! Every feature the models see is listed here with its kind, its fill
//! policy for missing values and, for categoricals, the label encoder.
//! `FeatureVectorBuilder` is the only code that applies it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::domain::ShotFeatures;
use crate::error::{RinkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Continuous,
    Categorical,
}

/// What to use when a shot has no value for a feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FillPolicy {
    Zero,
    /// Median of the non-zero training values
    MedianNonzero { median: f64 },
    /// Default learned by the model during training
    LearnedDefault { value: f64 },
}

impl FillPolicy {
    pub fn fill_value(&self) -> f64 {
        match self {
            FillPolicy::Zero => 0.0,
            FillPolicy::MedianNonzero { median } => *median,
            FillPolicy::LearnedDefault { value } => *value,
        }
    }
}

impl Default for FillPolicy {
    fn default() -> Self {
        FillPolicy::Zero
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub categories: BTreeMap<String, f64>,
    /// Code for categories never seen in training
    pub unknown: f64,
}

impl CategoricalEncoder {
    pub fn encode(&self, category: &str) -> f64 {
        self.categories.get(category).copied().unwrap_or(self.unknown)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
    #[serde(default)]
    pub fill: FillPolicy,
    #[serde(default)]
    pub encoder: Option<CategoricalEncoder>,
}

/// `min(cap, scale · p^power)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub power: f64,
    pub scale: f64,
    pub cap: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            power: 1.0,
            scale: 1.0,
            cap: 1.0,
        }
    }
}

impl Calibration {
    /// Monotone in `p`, always within [0, cap].
    pub fn apply(&self, p: f64) -> f64 {
        let p = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
        (self.scale * p.powf(self.power)).clamp(0.0, self.cap)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !(self.power.is_finite() && self.power > 0.0) {
            return Err(format!("calibration power must be > 0, got {}", self.power));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(format!("calibration scale must be > 0, got {}", self.scale));
        }
        if !(self.cap > 0.0 && self.cap <= 1.0) {
            return Err(format!("calibration cap must be in (0, 1], got {}", self.cap));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureManifest {
    #[serde(default)]
    pub version: Option<String>,
    pub features: Vec<FeatureSpec>,
    #[serde(default)]
    pub calibration: Calibration,
}

impl FeatureManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RinkError::ModelLoad(format!("{}: {e}", path.display())))?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| RinkError::ModelLoad(format!("{}: {e}", path.display())))?;
        manifest
            .validate()
            .map_err(|e| RinkError::ModelLoad(format!("{}: {e}", path.display())))?;
        Ok(manifest)
    }

    pub fn dimension(&self) -> usize {
        self.features.len()
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.features.is_empty() {
            return Err("manifest lists no features".to_string());
        }
        let mut seen = HashSet::new();
        for f in &self.features {
            if !seen.insert(f.name.as_str()) {
                return Err(format!("duplicate feature {}", f.name));
            }
            match catalog_kind(&f.name) {
                None => return Err(format!("unknown feature {}", f.name)),
                Some(kind) if kind != f.kind => {
                    return Err(format!("feature {} is {:?}, manifest says {:?}", f.name, kind, f.kind))
                }
                Some(_) => {}
            }
            if f.kind == FeatureKind::Categorical && f.encoder.is_none() {
                return Err(format!("categorical feature {} has no encoder", f.name));
            }
            if !f.fill.fill_value().is_finite() {
                return Err(format!("feature {} has a non-finite fill value", f.name));
            }
        }
        self.calibration.validate()
    }
}

/// A feature value read off a shot, before encoding
#[derive(Debug, Clone, PartialEq)]
pub enum RawFeature {
    Number(f64),
    Category(String),
}

const CATALOG: &[(&str, FeatureKind)] = &[
    ("distance", FeatureKind::Continuous),
    ("angle", FeatureKind::Continuous),
    ("x_abs", FeatureKind::Continuous),
    ("y_abs", FeatureKind::Continuous),
    ("period", FeatureKind::Continuous),
    ("time_in_period", FeatureKind::Continuous),
    ("time_since_last_event", FeatureKind::Continuous),
    ("time_since_last_shot", FeatureKind::Continuous),
    ("is_rebound", FeatureKind::Continuous),
    ("rebound_chain", FeatureKind::Continuous),
    ("own_skaters", FeatureKind::Continuous),
    ("opp_skaters", FeatureKind::Continuous),
    ("is_power_play", FeatureKind::Continuous),
    ("is_empty_net", FeatureKind::Continuous),
    ("has_setup", FeatureKind::Continuous),
    ("setup_elapsed", FeatureKind::Continuous),
    ("setup_lateral_distance", FeatureKind::Continuous),
    ("setup_distance", FeatureKind::Continuous),
    ("setup_angle", FeatureKind::Continuous),
    ("setup_immediacy", FeatureKind::Continuous),
    ("setup_quality", FeatureKind::Continuous),
    ("setup_cross_ice", FeatureKind::Continuous),
    ("shot_type", FeatureKind::Categorical),
    ("strength", FeatureKind::Categorical),
    ("setup_zone", FeatureKind::Categorical),
    ("setup_kind", FeatureKind::Categorical),
];

pub fn catalog_kind(name: &str) -> Option<FeatureKind> {
    CATALOG.iter().find(|(n, _)| *n == name).map(|(_, k)| *k)
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Raw value of a catalog feature for one shot; `None` means missing.
pub fn raw_feature(name: &str, shot: &ShotFeatures) -> Option<RawFeature> {
    use RawFeature::{Category, Number};
    let pass = shot.pass_context.as_ref();
    let value = match name {
        "distance" => Number(shot.distance),
        "angle" => Number(shot.angle),
        "x_abs" => Number(shot.x.abs()),
        "y_abs" => Number(shot.y.abs()),
        "period" => Number(f64::from(shot.period)),
        "time_in_period" => Number(shot.time_in_period),
        "time_since_last_event" => Number(shot.time_since_last_event?),
        "time_since_last_shot" => Number(shot.time_since_last_shot?),
        "is_rebound" => Number(flag(shot.is_rebound)),
        "rebound_chain" => Number(f64::from(shot.rebound_chain)),
        "own_skaters" => Number(f64::from(shot.own_skaters?)),
        "opp_skaters" => Number(f64::from(shot.opp_skaters?)),
        "is_power_play" => Number(flag(shot.is_power_play?)),
        "is_empty_net" => Number(flag(shot.is_empty_net?)),
        "has_setup" => Number(flag(pass.is_some())),
        "setup_elapsed" => Number(pass?.elapsed),
        "setup_lateral_distance" => Number(pass?.lateral_distance),
        "setup_distance" => Number(pass?.setup_distance),
        "setup_angle" => Number(pass?.setup_angle),
        "setup_immediacy" => Number(pass?.immediacy_score),
        "setup_quality" => Number(pass?.setup_quality),
        "setup_cross_ice" => Number(flag(pass?.is_cross_ice)),
        "shot_type" => Category(shot.shot_type.clone()?),
        "strength" => Category(shot.strength?.as_str().to_string()),
        "setup_zone" => Category(pass?.zone.as_str().to_string()),
        "setup_kind" => Category(pass?.setup_kind.clone()),
        _ => return None,
    };
    Some(value)
}

/// Applies a manifest to shots
#[derive(Debug, Clone)]
pub struct FeatureVectorBuilder {
    manifest: FeatureManifest,
}

impl FeatureVectorBuilder {
    pub fn new(manifest: FeatureManifest) -> Self {
        Self { manifest }
    }

    pub fn manifest(&self) -> &FeatureManifest {
        &self.manifest
    }

    pub fn build(&self, shot: &ShotFeatures) -> Vec<f64> {
        self.manifest
            .features
            .iter()
            .map(|spec| match raw_feature(&spec.name, shot) {
                Some(RawFeature::Number(v)) if v.is_finite() => v,
                Some(RawFeature::Category(c)) => spec
                    .encoder
                    .as_ref()
                    .map(|enc| enc.encode(&c))
                    .unwrap_or_else(|| spec.fill.fill_value()),
                // Missing categories land in the learned unknown bucket
                _ if spec.kind == FeatureKind::Categorical => spec
                    .encoder
                    .as_ref()
                    .map(|enc| enc.unknown)
                    .unwrap_or_else(|| spec.fill.fill_value()),
                _ => spec.fill.fill_value(),
            })
            .collect()
    }
}
