use serde::{Deserialize, Serialize};
use std::fmt;

use super::Strength;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Goals allowed per unblocked shot on net faced
    Goalie,
    /// Goals per unblocked attempt
    Shooter,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Goalie => "goalie",
            EntityType::Shooter => "shooter",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Situation bucket used for aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RateSituation {
    #[serde(rename = "all")]
    All,
    #[serde(rename = "ev")]
    Even,
    #[serde(rename = "pp")]
    PowerPlay,
    #[serde(rename = "pk")]
    PenaltyKill,
}

impl RateSituation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateSituation::All => "all",
            RateSituation::Even => "ev",
            RateSituation::PowerPlay => "pp",
            RateSituation::PenaltyKill => "pk",
        }
    }

    /// Bucket for a shot's strength, from the shooter's side.
    /// Empty-net and unknown strength only count towards `All`.
    pub fn from_strength(strength: Option<Strength>) -> Option<Self> {
        match strength? {
            Strength::EvenStrength => Some(RateSituation::Even),
            Strength::PowerPlay => Some(RateSituation::PowerPlay),
            Strength::PenaltyKill => Some(RateSituation::PenaltyKill),
            Strength::EmptyNet => None,
        }
    }

    /// Same bucket seen from the defending side
    pub fn mirrored(&self) -> Self {
        match self {
            RateSituation::PowerPlay => RateSituation::PenaltyKill,
            RateSituation::PenaltyKill => RateSituation::PowerPlay,
            other => *other,
        }
    }
}

impl fmt::Display for RateSituation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Season-level rate for one entity, regressed toward the league baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRateAggregate {
    /// `{entity_type}:{season}`, the replace-key of a regeneration run
    pub scope: String,
    pub entity_type: EntityType,
    pub entity_id: i64,
    pub situation: RateSituation,
    pub season: i64,
    pub sample_size: f64,
    pub raw_rate: f64,
    pub regressed_rate: f64,
    pub baseline_rate: f64,
    pub prior_strength: f64,
}

pub fn rate_scope(entity_type: EntityType, season: i64) -> String {
    format!("{}:{}", entity_type.as_str(), season)
}
