use serde::{Deserialize, Serialize};
use std::fmt;

use super::ShotKind;

/// Manpower situation relative to the shooting team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    EvenStrength,
    PowerPlay,
    PenaltyKill,
    /// Opposing goalie pulled
    EmptyNet,
}

impl Strength {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strength::EvenStrength => "even_strength",
            Strength::PowerPlay => "power_play",
            Strength::PenaltyKill => "penalty_kill",
            Strength::EmptyNet => "empty_net",
        }
    }
}

impl fmt::Display for Strength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Danger bucket of the setup location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupZone {
    BehindNet,
    Crease,
    Slot,
    Circle,
    HighSlot,
    Point,
    /// Long and wide: far from the net at a sharp angle
    Perimeter,
}

impl SetupZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupZone::BehindNet => "behind_net",
            SetupZone::Crease => "crease",
            SetupZone::Slot => "slot",
            SetupZone::Circle => "circle",
            SetupZone::HighSlot => "high_slot",
            SetupZone::Point => "point",
            SetupZone::Perimeter => "perimeter",
        }
    }

    /// Relative danger weight used by the setup-quality score
    pub fn weight(&self) -> f64 {
        match self {
            SetupZone::Crease => 1.0,
            SetupZone::Slot => 0.9,
            SetupZone::BehindNet => 0.8,
            SetupZone::HighSlot => 0.6,
            SetupZone::Circle => 0.5,
            SetupZone::Point => 0.35,
            SetupZone::Perimeter => 0.25,
        }
    }
}

impl fmt::Display for SetupZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Puck-movement event immediately preceding a shot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassContext {
    pub setup_index: usize,
    /// Event kind label of the setup
    pub setup_kind: String,
    pub setup_player_id: Option<i64>,
    pub setup_x: f64,
    pub setup_y: f64,
    /// Seconds between setup and shot
    pub elapsed: f64,
    /// |Δy| between setup and shot
    pub lateral_distance: f64,
    pub setup_distance: f64,
    pub setup_angle: f64,
    pub zone: SetupZone,
    /// 1 − elapsed/window, floored at 0
    pub immediacy_score: f64,
    pub setup_quality: f64,
    pub is_cross_ice: bool,
}

/// Extracted, unscored shot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotFeatures {
    pub game_id: i64,
    pub event_index: usize,
    pub period: u8,
    /// Seconds elapsed in the period
    pub time_in_period: f64,
    pub team_id: i64,
    pub shooter_id: i64,
    pub goalie_id: Option<i64>,
    pub shot_kind: ShotKind,
    pub shot_type: Option<String>,
    pub is_goal: bool,
    pub x: f64,
    pub y: f64,
    pub distance: f64,
    pub angle: f64,
    pub is_rebound: bool,
    pub time_since_last_event: Option<f64>,
    /// Seconds since the nearest preceding shot-type event in the period
    pub time_since_last_shot: Option<f64>,
    /// 0 = not a rebound, 1 = rebound, 2 = rebound of a rebound, ...
    pub rebound_chain: u8,
    pub rebound_source_index: Option<usize>,
    pub strength: Option<Strength>,
    pub own_skaters: Option<u8>,
    pub opp_skaters: Option<u8>,
    pub is_power_play: Option<bool>,
    pub is_empty_net: Option<bool>,
    pub pass_context: Option<PassContext>,
}

/// A scored shot, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRecord {
    #[serde(flatten)]
    pub features: ShotFeatures,
    pub expected_goal_value: f64,
    pub expected_assist_value: Option<f64>,
    pub flurry_adjusted_value: f64,
}

impl ShotRecord {
    pub fn game_id(&self) -> i64 {
        self.features.game_id
    }
}
