//! Play-by-play events as a closed set of kinds.
//!
//! The provider payload is loosely typed; parsing (see `features::parse`)
//! folds every entry into one of these variants so that the extractor can
//! match on kinds instead of probing JSON keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rink coordinates in feet, origin at centre ice
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Largest |x| / |y| the rink allows (boards at 100 / 42.5 ft).
    pub const MAX_X: f64 = 100.0;
    pub const MAX_Y: f64 = 42.5;

    /// Returns `None` for non-finite or off-rink coordinates.
    pub fn checked(x: f64, y: f64) -> Option<Self> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        if x.abs() > Self::MAX_X || y.abs() > Self::MAX_Y {
            return None;
        }
        Some(Self { x, y })
    }
}

/// Zone of the event relative to the team that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneFlag {
    Offensive,
    Neutral,
    Defensive,
}

impl ZoneFlag {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "O" | "o" => Some(ZoneFlag::Offensive),
            "N" | "n" => Some(ZoneFlag::Neutral),
            "D" | "d" => Some(ZoneFlag::Defensive),
            _ => None,
        }
    }
}

/// Side of the rink as drawn by the provider (left = negative x)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RinkSide {
    Left,
    Right,
}

impl RinkSide {
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Some(RinkSide::Left),
            "right" => Some(RinkSide::Right),
            _ => None,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            RinkSide::Left => RinkSide::Right,
            RinkSide::Right => RinkSide::Left,
        }
    }

    /// +1 for the right side, -1 for the left side
    pub fn sign(&self) -> f64 {
        match self {
            RinkSide::Left => -1.0,
            RinkSide::Right => 1.0,
        }
    }

    pub fn from_sign(v: f64) -> Self {
        if v < 0.0 {
            RinkSide::Left
        } else {
            RinkSide::Right
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotKind {
    OnGoal,
    Missed,
    Blocked,
    Goal,
}

impl ShotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotKind::OnGoal => "on_goal",
            ShotKind::Missed => "missed",
            ShotKind::Blocked => "blocked",
            ShotKind::Goal => "goal",
        }
    }

    /// Unblocked attempts get a shot record; blocked ones only feed rebounds.
    pub fn is_unblocked(&self) -> bool {
        !matches!(self, ShotKind::Blocked)
    }

    /// On goal from the goalie's perspective (saves plus goals)
    pub fn is_on_net(&self) -> bool {
        matches!(self, ShotKind::OnGoal | ShotKind::Goal)
    }
}

impl fmt::Display for ShotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    Faceoff {
        winner: Option<i64>,
        loser: Option<i64>,
    },
    Shot {
        kind: ShotKind,
        shooter: i64,
        goalie: Option<i64>,
        shot_type: Option<String>,
    },
    Pass {
        passer: Option<i64>,
    },
    Hit {
        hitter: Option<i64>,
    },
    Giveaway {
        player: Option<i64>,
    },
    Takeaway {
        player: Option<i64>,
    },
    Penalty,
    Stoppage,
    PeriodBoundary,
    /// Recognised kinds that carry nothing the extractor uses
    Other {
        type_key: String,
    },
    /// Placed in time, but the kind-specific details are unusable
    Unparsed {
        type_key: String,
        reason: String,
    },
}

impl EventKind {
    pub fn label(&self) -> &str {
        match self {
            EventKind::Faceoff { .. } => "faceoff",
            EventKind::Shot { kind, .. } => kind.as_str(),
            EventKind::Pass { .. } => "pass",
            EventKind::Hit { .. } => "hit",
            EventKind::Giveaway { .. } => "giveaway",
            EventKind::Takeaway { .. } => "takeaway",
            EventKind::Penalty => "penalty",
            EventKind::Stoppage => "stoppage",
            EventKind::PeriodBoundary => "period_boundary",
            EventKind::Other { type_key } => type_key,
            EventKind::Unparsed { type_key, .. } => type_key,
        }
    }
}

/// One ordered play-by-play entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayEvent {
    /// Position in the provider's list
    pub index: usize,
    pub sort_order: Option<i64>,
    pub period: u8,
    /// Seconds elapsed in the period
    pub seconds: f64,
    /// Team the provider attributes the event to
    pub team_id: Option<i64>,
    pub coords: Option<Point>,
    pub situation_code: Option<String>,
    pub zone: Option<ZoneFlag>,
    pub home_defending: Option<RinkSide>,
    pub kind: EventKind,
}

impl PlayEvent {
    pub fn is_shot_type(&self) -> bool {
        matches!(self.kind, EventKind::Shot { .. })
    }

    pub fn is_faceoff(&self) -> bool {
        matches!(self.kind, EventKind::Faceoff { .. })
    }

    pub fn shot_kind(&self) -> Option<ShotKind> {
        match &self.kind {
            EventKind::Shot { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Team that took the shot.
    ///
    /// Blocked shots are attributed to the blocking team upstream, so the
    /// shooter's team is the other one.
    pub fn shooting_team(&self, home_id: i64, away_id: i64) -> Option<i64> {
        let owner = self.team_id?;
        match self.shot_kind()? {
            ShotKind::Blocked => {
                if owner == home_id {
                    Some(away_id)
                } else if owner == away_id {
                    Some(home_id)
                } else {
                    None
                }
            }
            _ => Some(owner),
        }
    }

    /// Whether this event can serve as the setup of a shot.
    ///
    /// Anything but a faceoff qualifies; teamless events never match the
    /// shooter's team.
    pub fn is_setup_candidate(&self) -> bool {
        !self.is_faceoff()
    }
}
