use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream-reported phase of a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Not started yet (includes pre-game warmup)
    Scheduled,
    /// Puck in play
    Live,
    /// Between periods
    Intermission,
    /// Late-game, high-leverage phase
    Critical,
    /// Game over; data may still be corrected upstream
    Final,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Scheduled => "SCHEDULED",
            LifecycleState::Live => "LIVE",
            LifecycleState::Intermission => "INTERMISSION",
            LifecycleState::Critical => "CRITICAL",
            LifecycleState::Final => "FINAL",
        }
    }

    /// Map the provider's `gameState` code.
    ///
    /// `in_intermission` comes from the provider clock block; the state code
    /// itself stays `LIVE` between periods.
    pub fn from_upstream(code: &str, in_intermission: bool) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "FUT" | "PRE" | "SCHEDULED" => Some(LifecycleState::Scheduled),
            "LIVE" if in_intermission => Some(LifecycleState::Intermission),
            "LIVE" => Some(LifecycleState::Live),
            "INTERMISSION" => Some(LifecycleState::Intermission),
            "CRIT" | "CRITICAL" => Some(LifecycleState::Critical),
            "FINAL" | "OFF" => Some(LifecycleState::Final),
            _ => None,
        }
    }

    /// Live, critical or intermission: the game is being played.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            LifecycleState::Live | LifecycleState::Intermission | LifecycleState::Critical
        )
    }

    /// States that start tracking a game on first observation
    pub fn is_trackable(&self) -> bool {
        self.is_active() || *self == LifecycleState::Final
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, target) {
            // Self-loops while re-fetching
            (a, b) if *a == b => true,

            // From Scheduled
            (Scheduled, Live) | (Scheduled, Critical) | (Scheduled, Intermission) => true,
            // Late discovery of a finished game
            (Scheduled, Final) => true,

            // Between active phases
            (Live, Intermission) | (Live, Critical) => true,
            (Intermission, Live) | (Intermission, Critical) => true,
            (Critical, Live) | (Critical, Intermission) => true,

            // Game end
            (Live, Final) | (Intermission, Final) | (Critical, Final) => true,

            // Final is terminal
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for LifecycleState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        LifecycleState::from_upstream(s, false).ok_or_else(|| format!("Unknown lifecycle state: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_upstream_codes() {
        assert_eq!(
            LifecycleState::from_upstream("FUT", false),
            Some(LifecycleState::Scheduled)
        );
        assert_eq!(
            LifecycleState::from_upstream("LIVE", true),
            Some(LifecycleState::Intermission)
        );
        assert_eq!(
            LifecycleState::from_upstream("CRIT", false),
            Some(LifecycleState::Critical)
        );
        assert_eq!(
            LifecycleState::from_upstream("OFF", false),
            Some(LifecycleState::Final)
        );
        assert_eq!(LifecycleState::from_upstream("???", false), None);
    }

    #[test]
    fn final_is_terminal() {
        use LifecycleState::*;
        for target in [Scheduled, Live, Intermission, Critical] {
            assert!(!Final.can_transition_to(target));
        }
        assert!(Final.can_transition_to(Final));
        assert!(Live.can_transition_to(Final));
        assert!(!Live.can_transition_to(Scheduled));
    }

    #[test]
    fn round_trips_through_str() {
        for s in [
            LifecycleState::Scheduled,
            LifecycleState::Live,
            LifecycleState::Intermission,
            LifecycleState::Critical,
            LifecycleState::Final,
        ] {
            assert_eq!(LifecycleState::try_from(s.as_str()).unwrap(), s);
        }
    }
}
