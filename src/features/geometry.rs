//! Rink geometry: which net a team attacks, and distance/angle to it.

use std::collections::BTreeMap;

use super::parse::TeamContext;
use crate::domain::{PlayEvent, Point, RinkSide, ZoneFlag};

/// Goal line distance from centre ice, in feet
pub const NET_X: f64 = 89.0;

pub fn net_point(side: RinkSide) -> Point {
    Point {
        x: NET_X * side.sign(),
        y: 0.0,
    }
}

/// Euclidean distance to the centre of the attacked net.
pub fn distance_to_net(p: Point, net: RinkSide) -> f64 {
    let n = net_point(net);
    ((p.x - n.x).powi(2) + (p.y - n.y).powi(2)).sqrt()
}

/// atan(|y| / |Δx|) in degrees, always within [0, 90].
pub fn angle_to_net(p: Point, net: RinkSide) -> f64 {
    let dx = (net_point(net).x - p.x).abs();
    p.y.abs().atan2(dx).to_degrees().clamp(0.0, 90.0)
}

/// Beyond the goal line of the attacked net
pub fn is_behind_net(p: Point, net: RinkSide) -> bool {
    p.x * net.sign() > NET_X
}

/// Side the home team attacks, per period.
///
/// Built once per game. Resolution order for a single event is the
/// event's own defending-side flag, then its zone flag, then what the
/// rest of the period (or a period of the same parity) says, and finally
/// the sign of x.
#[derive(Debug, Clone, Default)]
pub struct DirectionResolver {
    home_attacks: BTreeMap<u8, RinkSide>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Votes {
    left: u32,
    right: u32,
}

impl DirectionResolver {
    pub fn from_events(events: &[PlayEvent], teams: &TeamContext) -> Self {
        let mut votes: BTreeMap<u8, Votes> = BTreeMap::new();
        for e in events {
            if let Some(side) = home_attack_hint(e, teams) {
                let v = votes.entry(e.period).or_default();
                match side {
                    RinkSide::Left => v.left += 1,
                    RinkSide::Right => v.right += 1,
                }
            }
        }

        let home_attacks = votes
            .into_iter()
            .filter(|(_, v)| v.left != v.right)
            .map(|(period, v)| {
                let side = if v.right > v.left {
                    RinkSide::Right
                } else {
                    RinkSide::Left
                };
                (period, side)
            })
            .collect();
        Self { home_attacks }
    }

    /// Home attacking side in `period`, inferred from the nearest period
    /// with evidence (teams switch ends every period).
    pub fn home_attacking_side(&self, period: u8) -> Option<RinkSide> {
        if let Some(side) = self.home_attacks.get(&period) {
            return Some(*side);
        }
        let (known, side) = self
            .home_attacks
            .iter()
            .min_by_key(|(p, _)| (i16::from(**p) - i16::from(period)).abs())?;
        let same_parity = (i16::from(*known) - i16::from(period)) % 2 == 0;
        Some(if same_parity { *side } else { side.opposite() })
    }

    /// Net attacked by `team_id` at the moment of `event`.
    pub fn attacked_net(&self, event: &PlayEvent, team_id: i64, teams: &TeamContext) -> Option<RinkSide> {
        let for_team = |home_side: RinkSide| {
            if teams.is_home(team_id) {
                home_side
            } else {
                home_side.opposite()
            }
        };

        if let Some(home_side) = event.home_defending.map(|d| d.opposite()) {
            return Some(for_team(home_side));
        }
        if event.team_id == Some(team_id) {
            if let Some(side) = zone_attack_side(event) {
                return Some(side);
            }
        }
        if let Some(home_side) = self.home_attacking_side(event.period) {
            return Some(for_team(home_side));
        }
        let p = event.coords?;
        (p.x != 0.0).then(|| RinkSide::from_sign(p.x))
    }
}

/// Side attacked by the event's owner, from its zone flag and x.
fn zone_attack_side(event: &PlayEvent) -> Option<RinkSide> {
    let p = event.coords?;
    if p.x == 0.0 {
        return None;
    }
    match event.zone? {
        ZoneFlag::Offensive => Some(RinkSide::from_sign(p.x)),
        ZoneFlag::Defensive => Some(RinkSide::from_sign(p.x).opposite()),
        ZoneFlag::Neutral => None,
    }
}

fn home_attack_hint(event: &PlayEvent, teams: &TeamContext) -> Option<RinkSide> {
    if let Some(defending) = event.home_defending {
        return Some(defending.opposite());
    }
    let owner = event.team_id?;
    let side = zone_attack_side(event)?;
    if teams.is_home(owner) {
        Some(side)
    } else if owner == teams.away_id {
        Some(side.opposite())
    } else {
        None
    }
}
