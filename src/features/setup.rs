//! Setup (pass) context of a shot.

use super::geometry::{angle_to_net, distance_to_net, is_behind_net};
use crate::domain::{EventKind, PassContext, PlayEvent, Point, RinkSide, SetupZone};

/// Distance at which setup proximity reaches zero, in feet
pub const PROXIMITY_RANGE_FT: f64 = 60.0;
/// Lateral movement that counts as a cross-ice feed, in feet
pub const CROSS_ICE_MIN_FT: f64 = 20.0;

const ZONE_WEIGHT: f64 = 0.5;
const IMMEDIACY_WEIGHT: f64 = 0.3;
const PROXIMITY_WEIGHT: f64 = 0.2;

/// Bucket a setup location by distance and angle to the attacked net.
pub fn classify_zone(distance: f64, angle: f64, behind_net: bool) -> SetupZone {
    if behind_net {
        SetupZone::BehindNet
    } else if distance <= 10.0 {
        SetupZone::Crease
    } else if distance <= 25.0 && angle <= 45.0 {
        SetupZone::Slot
    } else if distance <= 35.0 {
        SetupZone::Circle
    } else if distance <= 45.0 && angle <= 30.0 {
        SetupZone::HighSlot
    } else if angle <= 45.0 {
        SetupZone::Point
    } else {
        SetupZone::Perimeter
    }
}

/// 1 at the instant of the setup, 0 at (and beyond) the window edge.
pub fn immediacy(elapsed: f64, window: f64) -> f64 {
    if window <= 0.0 {
        return 0.0;
    }
    (1.0 - elapsed / window).max(0.0)
}

pub fn proximity(distance: f64) -> f64 {
    (1.0 - distance / PROXIMITY_RANGE_FT).clamp(0.0, 1.0)
}

pub fn setup_quality(zone: SetupZone, immediacy: f64, proximity: f64) -> f64 {
    ZONE_WEIGHT * zone.weight() + IMMEDIACY_WEIGHT * immediacy + PROXIMITY_WEIGHT * proximity
}

fn setup_player(event: &PlayEvent) -> Option<i64> {
    match &event.kind {
        EventKind::Pass { passer } => *passer,
        EventKind::Hit { hitter } => *hitter,
        EventKind::Giveaway { player } | EventKind::Takeaway { player } => *player,
        _ => None,
    }
}

/// Context of `setup` for a shot from `shot_at`, both measured against `net`.
pub fn build_pass_context(
    setup: &PlayEvent,
    setup_at: Point,
    shot_at: Point,
    net: RinkSide,
    elapsed: f64,
    window: f64,
) -> PassContext {
    let setup_distance = distance_to_net(setup_at, net);
    let setup_angle = angle_to_net(setup_at, net);
    let zone = classify_zone(setup_distance, setup_angle, is_behind_net(setup_at, net));
    let immediacy_score = immediacy(elapsed, window);
    let lateral_distance = (shot_at.y - setup_at.y).abs();
    let crosses_centre = setup_at.y * shot_at.y < 0.0;
    let is_cross_ice = lateral_distance >= CROSS_ICE_MIN_FT && crosses_centre;

    PassContext {
        setup_index: setup.index,
        setup_kind: setup.kind.label().to_string(),
        setup_player_id: setup_player(setup),
        setup_x: setup_at.x,
        setup_y: setup_at.y,
        elapsed,
        lateral_distance,
        setup_distance,
        setup_angle,
        zone,
        immediacy_score,
        setup_quality: setup_quality(zone, immediacy_score, proximity(setup_distance)),
        is_cross_ice,
    }
}
