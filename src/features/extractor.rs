//! Shot feature extraction over one game's ordered events.
//!
//! A single forward pass. State is a bounded look-back buffer of recent
//! events for setup detection, plus a memo of the most recent shot-type
//! event for rebound chains. Both reset at period boundaries.

use std::collections::VecDeque;
use tracing::{debug, warn};

use super::geometry::{angle_to_net, distance_to_net, DirectionResolver};
use super::parse::ParsedGame;
use super::setup::build_pass_context;
use super::situation::SituationCode;
use crate::config::ExtractionConfig;
use crate::domain::{EventKind, PassContext, PlayEvent, RinkSide, ShotFeatures, ShotKind};
use crate::error::ExtractError;

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub lookback_events: usize,
    pub rebound_window_secs: f64,
    pub pass_window_secs: f64,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self::from(&ExtractionConfig::default())
    }
}

impl From<&ExtractionConfig> for ExtractorSettings {
    fn from(cfg: &ExtractionConfig) -> Self {
        Self {
            lookback_events: cfg.lookback_events.max(1),
            rebound_window_secs: cfg.rebound_window_secs,
            pass_window_secs: cfg.pass_window_secs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub events_seen: usize,
    pub malformed_events: usize,
    pub unparsed_events: usize,
    pub shot_events: usize,
    pub blocked_shots: usize,
    pub shots_extracted: usize,
    pub skipped_missing_geometry: usize,
    pub skipped_unknown_team: usize,
    pub goals: usize,
}

/// Event that was skipped or could not be used fully
#[derive(Debug, Clone, PartialEq)]
pub struct EventAnomaly {
    pub game_id: i64,
    pub event_index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    pub shots: Vec<ShotFeatures>,
    pub stats: ExtractionStats,
    pub anomalies: Vec<EventAnomaly>,
}

#[derive(Debug, Clone, Copy)]
struct ShotMemo {
    index: usize,
    seconds: f64,
    team: Option<i64>,
    chain: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct ReboundInfo {
    is_rebound: bool,
    chain: u8,
    source: Option<usize>,
    since_last_shot: Option<f64>,
}

pub struct EventExtractor {
    settings: ExtractorSettings,
}

impl EventExtractor {
    pub fn new(settings: ExtractorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    pub fn extract(&self, game: &ParsedGame) -> ExtractionOutput {
        let mut out = ExtractionOutput::default();
        out.stats.events_seen = game.events.len() + game.malformed.len();
        out.stats.malformed_events = game.malformed.len();
        for err in &game.malformed {
            out.anomalies.push(EventAnomaly {
                game_id: game.game_id,
                event_index: err.index(),
                reason: err.to_string(),
            });
        }

        let resolver = DirectionResolver::from_events(&game.events, &game.teams);
        let mut recent: VecDeque<&PlayEvent> = VecDeque::with_capacity(self.settings.lookback_events + 1);
        let mut last_shot: Option<ShotMemo> = None;
        let mut previous: Option<&PlayEvent> = None;
        let mut period: Option<u8> = None;

        for event in &game.events {
            if period != Some(event.period) {
                recent.clear();
                last_shot = None;
                previous = None;
                period = Some(event.period);
            }

            if let EventKind::Unparsed { reason, .. } = &event.kind {
                out.stats.unparsed_events += 1;
                out.anomalies.push(EventAnomaly {
                    game_id: game.game_id,
                    event_index: event.index,
                    reason: reason.clone(),
                });
            }

            let since_previous = previous.map(|p| (event.seconds - p.seconds).max(0.0));

            if let EventKind::Shot { kind, .. } = &event.kind {
                out.stats.shot_events += 1;
                let team = event.shooting_team(game.teams.home_id, game.teams.away_id);
                let rebound = self.rebound_info(last_shot, event, team);
                last_shot = Some(ShotMemo {
                    index: event.index,
                    seconds: event.seconds,
                    team,
                    chain: rebound.chain,
                });

                if *kind == ShotKind::Blocked {
                    out.stats.blocked_shots += 1;
                } else {
                    match self.build_shot(game, &resolver, &recent, event, team, rebound, since_previous) {
                        Ok(shot) => {
                            if shot.is_goal {
                                out.stats.goals += 1;
                            }
                            out.stats.shots_extracted += 1;
                            out.shots.push(shot);
                        }
                        Err(skip) => {
                            match skip {
                                Skip::Geometry(_) => out.stats.skipped_missing_geometry += 1,
                                Skip::UnknownTeam => out.stats.skipped_unknown_team += 1,
                            }
                            out.anomalies.push(EventAnomaly {
                                game_id: game.game_id,
                                event_index: event.index,
                                reason: skip.to_string(),
                            });
                        }
                    }
                }
            }

            recent.push_back(event);
            while recent.len() > self.settings.lookback_events {
                recent.pop_front();
            }
            previous = Some(event);
        }

        if !out.anomalies.is_empty() {
            warn!(
                game_id = game.game_id,
                anomalies = out.anomalies.len(),
                "Extraction skipped or degraded some events"
            );
        }
        debug!(
            game_id = game.game_id,
            shots = out.stats.shots_extracted,
            blocked = out.stats.blocked_shots,
            "Extracted shots"
        );
        out
    }

    fn rebound_info(&self, last: Option<ShotMemo>, event: &PlayEvent, team: Option<i64>) -> ReboundInfo {
        let Some(last) = last else {
            return ReboundInfo::default();
        };
        let elapsed = (event.seconds - last.seconds).max(0.0);
        let is_rebound =
            team.is_some() && last.team == team && elapsed <= self.settings.rebound_window_secs;
        ReboundInfo {
            is_rebound,
            chain: if is_rebound { last.chain.saturating_add(1) } else { 0 },
            source: is_rebound.then_some(last.index),
            since_last_shot: Some(elapsed),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_shot(
        &self,
        game: &ParsedGame,
        resolver: &DirectionResolver,
        recent: &VecDeque<&PlayEvent>,
        event: &PlayEvent,
        team: Option<i64>,
        rebound: ReboundInfo,
        since_previous: Option<f64>,
    ) -> Result<ShotFeatures, Skip> {
        let EventKind::Shot {
            kind,
            shooter,
            goalie,
            shot_type,
        } = &event.kind
        else {
            return Err(Skip::UnknownTeam);
        };
        let team = team
            .filter(|t| game.teams.opponent(*t).is_some())
            .ok_or(Skip::UnknownTeam)?;
        let at = event.coords.ok_or(Skip::Geometry(ExtractError::MissingGeometry {
            index: event.index,
        }))?;
        let net = resolver
            .attacked_net(event, team, &game.teams)
            .ok_or(Skip::Geometry(ExtractError::MissingGeometry { index: event.index }))?;

        let manpower = event
            .situation_code
            .as_deref()
            .and_then(SituationCode::parse)
            .map(|code| code.relative_to(game.teams.is_home(team)));

        Ok(ShotFeatures {
            game_id: game.game_id,
            event_index: event.index,
            period: event.period,
            time_in_period: event.seconds,
            team_id: team,
            shooter_id: *shooter,
            goalie_id: *goalie,
            shot_kind: *kind,
            shot_type: shot_type.clone(),
            is_goal: *kind == ShotKind::Goal,
            x: at.x,
            y: at.y,
            distance: distance_to_net(at, net),
            angle: angle_to_net(at, net),
            is_rebound: rebound.is_rebound,
            time_since_last_event: since_previous,
            time_since_last_shot: rebound.since_last_shot,
            rebound_chain: rebound.chain,
            rebound_source_index: rebound.source,
            strength: manpower.map(|m| m.strength),
            own_skaters: manpower.map(|m| m.own_skaters),
            opp_skaters: manpower.map(|m| m.opp_skaters),
            is_power_play: manpower.map(|m| m.is_power_play()),
            is_empty_net: manpower.map(|m| m.is_empty_net()),
            pass_context: self.find_setup(recent, event, team, net),
        })
    }

    /// Most recent same-team setup inside the pass window.
    fn find_setup(
        &self,
        recent: &VecDeque<&PlayEvent>,
        shot: &PlayEvent,
        team: i64,
        net: RinkSide,
    ) -> Option<PassContext> {
        let shot_at = shot.coords?;
        for candidate in recent.iter().rev() {
            let elapsed = shot.seconds - candidate.seconds;
            if elapsed > self.settings.pass_window_secs {
                break;
            }
            if candidate.team_id != Some(team) || !candidate.is_setup_candidate() {
                continue;
            }
            let Some(setup_at) = candidate.coords else {
                continue;
            };
            return Some(build_pass_context(
                candidate,
                setup_at,
                shot_at,
                net,
                elapsed.max(0.0),
                self.settings.pass_window_secs,
            ));
        }
        None
    }
}

#[derive(Debug)]
enum Skip {
    Geometry(ExtractError),
    UnknownTeam,
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Skip::Geometry(e) => write!(f, "{e}"),
            Skip::UnknownTeam => write!(f, "shot without a known shooting team"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Point, SetupZone, Strength};
    use crate::features::parse::TeamContext;

    const HOME: i64 = 1;
    const AWAY: i64 = 2;

    fn ev(index: usize, seconds: f64, team: i64, x: f64, y: f64, kind: EventKind) -> PlayEvent {
        PlayEvent {
            index,
            sort_order: Some(index as i64),
            period: 1,
            seconds,
            team_id: Some(team),
            coords: Point::checked(x, y),
            situation_code: Some("1551".to_string()),
            zone: None,
            home_defending: Some(RinkSide::Left),
            kind,
        }
    }

    fn shot(kind: ShotKind) -> EventKind {
        EventKind::Shot {
            kind,
            shooter: 99,
            goalie: Some(31),
            shot_type: Some("wrist".into()),
        }
    }

    fn game(events: Vec<PlayEvent>) -> ParsedGame {
        ParsedGame {
            game_id: 2023020001,
            teams: TeamContext {
                home_id: HOME,
                away_id: AWAY,
            },
            events,
            malformed: Vec::new(),
        }
    }

    fn extract(events: Vec<PlayEvent>) -> ExtractionOutput {
        EventExtractor::new(ExtractorSettings::default()).extract(&game(events))
    }

    #[test]
    fn rebound_inside_window() {
        let out = extract(vec![
            ev(0, 10.0, HOME, 80.0, 5.0, shot(ShotKind::OnGoal)),
            ev(1, 12.0, HOME, 84.0, -2.0, shot(ShotKind::OnGoal)),
        ]);
        assert_eq!(out.shots.len(), 2);
        let second = &out.shots[1];
        assert!(second.is_rebound);
        assert_eq!(second.rebound_chain, 1);
        assert_eq!(second.rebound_source_index, Some(0));
        assert_eq!(second.time_since_last_shot, Some(2.0));
    }

    #[test]
    fn no_rebound_outside_window() {
        let out = extract(vec![
            ev(0, 10.0, HOME, 80.0, 5.0, shot(ShotKind::OnGoal)),
            ev(1, 13.5, HOME, 84.0, -2.0, shot(ShotKind::OnGoal)),
        ]);
        let second = &out.shots[1];
        assert!(!second.is_rebound);
        assert_eq!(second.rebound_chain, 0);
        assert_eq!(second.time_since_last_shot, Some(3.5));
    }

    #[test]
    fn opposing_shot_breaks_rebound() {
        let out = extract(vec![
            ev(0, 10.0, HOME, 80.0, 5.0, shot(ShotKind::OnGoal)),
            ev(1, 11.0, AWAY, -80.0, 5.0, shot(ShotKind::Missed)),
            ev(2, 12.0, HOME, 84.0, -2.0, shot(ShotKind::OnGoal)),
        ]);
        assert!(out.shots.iter().all(|s| !s.is_rebound));
    }

    #[test]
    fn blocked_shot_feeds_rebound_but_is_not_recorded() {
        // the blocking team (away) owns the blocked event
        let out = extract(vec![
            ev(0, 10.0, AWAY, 70.0, 5.0, shot(ShotKind::Blocked)),
            ev(1, 11.0, HOME, 82.0, 1.0, shot(ShotKind::Goal)),
        ]);
        assert_eq!(out.shots.len(), 1);
        assert_eq!(out.stats.blocked_shots, 1);
        let goal = &out.shots[0];
        assert!(goal.is_goal);
        assert!(goal.is_rebound);
        assert_eq!(goal.rebound_source_index, Some(0));
    }

    #[test]
    fn rebound_chain_grows() {
        let out = extract(vec![
            ev(0, 10.0, HOME, 80.0, 5.0, shot(ShotKind::OnGoal)),
            ev(1, 11.0, HOME, 84.0, -2.0, shot(ShotKind::OnGoal)),
            ev(2, 12.0, HOME, 86.0, 1.0, shot(ShotKind::Goal)),
        ]);
        assert_eq!(out.shots[2].rebound_chain, 2);
        assert_eq!(out.shots[2].rebound_source_index, Some(1));
    }

    #[test]
    fn setup_context_from_recent_pass() {
        let out = extract(vec![
            ev(0, 0.0, HOME, 0.0, 0.0, EventKind::Faceoff { winner: None, loser: None }),
            ev(1, 10.0, HOME, 60.0, 10.0, EventKind::Pass { passer: Some(12) }),
            ev(2, 11.5, HOME, 85.0, 3.0, shot(ShotKind::OnGoal)),
        ]);
        assert_eq!(out.shots.len(), 1);
        let s = &out.shots[0];
        assert!(!s.is_rebound);
        assert_eq!(s.time_since_last_event, Some(1.5));
        let ctx = s.pass_context.as_ref().unwrap();
        assert_eq!(ctx.setup_index, 1);
        assert!((ctx.elapsed - 1.5).abs() < 1e-9);
        assert!((ctx.immediacy_score - 0.5).abs() < 1e-9);
        assert_eq!(ctx.lateral_distance, 7.0);
        assert_eq!(ctx.zone, SetupZone::Circle);
        assert!(!ctx.is_cross_ice);
        assert_eq!(s.strength, Some(Strength::EvenStrength));
        assert!((s.distance - 5.0).abs() < 1e-9);
    }

    #[test]
    fn setup_outside_window_or_other_team_is_ignored() {
        let out = extract(vec![
            ev(0, 5.0, HOME, 60.0, 10.0, EventKind::Pass { passer: None }),
            ev(1, 9.0, AWAY, -60.0, 10.0, EventKind::Hit { hitter: None }),
            ev(2, 9.5, HOME, 85.0, 3.0, shot(ShotKind::Missed)),
        ]);
        assert!(out.shots[0].pass_context.is_none());
    }

    #[test]
    fn faceoff_is_never_a_setup() {
        let out = extract(vec![
            ev(0, 10.0, HOME, 69.0, 22.0, EventKind::Faceoff { winner: None, loser: None }),
            ev(1, 11.0, HOME, 80.0, 5.0, shot(ShotKind::OnGoal)),
        ]);
        assert!(out.shots[0].pass_context.is_none());
    }

    #[test]
    fn same_team_shot_is_a_setup() {
        let out = extract(vec![
            ev(0, 10.0, HOME, 80.0, 15.0, shot(ShotKind::Missed)),
            ev(1, 11.0, HOME, 84.0, -2.0, shot(ShotKind::OnGoal)),
        ]);
        let ctx = out.shots[1].pass_context.as_ref().unwrap();
        assert_eq!(ctx.setup_index, 0);
        assert!((ctx.elapsed - 1.0).abs() < 1e-9);
        assert_eq!(ctx.lateral_distance, 17.0);
    }

    #[test]
    fn teamless_events_are_not_setups() {
        let mut stoppage = ev(0, 10.0, HOME, 70.0, 10.0, EventKind::Stoppage);
        stoppage.team_id = None;
        let out = extract(vec![stoppage, ev(1, 11.0, HOME, 84.0, -2.0, shot(ShotKind::OnGoal))]);
        assert!(out.shots[0].pass_context.is_none());
    }

    #[test]
    fn missing_coordinates_are_counted() {
        let mut no_coords = ev(0, 10.0, HOME, 0.0, 0.0, shot(ShotKind::OnGoal));
        no_coords.coords = None;
        let out = extract(vec![no_coords]);
        assert!(out.shots.is_empty());
        assert_eq!(out.stats.skipped_missing_geometry, 1);
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.anomalies[0].event_index, 0);
    }

    #[test]
    fn period_change_resets_state() {
        let mut late = ev(1, 1.0, HOME, -84.0, 2.0, shot(ShotKind::OnGoal));
        late.period = 2;
        late.home_defending = Some(RinkSide::Right);
        let out = extract(vec![ev(0, 1199.0, HOME, 80.0, 5.0, shot(ShotKind::OnGoal)), late]);
        let second = &out.shots[1];
        assert!(!second.is_rebound);
        assert_eq!(second.time_since_last_event, None);
        assert_eq!(second.time_since_last_shot, None);
        assert!((second.distance - 5.385164807134504).abs() < 1e-9);
    }

    #[test]
    fn angles_stay_in_bounds() {
        let out = extract(vec![
            ev(0, 1.0, HOME, 89.0, 30.0, shot(ShotKind::Missed)),
            ev(1, 40.0, HOME, 99.0, -10.0, shot(ShotKind::Missed)),
            ev(2, 80.0, HOME, 30.0, 0.0, shot(ShotKind::Missed)),
        ]);
        for s in &out.shots {
            assert!((0.0..=90.0).contains(&s.angle), "angle {}", s.angle);
            assert!(s.distance >= 0.0);
        }
    }

    #[test]
    fn deterministic_output() {
        let events = vec![
            ev(0, 10.0, HOME, 60.0, 10.0, EventKind::Pass { passer: Some(12) }),
            ev(1, 11.0, HOME, 85.0, 3.0, shot(ShotKind::OnGoal)),
            ev(2, 12.0, HOME, 86.0, 1.0, shot(ShotKind::Goal)),
        ];
        let a = extract(events.clone());
        let b = extract(events);
        assert_eq!(a.shots, b.shots);
    }
}
