//! Folding the provider's play list into `PlayEvent`s.

use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;

use crate::domain::{EventKind, PlayEvent, Point, RinkSide, ShotKind, ZoneFlag};
use crate::error::{ExtractError, RinkError, Result};

/// Team ids of the two sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamContext {
    pub home_id: i64,
    pub away_id: i64,
}

impl TeamContext {
    pub fn is_home(&self, team_id: i64) -> bool {
        team_id == self.home_id
    }

    pub fn opponent(&self, team_id: i64) -> Option<i64> {
        if team_id == self.home_id {
            Some(self.away_id)
        } else if team_id == self.away_id {
            Some(self.home_id)
        } else {
            None
        }
    }
}

/// One game's events, chronologically ordered
#[derive(Debug, Clone)]
pub struct ParsedGame {
    pub game_id: i64,
    pub teams: TeamContext,
    pub events: Vec<PlayEvent>,
    /// Entries that could not be placed in time
    pub malformed: Vec<ExtractError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlay {
    #[serde(default)]
    period_descriptor: Option<RawPeriod>,
    #[serde(default)]
    period: Option<u8>,
    #[serde(default)]
    time_in_period: Option<String>,
    #[serde(default)]
    situation_code: Option<Value>,
    #[serde(default)]
    home_team_defending_side: Option<String>,
    #[serde(default)]
    type_desc_key: Option<String>,
    #[serde(default)]
    sort_order: Option<i64>,
    #[serde(default)]
    details: Option<RawDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPeriod {
    number: Option<u8>,
    #[serde(default)]
    period_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDetails {
    event_owner_team_id: Option<i64>,
    x_coord: Option<f64>,
    y_coord: Option<f64>,
    zone_code: Option<String>,
    shooting_player_id: Option<i64>,
    scoring_player_id: Option<i64>,
    goalie_in_net_id: Option<i64>,
    shot_type: Option<String>,
    winning_player_id: Option<i64>,
    losing_player_id: Option<i64>,
    hitting_player_id: Option<i64>,
    passing_player_id: Option<i64>,
    player_id: Option<i64>,
}

/// "MM:SS" (seconds may carry a fraction) → seconds.
pub fn parse_clock(raw: &str) -> Option<f64> {
    let (m, s) = raw.trim().split_once(':')?;
    let minutes: u32 = m.trim().parse().ok()?;
    let seconds: f64 = s.trim().parse().ok()?;
    if !seconds.is_finite() || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(minutes as f64 * 60.0 + seconds)
}

fn team_id(payload: &Value, side: &str) -> Option<i64> {
    payload.get(side)?.get("id")?.as_i64()
}

/// Parse a whole play-by-play payload.
///
/// Game-level problems (no team ids, no play list) fail the game; single
/// bad entries are reported in `malformed` and skipped.
pub fn parse_game(game_id: i64, payload: &Value) -> Result<ParsedGame> {
    let invalid = |reason: &str| RinkError::InvalidPayload {
        game_id,
        reason: reason.to_string(),
    };

    let home_id = team_id(payload, "homeTeam").ok_or_else(|| invalid("missing homeTeam.id"))?;
    let away_id = team_id(payload, "awayTeam").ok_or_else(|| invalid("missing awayTeam.id"))?;
    let plays = payload
        .get("plays")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing plays array"))?;

    let (events, malformed) = parse_plays(plays);

    Ok(ParsedGame {
        game_id,
        teams: TeamContext { home_id, away_id },
        events,
        malformed,
    })
}

/// Parse the provider's play list, ordered chronologically.
///
/// Entries without a period or clock cannot be placed and come back as
/// `MalformedEvent`s instead.
pub fn parse_plays(plays: &[Value]) -> (Vec<PlayEvent>, Vec<ExtractError>) {
    let mut events = Vec::with_capacity(plays.len());
    let mut malformed = Vec::new();
    for (index, raw) in plays.iter().enumerate() {
        match parse_play(index, raw) {
            Ok(event) => events.push(event),
            Err(e) => malformed.push(e),
        }
    }
    order_events(&mut events);
    (events, malformed)
}

/// Stable chronological order: period, clock, provider sort order, index.
pub fn order_events(events: &mut [PlayEvent]) {
    events.sort_by(|a, b| {
        a.period
            .cmp(&b.period)
            .then(a.seconds.partial_cmp(&b.seconds).unwrap_or(Ordering::Equal))
            .then(
                a.sort_order
                    .unwrap_or(a.index as i64)
                    .cmp(&b.sort_order.unwrap_or(b.index as i64)),
            )
            .then(a.index.cmp(&b.index))
    });
}

pub fn parse_play(index: usize, raw: &Value) -> std::result::Result<PlayEvent, ExtractError> {
    let malformed = |reason: String| ExtractError::MalformedEvent { index, reason };

    let play: RawPlay = serde_json::from_value(raw.clone()).map_err(|e| malformed(e.to_string()))?;

    let period = play
        .period_descriptor
        .as_ref()
        .and_then(|p| p.number)
        .or(play.period)
        .filter(|p| *p > 0)
        .ok_or_else(|| malformed("missing period".to_string()))?;

    let seconds = play
        .time_in_period
        .as_deref()
        .and_then(parse_clock)
        .ok_or_else(|| {
            malformed(format!(
                "invalid timeInPeriod {:?}",
                play.time_in_period.as_deref().unwrap_or("")
            ))
        })?;

    let details = play.details.unwrap_or_default();
    let coords = match (details.x_coord, details.y_coord) {
        (Some(x), Some(y)) => Point::checked(x, y),
        _ => None,
    };
    let situation_code = play.situation_code.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(format!("{:0>4}", n)),
        _ => None,
    });

    let type_key = play.type_desc_key.unwrap_or_default();
    let is_shootout = play
        .period_descriptor
        .as_ref()
        .and_then(|p| p.period_type.as_deref())
        .map(|t| t.eq_ignore_ascii_case("SO"))
        .unwrap_or(false);

    let kind = if is_shootout {
        EventKind::Other {
            type_key: format!("shootout-{type_key}"),
        }
    } else {
        event_kind(&type_key, &details)
    };

    Ok(PlayEvent {
        index,
        sort_order: play.sort_order,
        period,
        seconds,
        team_id: details.event_owner_team_id,
        coords,
        situation_code,
        zone: details.zone_code.as_deref().and_then(ZoneFlag::from_code),
        home_defending: play
            .home_team_defending_side
            .as_deref()
            .and_then(RinkSide::from_str_opt),
        kind,
    })
}

fn event_kind(type_key: &str, d: &RawDetails) -> EventKind {
    let shot = |kind: ShotKind, shooter: Option<i64>| match shooter {
        Some(shooter) => EventKind::Shot {
            kind,
            shooter,
            goalie: d.goalie_in_net_id,
            shot_type: d.shot_type.clone(),
        },
        None => EventKind::Unparsed {
            type_key: type_key.to_string(),
            reason: "shot without shooter".to_string(),
        },
    };

    match type_key {
        "faceoff" => EventKind::Faceoff {
            winner: d.winning_player_id,
            loser: d.losing_player_id,
        },
        "shot-on-goal" => shot(ShotKind::OnGoal, d.shooting_player_id),
        "missed-shot" => shot(ShotKind::Missed, d.shooting_player_id),
        "blocked-shot" => shot(ShotKind::Blocked, d.shooting_player_id),
        "goal" => shot(ShotKind::Goal, d.scoring_player_id.or(d.shooting_player_id)),
        "pass" => EventKind::Pass {
            passer: d.passing_player_id.or(d.player_id),
        },
        "hit" => EventKind::Hit {
            hitter: d.hitting_player_id,
        },
        "giveaway" => EventKind::Giveaway {
            player: d.player_id,
        },
        "takeaway" => EventKind::Takeaway {
            player: d.player_id,
        },
        "penalty" | "delayed-penalty" => EventKind::Penalty,
        "stoppage" => EventKind::Stoppage,
        "period-start" | "period-end" | "game-end" | "shootout-complete" => {
            EventKind::PeriodBoundary
        }
        "" => EventKind::Unparsed {
            type_key: String::new(),
            reason: "missing typeDescKey".to_string(),
        },
        other => EventKind::Other {
            type_key: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clock_parsing() {
        assert_eq!(parse_clock("00:10"), Some(10.0));
        assert_eq!(parse_clock("11:30"), Some(690.0));
        assert_eq!(parse_clock("00:11.5"), Some(11.5));
        assert_eq!(parse_clock("1130"), None);
        assert_eq!(parse_clock("00:75"), None);
        assert_eq!(parse_clock("ab:cd"), None);
    }

    #[test]
    fn parses_shot_with_details() {
        let raw = json!({
            "eventId": 55,
            "periodDescriptor": {"number": 2, "periodType": "REG"},
            "timeInPeriod": "04:12",
            "situationCode": "1551",
            "homeTeamDefendingSide": "left",
            "typeDescKey": "shot-on-goal",
            "sortOrder": 120,
            "details": {
                "eventOwnerTeamId": 10,
                "xCoord": 75, "yCoord": -8,
                "zoneCode": "O",
                "shootingPlayerId": 8478402,
                "goalieInNetId": 8475883,
                "shotType": "wrist"
            }
        });
        let e = parse_play(3, &raw).unwrap();
        assert_eq!(e.period, 2);
        assert_eq!(e.seconds, 252.0);
        assert_eq!(e.team_id, Some(10));
        assert_eq!(e.zone, Some(ZoneFlag::Offensive));
        assert_eq!(e.home_defending, Some(RinkSide::Left));
        assert_eq!(e.situation_code.as_deref(), Some("1551"));
        match e.kind {
            EventKind::Shot { kind, shooter, goalie, shot_type } => {
                assert_eq!(kind, ShotKind::OnGoal);
                assert_eq!(shooter, 8478402);
                assert_eq!(goalie, Some(8475883));
                assert_eq!(shot_type.as_deref(), Some("wrist"));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn missing_time_is_malformed() {
        let raw = json!({"periodDescriptor": {"number": 1}, "typeDescKey": "hit"});
        let err = parse_play(9, &raw).unwrap_err();
        assert_eq!(err.index(), 9);
    }

    #[test]
    fn shot_without_shooter_is_unparsed_not_dropped() {
        let raw = json!({
            "periodDescriptor": {"number": 1},
            "timeInPeriod": "01:00",
            "typeDescKey": "missed-shot",
            "details": {"eventOwnerTeamId": 1, "xCoord": 60, "yCoord": 0}
        });
        let e = parse_play(0, &raw).unwrap();
        assert!(matches!(e.kind, EventKind::Unparsed { .. }));
    }

    #[test]
    fn shootout_attempts_are_not_shots() {
        let raw = json!({
            "periodDescriptor": {"number": 5, "periodType": "SO"},
            "timeInPeriod": "00:00",
            "typeDescKey": "goal",
            "details": {"eventOwnerTeamId": 1, "xCoord": 80, "yCoord": 0, "scoringPlayerId": 5}
        });
        let e = parse_play(0, &raw).unwrap();
        assert!(!e.is_shot_type());
    }

    #[test]
    fn game_parse_orders_and_collects_malformed() {
        let payload = json!({
            "homeTeam": {"id": 1}, "awayTeam": {"id": 2},
            "plays": [
                {"periodDescriptor": {"number": 1}, "timeInPeriod": "00:20", "typeDescKey": "hit", "sortOrder": 3},
                {"periodDescriptor": {"number": 1}, "timeInPeriod": "00:05", "typeDescKey": "faceoff", "sortOrder": 1},
                {"typeDescKey": "hit"},
                {"periodDescriptor": {"number": 2}, "timeInPeriod": "00:01", "typeDescKey": "hit", "sortOrder": 0}
            ]
        });
        let game = parse_game(7, &payload).unwrap();
        assert_eq!(game.events.len(), 3);
        assert_eq!(game.malformed.len(), 1);
        let order: Vec<usize> = game.events.iter().map(|e| e.index).collect();
        assert_eq!(order, vec![1, 0, 3]);
    }

    #[test]
    fn game_without_teams_is_invalid() {
        let payload = json!({"plays": []});
        assert!(parse_game(7, &payload).is_err());
    }
}
