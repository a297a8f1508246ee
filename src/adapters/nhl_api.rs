//! NHL web API client
//!
//! Read-only endpoints: per-date schedule, per-game play-by-play and
//! boxscore. No API key required.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::fetch::FetchClient;
use crate::domain::{GameHeader, LifecycleState};
use crate::error::{FetchError, RinkError, Result};

// ── Public types ────────────────────────────────────────────────

/// A game as listed on the schedule
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledGame {
    pub header: GameHeader,
    /// Changes whenever the provider's view of the game advances
    pub marker: Option<String>,
}

/// Upstream provider seam
#[async_trait]
pub trait GameFeed: Send + Sync {
    async fn schedule(&self, date: NaiveDate) -> std::result::Result<Vec<ScheduledGame>, FetchError>;

    async fn play_by_play(&self, game_id: i64) -> std::result::Result<Value, FetchError>;

    async fn boxscore(&self, game_id: i64) -> std::result::Result<Value, FetchError>;
}

// ── JSON deserialization structs ────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleResponse {
    #[serde(default)]
    game_week: Vec<ScheduleDay>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleDay {
    date: NaiveDate,
    #[serde(default)]
    games: Vec<ScheduleGame>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleGame {
    id: i64,
    game_state: String,
    home_team: ScheduleTeam,
    away_team: ScheduleTeam,
    #[serde(default)]
    period_descriptor: Option<PeriodDescriptor>,
    #[serde(default)]
    clock: Option<Clock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleTeam {
    abbrev: String,
    #[serde(default)]
    score: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeriodDescriptor {
    number: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Clock {
    #[serde(default)]
    time_remaining: Option<String>,
    #[serde(default)]
    in_intermission: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameHeaderPayload {
    id: i64,
    game_date: NaiveDate,
    game_state: String,
    home_team: ScheduleTeam,
    away_team: ScheduleTeam,
    #[serde(default)]
    clock: Option<Clock>,
}

// ── Parsing ─────────────────────────────────────────────────────

/// Games listed for `date` in a schedule response.
///
/// The endpoint returns a whole week; other dates are dropped, as are games
/// whose state code is unknown.
pub fn parse_schedule(payload: Value, date: NaiveDate) -> std::result::Result<Vec<ScheduledGame>, String> {
    let resp: ScheduleResponse = serde_json::from_value(payload).map_err(|e| e.to_string())?;
    let mut games = Vec::new();
    for day in resp.game_week.into_iter().filter(|d| d.date == date) {
        for g in day.games {
            let in_intermission = g.clock.as_ref().map(|c| c.in_intermission).unwrap_or(false);
            let Some(state) = LifecycleState::from_upstream(&g.game_state, in_intermission) else {
                debug!("Skipping game {} with unknown state {}", g.id, g.game_state);
                continue;
            };
            let marker = freshness_marker(&g, state);
            games.push(ScheduledGame {
                header: GameHeader {
                    game_id: g.id,
                    game_date: day.date,
                    home_abbrev: g.home_team.abbrev,
                    away_abbrev: g.away_team.abbrev,
                    state,
                },
                marker,
            });
        }
    }
    Ok(games)
}

fn freshness_marker(g: &ScheduleGame, state: LifecycleState) -> Option<String> {
    let period = g.period_descriptor.as_ref().and_then(|p| p.number);
    let clock = g.clock.as_ref().and_then(|c| c.time_remaining.clone());
    if period.is_none() && clock.is_none() && g.home_team.score.is_none() {
        return None;
    }
    Some(format!(
        "{}|p{}|{}|{}-{}",
        state.as_str(),
        period.map(|p| p.to_string()).unwrap_or_default(),
        clock.unwrap_or_default(),
        g.away_team.score.unwrap_or(0),
        g.home_team.score.unwrap_or(0),
    ))
}

/// Game identity read straight from a play-by-play payload.
pub fn header_from_play_by_play(payload: &Value) -> Result<GameHeader> {
    let game_id = payload.get("id").and_then(Value::as_i64).unwrap_or(0);
    let parsed: GameHeaderPayload =
        serde_json::from_value(payload.clone()).map_err(|e| RinkError::InvalidPayload {
            game_id,
            reason: format!("header: {e}"),
        })?;
    let in_intermission = parsed.clock.as_ref().map(|c| c.in_intermission).unwrap_or(false);
    let state = LifecycleState::from_upstream(&parsed.game_state, in_intermission).ok_or_else(|| {
        RinkError::InvalidPayload {
            game_id: parsed.id,
            reason: format!("unknown game state {}", parsed.game_state),
        }
    })?;
    Ok(GameHeader {
        game_id: parsed.id,
        game_date: parsed.game_date,
        home_abbrev: parsed.home_team.abbrev,
        away_abbrev: parsed.away_team.abbrev,
        state,
    })
}

// ── Client ──────────────────────────────────────────────────────

/// NHL web API client
#[derive(Clone)]
pub struct NhlApiClient {
    fetch: FetchClient,
    base: Url,
}

impl NhlApiClient {
    pub fn new(fetch: FetchClient, base_url: &str) -> Result<Self> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| RinkError::Validation(format!("invalid upstream base url {base_url}: {e}")))?;
        Ok(Self { fetch, base })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<String, FetchError> {
        self.base
            .join(path)
            .map(|u| u.to_string())
            .map_err(|e| FetchError::Decode {
                url: format!("{}{}", self.base, path),
                message: e.to_string(),
            })
    }

    pub fn schedule_url(&self, date: NaiveDate) -> std::result::Result<String, FetchError> {
        self.endpoint(&format!("v1/schedule/{}", date.format("%Y-%m-%d")))
    }

    pub fn play_by_play_url(&self, game_id: i64) -> std::result::Result<String, FetchError> {
        self.endpoint(&format!("v1/gamecenter/{game_id}/play-by-play"))
    }

    pub fn boxscore_url(&self, game_id: i64) -> std::result::Result<String, FetchError> {
        self.endpoint(&format!("v1/gamecenter/{game_id}/boxscore"))
    }
}

#[async_trait]
impl GameFeed for NhlApiClient {
    async fn schedule(&self, date: NaiveDate) -> std::result::Result<Vec<ScheduledGame>, FetchError> {
        let url = self.schedule_url(date)?;
        let payload = self.fetch.get_json(&url).await?;
        let games = parse_schedule(payload, date).map_err(|message| FetchError::Decode {
            url: url.clone(),
            message,
        })?;
        debug!("Schedule {}: {} games", date, games.len());
        Ok(games)
    }

    async fn play_by_play(&self, game_id: i64) -> std::result::Result<Value, FetchError> {
        let url = self.play_by_play_url(game_id)?;
        self.fetch.get_json(&url).await
    }

    async fn boxscore(&self, game_id: i64) -> std::result::Result<Value, FetchError> {
        let url = self.boxscore_url(game_id)?;
        self.fetch.get_json(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_schedule_for_requested_date() {
        let payload = json!({
            "gameWeek": [
                {
                    "date": "2023-10-10",
                    "games": [
                        {
                            "id": 2023020001,
                            "gameState": "LIVE",
                            "homeTeam": {"abbrev": "TBL", "score": 2},
                            "awayTeam": {"abbrev": "NSH", "score": 1},
                            "periodDescriptor": {"number": 2},
                            "clock": {"timeRemaining": "12:31", "inIntermission": false}
                        },
                        {
                            "id": 2023020002,
                            "gameState": "FUT",
                            "homeTeam": {"abbrev": "PIT"},
                            "awayTeam": {"abbrev": "CHI"}
                        },
                        {
                            "id": 2023020003,
                            "gameState": "WEIRD",
                            "homeTeam": {"abbrev": "VGK"},
                            "awayTeam": {"abbrev": "SEA"}
                        }
                    ]
                },
                {"date": "2023-10-11", "games": [
                    {"id": 2023020010, "gameState": "FUT",
                     "homeTeam": {"abbrev": "TOR"}, "awayTeam": {"abbrev": "MTL"}}
                ]}
            ]
        });

        let date = NaiveDate::from_ymd_opt(2023, 10, 10).unwrap();
        let games = parse_schedule(payload, date).unwrap();
        assert_eq!(games.len(), 2);
        assert_eq!(games[0].header.state, LifecycleState::Live);
        assert_eq!(games[0].marker.as_deref(), Some("LIVE|p2|12:31|1-2"));
        assert_eq!(games[1].header.state, LifecycleState::Scheduled);
        assert_eq!(games[1].marker, None);
    }

    #[test]
    fn intermission_comes_from_clock() {
        let payload = json!({"gameWeek": [{"date": "2024-01-05", "games": [{
            "id": 2023020600, "gameState": "LIVE",
            "homeTeam": {"abbrev": "EDM", "score": 0}, "awayTeam": {"abbrev": "CGY", "score": 0},
            "clock": {"timeRemaining": "18:00", "inIntermission": true}
        }]}]});
        let games = parse_schedule(payload, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()).unwrap();
        assert_eq!(games[0].header.state, LifecycleState::Intermission);
    }

    #[test]
    fn header_from_pbp_payload() {
        let payload = json!({
            "id": 2023020001,
            "gameDate": "2023-10-10",
            "gameState": "OFF",
            "homeTeam": {"id": 14, "abbrev": "TBL"},
            "awayTeam": {"id": 18, "abbrev": "NSH"},
            "plays": []
        });
        let h = header_from_play_by_play(&payload).unwrap();
        assert_eq!(h.game_id, 2023020001);
        assert_eq!(h.state, LifecycleState::Final);
        assert_eq!(h.home_abbrev, "TBL");
    }

    #[test]
    fn builds_endpoint_urls() {
        let fetch = FetchClient::from_config(&crate::config::UpstreamConfig::default()).unwrap();
        let client = NhlApiClient::new(fetch, "https://api-web.nhle.com").unwrap();
        assert_eq!(
            client.play_by_play_url(2023020001).unwrap(),
            "https://api-web.nhle.com/v1/gamecenter/2023020001/play-by-play"
        );
        assert_eq!(
            client
                .schedule_url(NaiveDate::from_ymd_opt(2023, 10, 10).unwrap())
                .unwrap(),
            "https://api-web.nhle.com/v1/schedule/2023-10-10"
        );
    }
}
