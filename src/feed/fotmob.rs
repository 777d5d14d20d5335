use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::USER_AGENT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::provider::{LeaguePage, MatchSource, Tab};
use crate::error::{FeedError, FeedResult};
use crate::models::{EventKind, League, Match, MatchDetails, MatchEvent, MatchStatus, Team};

pub const DEFAULT_BASE_URL: &str = "https://www.fotmob.com/api";

/// League ids queried when no explicit list is configured.
pub const SUPPORTED_LEAGUES: &[i64] = &[
    // Top 5 European leagues
    47, // Premier League
    87, // La Liga
    54, // Bundesliga
    55, // Serie A
    53, // Ligue 1
    // European competitions
    42, // Champions League
    73, // Europa League
    50, // Euro
    // South America
    268, // Brasileirao Serie A
    112, // Liga Profesional Argentina
    14,  // Copa Libertadores
    44,  // Copa America
    // Other
    130, // MLS
    77,  // World Cup
];

/// HTTP source backed by the FotMob JSON API.
#[derive(Clone)]
pub struct FotmobClient {
    http: Client,
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl FotmobClient {
    pub fn new(base_url: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        Url::parse(base_url).with_context(|| format!("Invalid API base URL: {}", base_url))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(FotmobClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
            timeout,
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> FeedResult<Url> {
        let url = Url::parse_with_params(&format!("{}/{}", self.base_url, path), params)?;
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> FeedResult<T> {
        debug!("GET {}", url);
        let transport = |source: reqwest::Error| {
            if source.is_timeout() {
                FeedError::Timeout(self.timeout)
            } else {
                FeedError::Transport {
                    url: url.to_string(),
                    source,
                }
            }
        };

        let resp = self
            .http
            .get(url.clone())
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(transport)?;

        if resp.status() != StatusCode::OK {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|e| FeedError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl MatchSource for FotmobClient {
    fn name(&self) -> &str {
        "FotMob"
    }

    async fn fetch_league(&self, league_id: i64, tab: Tab) -> FeedResult<LeaguePage> {
        let url = self.endpoint(
            "leagues",
            &[("id", league_id.to_string()), ("tab", tab.as_str().to_string())],
        )?;
        let raw: WireLeagueResponse = self.get_json(url).await?;
        Ok(raw.into_page())
    }

    async fn fetch_match_details(&self, match_id: i64) -> FeedResult<MatchDetails> {
        let url = self.endpoint("matchDetails", &[("matchId", match_id.to_string())])?;
        let raw: WireMatchDetails = self.get_json(url).await?;
        Ok(raw.into_details(match_id))
    }
}

// ── Wire format ──────────────────────────────────────────────────────────────

/// Ids arrive as numbers or numeric strings depending on the endpoint; `null` is 0.
fn flexible_id<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Str(String),
    }
    match Option::<Raw>::deserialize(de)? {
        None => Ok(0),
        Some(Raw::Num(n)) => Ok(n),
        Some(Raw::Str(s)) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Explicit `null` decodes like a missing key.
fn null_default<'de, D, T>(de: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(de)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireLeagueResponse {
    #[serde(deserialize_with = "null_default")]
    details: WireLeagueDetails,
    #[serde(deserialize_with = "null_default")]
    fixtures: WireFixtures,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireLeagueDetails {
    #[serde(deserialize_with = "flexible_id")]
    id: i64,
    #[serde(deserialize_with = "null_default")]
    name: String,
    #[serde(deserialize_with = "null_default")]
    country: String,
    #[serde(deserialize_with = "null_default")]
    country_code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireFixtures {
    #[serde(deserialize_with = "null_default")]
    all_matches: Vec<WireMatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireTeam {
    #[serde(deserialize_with = "flexible_id")]
    id: i64,
    #[serde(deserialize_with = "null_default")]
    name: String,
    #[serde(deserialize_with = "null_default")]
    short_name: String,
    score: Option<i32>,
}

impl WireTeam {
    fn to_team(&self) -> Team {
        Team {
            id: self.id,
            name: self.name.clone(),
            short_name: self.short_name.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireShortText {
    #[serde(deserialize_with = "null_default")]
    short: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireStatus {
    #[serde(deserialize_with = "null_default")]
    utc_time: String,
    #[serde(deserialize_with = "null_default")]
    started: bool,
    #[serde(deserialize_with = "null_default")]
    finished: bool,
    #[serde(deserialize_with = "null_default")]
    cancelled: bool,
    score_str: Option<String>,
    live_time: Option<WireShortText>,
    reason: Option<WireShortText>,
}

impl WireStatus {
    fn status(&self) -> MatchStatus {
        if self.cancelled {
            let postponed = self
                .reason
                .as_ref()
                .map(|r| r.short.to_lowercase())
                .is_some_and(|r| r.starts_with("pp") || r.starts_with("post"));
            if postponed {
                MatchStatus::Postponed
            } else {
                MatchStatus::Cancelled
            }
        } else if self.finished {
            MatchStatus::Finished
        } else if self.started {
            MatchStatus::Live
        } else {
            MatchStatus::NotStarted
        }
    }

    /// Home/away goals from "2 - 1" when the team objects lack scores.
    fn score_pair(&self) -> (Option<i32>, Option<i32>) {
        let Some(s) = self.score_str.as_deref() else {
            return (None, None);
        };
        let mut parts = s.split('-').map(|p| p.trim().parse::<i32>().ok());
        match (parts.next().flatten(), parts.next().flatten()) {
            (Some(h), Some(a)) => (Some(h), Some(a)),
            _ => (None, None),
        }
    }

    fn live_time(&self) -> Option<String> {
        self.live_time
            .as_ref()
            .map(|t| t.short.clone())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireMatch {
    #[serde(deserialize_with = "flexible_id")]
    id: i64,
    round: Option<serde_json::Value>,
    #[serde(deserialize_with = "null_default")]
    home: WireTeam,
    #[serde(deserialize_with = "null_default")]
    away: WireTeam,
    #[serde(deserialize_with = "null_default")]
    status: WireStatus,
    league_id: Option<i64>,
}

impl WireMatch {
    fn into_match(self) -> Match {
        let status = self.status.status();
        let (str_home, str_away) = self.status.score_pair();
        let has_score = status != MatchStatus::NotStarted;
        Match {
            id: self.id,
            league: League {
                id: self.league_id.unwrap_or(0),
                ..League::default()
            },
            home_team: self.home.to_team(),
            away_team: self.away.to_team(),
            status,
            home_score: self.home.score.or(str_home).filter(|_| has_score),
            away_score: self.away.score.or(str_away).filter(|_| has_score),
            kickoff: parse_kickoff(&self.status.utc_time),
            live_time: self.status.live_time(),
            round: self.round.and_then(|r| match r {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
        }
    }
}

impl WireLeagueResponse {
    fn into_page(self) -> LeaguePage {
        let league = League {
            id: self.details.id,
            name: self.details.name,
            country: self.details.country,
            country_code: self.details.country_code,
        };
        let matches = self
            .fixtures
            .all_matches
            .into_iter()
            .map(WireMatch::into_match)
            .collect();
        LeaguePage { league, matches }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireMatchDetails {
    #[serde(deserialize_with = "null_default")]
    general: WireGeneral,
    #[serde(deserialize_with = "null_default")]
    header: WireHeader,
    #[serde(deserialize_with = "null_default")]
    content: WireContent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireGeneral {
    #[serde(deserialize_with = "flexible_id")]
    match_id: i64,
    #[serde(deserialize_with = "flexible_id")]
    league_id: i64,
    #[serde(deserialize_with = "null_default")]
    league_name: String,
    #[serde(deserialize_with = "null_default")]
    country_code: String,
    match_round: Option<String>,
    #[serde(deserialize_with = "null_default")]
    home_team: WireTeam,
    #[serde(deserialize_with = "null_default")]
    away_team: WireTeam,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireHeader {
    #[serde(deserialize_with = "null_default")]
    teams: Vec<WireTeam>,
    #[serde(deserialize_with = "null_default")]
    status: WireStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireContent {
    #[serde(deserialize_with = "null_default")]
    match_facts: WireMatchFacts,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireMatchFacts {
    #[serde(deserialize_with = "null_default")]
    events: WireEventList,
    #[serde(deserialize_with = "null_default")]
    info_box: WireInfoBox,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireEventList {
    #[serde(deserialize_with = "null_default")]
    events: Vec<WireEvent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireInfoBox {
    #[serde(rename = "Stadium")]
    stadium: Option<WireNamed>,
    #[serde(rename = "Referee")]
    referee: Option<WireNamed>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireNamed {
    name: Option<String>,
    text: Option<String>,
}

impl WireNamed {
    fn value(&self) -> Option<String> {
        self.name.clone().or_else(|| self.text.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireEvent {
    #[serde(deserialize_with = "flexible_id")]
    event_id: i64,
    #[serde(deserialize_with = "null_default")]
    time: i32,
    #[serde(deserialize_with = "null_default")]
    #[serde(rename = "type")]
    kind: String,
    #[serde(deserialize_with = "null_default")]
    is_home: bool,
    player: Option<WireNamed>,
    assist_input: Option<String>,
    card: Option<String>,
    #[serde(deserialize_with = "null_default")]
    swap: Vec<WireNamed>,
}

impl WireEvent {
    fn into_event(self, home: &Team, away: &Team) -> MatchEvent {
        let kind = match self.kind.to_lowercase().as_str() {
            "goal" => EventKind::Goal,
            "card" => EventKind::Card,
            "substitution" => EventKind::Substitution,
            _ => EventKind::Other,
        };
        let team = if self.is_home { home.clone() } else { away.clone() };

        let (player, player_out, detail) = match kind {
            // swap[0] comes on, swap[1] goes off
            EventKind::Substitution => (
                self.swap.first().and_then(WireNamed::value),
                self.swap.get(1).and_then(WireNamed::value),
                Some("in".to_string()),
            ),
            EventKind::Card => (
                self.player.as_ref().and_then(WireNamed::value),
                None,
                self.card.map(|c| c.to_lowercase()),
            ),
            _ => (self.player.as_ref().and_then(WireNamed::value), None, None),
        };

        MatchEvent {
            id: self.event_id,
            minute: self.time,
            kind,
            team,
            player,
            assist: self.assist_input.filter(|a| !a.is_empty()),
            detail,
            player_out,
        }
    }
}

impl WireMatchDetails {
    fn into_details(self, requested_id: i64) -> MatchDetails {
        let home_wire = self.header.teams.first();
        let away_wire = self.header.teams.get(1);

        let pick = |general: &WireTeam, header: Option<&WireTeam>| -> Team {
            let mut team = general.to_team();
            if let Some(h) = header {
                if team.id == 0 {
                    team.id = h.id;
                }
                if team.name.is_empty() {
                    team.name = h.name.clone();
                }
            }
            team
        };
        let home_team = pick(&self.general.home_team, home_wire);
        let away_team = pick(&self.general.away_team, away_wire);

        let status = self.header.status.status();
        let (str_home, str_away) = self.header.status.score_pair();
        let has_score = status != MatchStatus::NotStarted;

        let events = self
            .content
            .match_facts
            .events
            .events
            .into_iter()
            .map(|e| e.into_event(&home_team, &away_team))
            .collect();

        let summary = Match {
            id: if self.general.match_id != 0 {
                self.general.match_id
            } else {
                requested_id
            },
            league: League {
                id: self.general.league_id,
                name: self.general.league_name,
                country: String::new(),
                country_code: self.general.country_code,
            },
            home_team,
            away_team,
            status,
            home_score: home_wire.and_then(|t| t.score).or(str_home).filter(|_| has_score),
            away_score: away_wire.and_then(|t| t.score).or(str_away).filter(|_| has_score),
            kickoff: parse_kickoff(&self.header.status.utc_time),
            live_time: self.header.status.live_time(),
            round: self.general.match_round,
        };

        MatchDetails {
            summary,
            events,
            venue: self.content.match_facts.info_box.stadium.and_then(|s| s.value()),
            referee: self.content.match_facts.info_box.referee.and_then(|r| r.value()),
        }
    }
}

/// Kickoff times come as RFC 3339, sometimes with a `.000Z` suffix.
pub fn parse_kickoff(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.fZ")
                .ok()
                .map(|n| n.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const LEAGUE_JSON: &str = r#"{
        "details": {"id": 47, "name": "Premier League", "country": "England", "countryCode": "ENG"},
        "fixtures": {"allMatches": [
            {"id": "4506263", "round": 12,
             "home": {"id": "8456", "name": "Manchester City", "shortName": "Man City"},
             "away": {"id": 8650, "name": "Liverpool", "shortName": "Liverpool"},
             "status": {"utcTime": "2025-03-01T15:00:00.000Z", "started": true, "finished": false,
                        "scoreStr": "1 - 2", "liveTime": {"short": "67'"}}},
            {"id": 4506264,
             "home": {"id": 9825, "name": "Arsenal"},
             "away": {"id": 8455, "name": "Chelsea"},
             "status": {"utcTime": "2025-03-02T16:30:00Z", "started": false, "finished": false, "cancelled": true,
                        "reason": {"short": "PP"}}}
        ]}
    }"#;

    const DETAILS_JSON: &str = r#"{
        "general": {"matchId": "4506263", "leagueId": 47, "leagueName": "Premier League", "countryCode": "ENG",
                    "homeTeam": {"id": 8456, "name": "Manchester City"},
                    "awayTeam": {"id": 8650, "name": "Liverpool"}},
        "header": {"teams": [{"id": 8456, "name": "Manchester City", "score": 1},
                             {"id": 8650, "name": "Liverpool", "score": 2}],
                   "status": {"utcTime": "2025-03-01T15:00:00Z", "started": true, "finished": false,
                              "liveTime": {"short": "67'"}}},
        "content": {"matchFacts": {
            "events": {"events": [
                {"eventId": 101, "time": 12, "type": "Goal", "isHome": false,
                 "player": {"name": "Salah"}, "assistInput": "Szoboszlai"},
                {"eventId": 102, "time": 30, "type": "Card", "isHome": true,
                 "player": {"name": "Rodri"}, "card": "YellowRed"},
                {"eventId": 103, "time": 55, "type": "Substitution", "isHome": true,
                 "swap": [{"name": "Foden"}, {"name": "Grealish"}]},
                {"eventId": 104, "time": 60, "type": "AddedTime", "isHome": true}
            ]},
            "infoBox": {"Stadium": {"name": "Etihad Stadium"}, "Referee": {"text": "M. Oliver"}}
        }}
    }"#;

    #[test]
    fn test_parse_league_page() {
        let raw: WireLeagueResponse = serde_json::from_str(LEAGUE_JSON).unwrap();
        let page = raw.into_page();
        assert_eq!(page.league.id, 47);
        assert_eq!(page.league.country_code, "ENG");
        assert_eq!(page.matches.len(), 2);

        let live = &page.matches[0];
        assert_eq!(live.id, 4506263);
        assert_eq!(live.status, MatchStatus::Live);
        assert_eq!((live.home_score, live.away_score), (Some(1), Some(2)));
        assert_eq!(live.live_time.as_deref(), Some("67'"));
        assert_eq!(live.round.as_deref(), Some("12"));
        assert_eq!(live.home_team.id, 8456);
        // league metadata is attached by the fetcher, not per record
        assert!(live.league.is_unset());

        let postponed = &page.matches[1];
        assert_eq!(postponed.status, MatchStatus::Postponed);
        assert_eq!(postponed.home_score, None);
    }

    #[test]
    fn test_parse_match_details() {
        let raw: WireMatchDetails = serde_json::from_str(DETAILS_JSON).unwrap();
        let details = raw.into_details(4506263);
        assert_eq!(details.summary.id, 4506263);
        assert_eq!(details.summary.status, MatchStatus::Live);
        assert_eq!(details.summary.home_score, Some(1));
        assert_eq!(details.summary.away_score, Some(2));
        assert_eq!(details.venue.as_deref(), Some("Etihad Stadium"));
        assert_eq!(details.referee.as_deref(), Some("M. Oliver"));

        let ev = &details.events;
        assert_eq!(ev.len(), 4);
        assert_eq!(ev[0].kind, EventKind::Goal);
        assert_eq!(ev[0].team.id, 8650);
        assert_eq!(ev[0].assist.as_deref(), Some("Szoboszlai"));
        assert_eq!(ev[1].kind, EventKind::Card);
        assert_eq!(ev[1].detail.as_deref(), Some("yellowred"));
        assert_eq!(ev[2].kind, EventKind::Substitution);
        assert_eq!(ev[2].player.as_deref(), Some("Foden"));
        assert_eq!(ev[2].player_out.as_deref(), Some("Grealish"));
        assert_eq!(ev[3].kind, EventKind::Other);
    }

    #[test]
    fn test_missing_sections_decode_to_defaults() {
        let raw: WireLeagueResponse = serde_json::from_str("{}").unwrap();
        let page = raw.into_page();
        assert!(page.matches.is_empty());
        assert!(page.league.is_unset());
    }

    #[test]
    fn test_explicit_nulls_decode_like_missing_keys() {
        let json = r#"{
            "general": {"matchId": 7, "leagueName": null, "homeTeam": {"id": 1, "name": "Home", "shortName": null}},
            "header": {"teams": null, "status": {"utcTime": null, "started": true, "finished": null}},
            "content": {"matchFacts": {"events": {"events": [
                {"eventId": 1, "time": 50, "type": "Substitution", "isHome": null, "swap": null},
                {"eventId": "2", "time": null, "type": null, "isHome": true, "player": null}
            ]}, "infoBox": null}}
        }"#;
        let raw: WireMatchDetails = serde_json::from_str(json).unwrap();
        let details = raw.into_details(7);
        assert_eq!(details.summary.status, MatchStatus::Live);
        assert_eq!(details.summary.home_team.label(), "Home");
        assert_eq!(details.events.len(), 2);
        assert_eq!(details.events[0].kind, EventKind::Substitution);
        assert_eq!(details.events[0].player, None);
        assert_eq!(details.events[1].id, 2);
        assert_eq!(details.events[1].kind, EventKind::Other);
        assert_eq!(details.events[1].minute, 0);
        assert!(details.venue.is_none());

        let page: WireLeagueResponse =
            serde_json::from_str(r#"{"details": null, "fixtures": {"allMatches": null}}"#).unwrap();
        assert!(page.into_page().matches.is_empty());
    }

    #[test]
    fn test_parse_kickoff_formats() {
        let a = parse_kickoff("2025-03-01T15:00:00Z").unwrap();
        let b = parse_kickoff("2025-03-01T15:00:00.000Z").unwrap();
        assert_eq!(a, b);
        assert_eq!((a.day(), a.hour()), (1, 15));
        assert!(parse_kickoff("").is_none());
        assert!(parse_kickoff("tomorrow").is_none());
    }

    #[test]
    fn test_endpoint_encodes_params() {
        let client =
            FotmobClient::new("https://example.test/api/", "Mozilla/5.0", Duration::from_secs(5))
                .unwrap();
        let url = client
            .endpoint("leagues", &[("id", "47".into()), ("tab", Tab::Results.as_str().into())])
            .unwrap();
        assert_eq!(url.as_str(), "https://example.test/api/leagues?id=47&tab=results");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(FotmobClient::new("not a url", "ua", Duration::from_secs(1)).is_err());
    }
}
