//! Offline source serving canned pages and scripted match snapshots.
//!
//! Used by `--mock` and by the fetcher/poller tests. Details for a match can be
//! a sequence of snapshots: each fetch returns the next one and the last one
//! repeats, which is how a live match is simulated.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::provider::{LeaguePage, MatchSource, Tab};
use crate::error::{FeedError, FeedResult};
use crate::models::{EventKind, League, Match, MatchDetails, MatchEvent, MatchStatus, Team};

#[derive(Default)]
pub struct MockSource {
    pages: HashMap<(i64, Tab), LeaguePage>,
    failing: HashSet<i64>,
    details: Mutex<HashMap<i64, Vec<MatchDetails>>>,
    league_calls: AtomicUsize,
    detail_calls: AtomicUsize,
    latency: Option<std::time::Duration>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, tab: Tab, page: LeaguePage) -> Self {
        self.pages.insert((page.league.id, tab), page);
        self
    }

    #[cfg(test)]
    /// Every query for this league fails with a non-200 status.
    pub fn with_failure(mut self, league_id: i64) -> Self {
        self.failing.insert(league_id);
        self
    }

    /// Snapshots returned by successive detail fetches; the last one repeats.
    pub fn with_details(self, match_id: i64, snapshots: Vec<MatchDetails>) -> Self {
        self.details
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(match_id, snapshots);
        self
    }

    #[cfg(test)]
    /// Sleep this long before answering any query.
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[cfg(test)]
    pub fn league_calls(&self) -> usize {
        self.league_calls.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl MatchSource for MockSource {
    fn name(&self) -> &str {
        "Mock"
    }

    async fn fetch_league(&self, league_id: i64, tab: Tab) -> FeedResult<LeaguePage> {
        self.league_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.failing.contains(&league_id) {
            return Err(FeedError::Status {
                url: format!("mock://leagues?id={}&tab={}", league_id, tab.as_str()),
                status: 503,
            });
        }
        Ok(self
            .pages
            .get(&(league_id, tab))
            .cloned()
            .unwrap_or_else(|| LeaguePage {
                league: League {
                    id: league_id,
                    ..League::default()
                },
                matches: vec![],
            }))
    }

    async fn fetch_match_details(&self, match_id: i64) -> FeedResult<MatchDetails> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        let mut details = self.details.lock().unwrap_or_else(|p| p.into_inner());
        let snapshots = details.get_mut(&match_id).ok_or(FeedError::NotFound(match_id))?;
        match snapshots.len() {
            0 => Err(FeedError::NotFound(match_id)),
            1 => Ok(snapshots[0].clone()),
            _ => Ok(snapshots.remove(0)),
        }
    }
}

// ── Canned demo data ─────────────────────────────────────────────────────────

pub fn team(id: i64, name: &str, short: &str) -> Team {
    Team {
        id,
        name: name.to_string(),
        short_name: short.to_string(),
    }
}

pub fn event(id: i64, minute: i32, kind: EventKind, team: &Team, player: &str) -> MatchEvent {
    MatchEvent {
        id,
        minute,
        kind,
        team: team.clone(),
        player: Some(player.to_string()),
        assist: None,
        detail: None,
        player_out: None,
    }
}

pub fn fixture(
    id: i64,
    home: &Team,
    away: &Team,
    status: MatchStatus,
    score: Option<(i32, i32)>,
    kickoff: chrono::DateTime<Utc>,
) -> Match {
    Match {
        id,
        league: League::default(),
        home_team: home.clone(),
        away_team: away.clone(),
        status,
        home_score: score.map(|s| s.0),
        away_score: score.map(|s| s.1),
        kickoff: Some(kickoff),
        live_time: (status == MatchStatus::Live).then(|| "34'".to_string()),
        round: None,
    }
}

fn league(id: i64, name: &str, country: &str) -> League {
    League {
        id,
        name: name.to_string(),
        country: country.to_string(),
        country_code: country.to_string(),
    }
}

pub fn at(day: NaiveDate, hour: u32) -> chrono::DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or_default();
    Utc.from_utc_datetime(&day.and_time(time))
}

pub fn snapshot(summary: &Match, status: MatchStatus, events: Vec<MatchEvent>) -> MatchDetails {
    let home = events
        .iter()
        .filter(|e| e.kind == EventKind::Goal && e.team.id == summary.home_team.id)
        .count() as i32;
    let away = events
        .iter()
        .filter(|e| e.kind == EventKind::Goal && e.team.id != summary.home_team.id)
        .count() as i32;
    let mut summary = summary.clone();
    summary.status = status;
    summary.home_score = Some(home);
    summary.away_score = Some(away);
    MatchDetails {
        summary,
        events,
        venue: None,
        referee: None,
    }
}

impl MockSource {
    /// Two leagues with live, upcoming and finished matches around `today`.
    /// Match 1 progresses through three snapshots and then finishes.
    pub fn demo(today: NaiveDate) -> Self {
        let man_utd = team(10260, "Manchester United", "Man Utd");
        let liverpool = team(8650, "Liverpool", "Liverpool");
        let arsenal = team(9825, "Arsenal", "Arsenal");
        let chelsea = team(8455, "Chelsea", "Chelsea");
        let real = team(8633, "Real Madrid", "Real Madrid");
        let barca = team(8634, "Barcelona", "Barcelona");
        let yesterday = today - Duration::days(1);
        let two_days_ago = today - Duration::days(2);

        let live_pl = fixture(1, &man_utd, &liverpool, MatchStatus::Live, Some((1, 1)), at(today, 12));
        let upcoming_pl = fixture(4, &arsenal, &chelsea, MatchStatus::NotStarted, None, at(today, 20));
        let finished_pl = fixture(3, &chelsea, &man_utd, MatchStatus::Finished, Some((2, 0)), at(yesterday, 15));
        let live_laliga = fixture(2, &real, &barca, MatchStatus::Live, Some((1, 1)), at(today, 13));
        let finished_laliga = fixture(5, &barca, &real, MatchStatus::Finished, Some((3, 2)), at(two_days_ago, 19));

        let e1 = event(1, 12, EventKind::Goal, &man_utd, "Rashford");
        let e2 = event(2, 34, EventKind::Goal, &liverpool, "Salah");
        let mut e3 = event(3, 45, EventKind::Card, &man_utd, "Casemiro");
        e3.detail = Some("yellow".to_string());
        let mut e4 = event(4, 56, EventKind::Goal, &man_utd, "Fernandes");
        e4.assist = Some("Rashford".to_string());
        let mut e5 = event(5, 71, EventKind::Substitution, &liverpool, "Nunez");
        e5.player_out = Some("Gakpo".to_string());
        e5.detail = Some("in".to_string());

        let match_one = vec![
            snapshot(&live_pl, MatchStatus::Live, vec![e1.clone(), e2.clone()]),
            snapshot(&live_pl, MatchStatus::Live, vec![e1.clone(), e2.clone(), e3.clone(), e4.clone()]),
            snapshot(&live_pl, MatchStatus::Finished, vec![e1, e2, e3, e4, e5]),
        ];
        let match_two = vec![snapshot(
            &live_laliga,
            MatchStatus::Live,
            vec![
                event(6, 8, EventKind::Goal, &barca, "Lewandowski"),
                event(7, 23, EventKind::Goal, &real, "Vinicius Jr"),
            ],
        )];

        let pl = league(47, "Premier League", "ENG");
        let laliga = league(87, "La Liga", "ESP");

        MockSource::new()
            .with_page(
                Tab::Fixtures,
                LeaguePage {
                    league: pl.clone(),
                    matches: vec![live_pl, upcoming_pl],
                },
            )
            .with_page(
                Tab::Results,
                LeaguePage {
                    league: pl,
                    matches: vec![finished_pl],
                },
            )
            .with_page(
                Tab::Fixtures,
                LeaguePage {
                    league: laliga.clone(),
                    matches: vec![live_laliga],
                },
            )
            .with_page(
                Tab::Results,
                LeaguePage {
                    league: laliga,
                    matches: vec![finished_laliga],
                },
            )
            .with_details(1, match_one)
            .with_details(2, match_two)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detail_snapshots_advance_then_repeat() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let source = MockSource::demo(today);

        let first = source.fetch_match_details(1).await.unwrap();
        let second = source.fetch_match_details(1).await.unwrap();
        let third = source.fetch_match_details(1).await.unwrap();
        let fourth = source.fetch_match_details(1).await.unwrap();

        assert_eq!(first.events.len(), 2);
        assert_eq!(second.events.len(), 4);
        assert_eq!(third.summary.status, MatchStatus::Finished);
        assert_eq!(third, fourth);
        assert_eq!(second.summary.home_score, Some(2));
        assert_eq!(source.detail_calls(), 4);
    }

    #[tokio::test]
    async fn test_unknown_league_is_an_empty_page() {
        let source = MockSource::new();
        let page = source.fetch_league(999, Tab::Fixtures).await.unwrap();
        assert_eq!(page.league.id, 999);
        assert!(page.matches.is_empty());
        assert_eq!(source.league_calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_league_and_unknown_match() {
        let source = MockSource::new().with_failure(47);
        assert!(matches!(
            source.fetch_league(47, Tab::Results).await,
            Err(FeedError::Status { status: 503, .. })
        ));
        assert!(matches!(
            source.fetch_match_details(42).await,
            Err(FeedError::NotFound(42))
        ));
    }
}
