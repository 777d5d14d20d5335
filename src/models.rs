use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A competition queried as one upstream source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct League {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub country_code: String,
}

impl League {
    /// A league with id 0 carries no metadata yet.
    pub fn is_unset(&self) -> bool {
        self.id == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub short_name: String,
}

impl Team {
    /// Short name when present, full name otherwise.
    pub fn label(&self) -> &str {
        if self.short_name.is_empty() {
            &self.name
        } else {
            &self.short_name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    NotStarted,
    Live,
    Finished,
    Postponed,
    Cancelled,
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchStatus::NotStarted => "NS",
            MatchStatus::Live => "LIVE",
            MatchStatus::Finished => "FT",
            MatchStatus::Postponed => "PST",
            MatchStatus::Cancelled => "CANC",
        };
        f.write_str(s)
    }
}

/// One fixture as reported by a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Stable across polls
    pub id: i64,
    pub league: League,
    pub home_team: Team,
    pub away_team: Team,
    pub status: MatchStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub kickoff: Option<DateTime<Utc>>,
    /// e.g. "45+2", "HT"
    pub live_time: Option<String>,
    pub round: Option<String>,
}

impl Match {
    /// One-line summary used by the CLI listings.
    pub fn summary(&self) -> String {
        let score = match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => format!("{} - {}", h, a),
            _ => "vs".to_string(),
        };
        let clock = match (&self.live_time, self.status) {
            (Some(t), MatchStatus::Live) => format!(" ({})", t),
            _ => String::new(),
        };
        format!(
            "[{}] {} {} {} {}{}",
            self.league.name,
            self.home_team.label(),
            score,
            self.away_team.label(),
            self.status,
            clock
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Goal,
    Card,
    Substitution,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

/// One incident inside a match. Identified by `id`, which is never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub id: i64,
    pub minute: i32,
    pub kind: EventKind,
    pub team: Team,
    pub player: Option<String>,
    pub assist: Option<String>,
    /// Card colour ("yellow", "red", "yellowred") or substitution direction
    pub detail: Option<String>,
    /// Player leaving the pitch on a substitution
    pub player_out: Option<String>,
}

/// Full snapshot of one match as returned by a details query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetails {
    #[serde(flatten)]
    pub summary: Match,
    pub events: Vec<MatchEvent>,
    pub venue: Option<String>,
    pub referee: Option<String>,
}

/// Formatted, self-contained line for the live updates panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayUpdate {
    pub kind: EventKind,
    pub side: Side,
    pub text: String,
}

/// Everything a goal notification needs, with the score after the goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalAlert {
    pub match_id: i64,
    pub scorer: Option<String>,
    pub assist: Option<String>,
    pub minute: i32,
    pub team: Team,
    pub home_team: Team,
    pub away_team: Team,
    pub home_score: i32,
    pub away_score: i32,
}
