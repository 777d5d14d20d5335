use async_trait::async_trait;

use crate::error::FeedResult;
use crate::models::{League, Match, MatchDetails};

/// Sub-query against one league.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tab {
    /// Upcoming fixtures
    Fixtures,
    /// Finished results
    Results,
}

impl Tab {
    pub fn as_str(self) -> &'static str {
        match self {
            Tab::Fixtures => "fixtures",
            Tab::Results => "results",
        }
    }
}

/// One league response: header metadata plus every match on that tab.
#[derive(Debug, Clone, Default)]
pub struct LeaguePage {
    pub league: League,
    pub matches: Vec<Match>,
}

/// Trait that every match data source must implement.
#[async_trait]
pub trait MatchSource: Send + Sync {
    /// All matches for one league on one tab, unfiltered by date.
    async fn fetch_league(&self, league_id: i64, tab: Tab) -> FeedResult<LeaguePage>;

    /// Full snapshot of one match including its event list.
    async fn fetch_match_details(&self, match_id: i64) -> FeedResult<MatchDetails>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
