use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::feed::empty_cache::MAX_TTL_DAYS;
use crate::feed::fotmob::{DEFAULT_BASE_URL, SUPPORTED_LEAGUES};

/// Upper bound for every interval and timeout flag.
pub const MAX_WAIT_SECS: u64 = 3600;

/// Football match aggregator over the FotMob API
#[derive(Parser, Debug, Clone)]
#[command(name = "matchday-feed", version, about)]
pub struct Config {
    /// Match data API base URL
    #[arg(long, env = "FEED_API_URL", default_value = DEFAULT_BASE_URL)]
    pub api_url: String,

    /// User-Agent sent with every request (the API rejects requests without one)
    #[arg(long, env = "FEED_USER_AGENT", default_value = "Mozilla/5.0")]
    pub user_agent: String,

    /// Minimum spacing between outbound requests in milliseconds (negative = none)
    #[arg(
        long,
        env = "MIN_REQUEST_INTERVAL_MS",
        default_value = "200",
        allow_negative_numbers = true
    )]
    pub min_request_interval_ms: i64,

    /// Empty-result cache file
    #[arg(long, env = "EMPTY_CACHE_PATH", default_value = "~/.matchday/empty-results.json")]
    pub cache_path: String,

    /// Days before an empty-result marker expires
    #[arg(long, env = "EMPTY_CACHE_TTL_DAYS", default_value = "7")]
    pub cache_ttl_days: i64,

    /// Live match polling interval in seconds
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "90")]
    pub poll_interval_secs: u64,

    /// Timeout for a single league or match-details request in seconds
    #[arg(long, env = "DETAILS_TIMEOUT_SECS", default_value = "10")]
    pub details_timeout_secs: u64,

    /// Deadline for a whole multi-league query in seconds
    #[arg(long, env = "FANOUT_TIMEOUT_SECS", default_value = "30")]
    pub fanout_timeout_secs: u64,

    /// Serve canned demo data instead of calling the API
    #[arg(long, env = "MOCK", default_value = "false")]
    pub mock: bool,

    /// No data source at all: every query returns nothing
    #[arg(long, env = "OFFLINE", default_value = "false", conflicts_with = "mock")]
    pub offline: bool,

    /// Disable goal notifications
    #[arg(long, env = "NO_NOTIFICATIONS", default_value = "false")]
    pub no_notifications: bool,

    /// Comma-separated league ids to query instead of the built-in list
    #[arg(long, env = "FEED_LEAGUES", value_delimiter = ',')]
    pub leagues: Vec<i64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Matches on a date (default: today, UTC)
    Matches {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Only this league
        #[arg(long)]
        league: Option<i64>,
    },
    /// Matches in play, loaded league by league, then refreshed periodically
    Live {
        /// Seconds between refreshes of the live list (0 = load once)
        #[arg(long, env = "LIVE_REFRESH_SECS", default_value = "300")]
        refresh_secs: u64,
    },
    /// Finished matches of the last N days plus today's upcoming ones
    Results {
        #[arg(long, default_value = "1")]
        days: usize,
    },
    /// Follow a live match and print new events as they happen
    Follow {
        match_id: i64,
    },
    /// Show empty-result cache entry counts
    CacheStats,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_WAIT_SECS).contains(&self.poll_interval_secs) {
            anyhow::bail!("poll_interval_secs must be between 1 and {}", MAX_WAIT_SECS);
        }
        if !(1..=MAX_TTL_DAYS).contains(&self.cache_ttl_days) {
            anyhow::bail!("cache_ttl_days must be between 1 and {}", MAX_TTL_DAYS);
        }
        for timeout in [self.details_timeout_secs, self.fanout_timeout_secs] {
            if !(1..=MAX_WAIT_SECS).contains(&timeout) {
                anyhow::bail!("timeouts must be between 1 and {} seconds", MAX_WAIT_SECS);
            }
        }
        if self.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent must not be empty");
        }
        if self.leagues.iter().any(|&id| id <= 0) {
            anyhow::bail!("league ids must be positive");
        }
        match self.command {
            Command::Results { days } if !(1..=5).contains(&days) => {
                anyhow::bail!("--days must be between 1 and 5");
            }
            Command::Matches { league: Some(id), .. } if id <= 0 => {
                anyhow::bail!("league ids must be positive");
            }
            Command::Live { refresh_secs } if refresh_secs > MAX_WAIT_SECS => {
                anyhow::bail!("--refresh-secs must be at most {}", MAX_WAIT_SECS);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn leagues(&self) -> Vec<i64> {
        if self.leagues.is_empty() {
            SUPPORTED_LEAGUES.to_vec()
        } else {
            self.leagues.clone()
        }
    }

    /// `cache_path` with a leading `~` expanded from `HOME`.
    pub fn cache_path(&self) -> PathBuf {
        expand_home(&self.cache_path, std::env::var_os("HOME").map(PathBuf::from))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.details_timeout_secs)
    }

    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_secs(self.fanout_timeout_secs)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.cache_ttl_days)
    }
}

fn expand_home(raw: &str, home: Option<PathBuf>) -> PathBuf {
    match (raw.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["matchday-feed"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let c = parse(&["live"]);
        assert_eq!(c.min_request_interval_ms, 200);
        assert_eq!(c.poll_interval(), Duration::from_secs(90));
        assert_eq!(c.cache_ttl(), chrono::Duration::days(7));
        assert_eq!(c.leagues(), SUPPORTED_LEAGUES.to_vec());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_league_override_and_negative_interval() {
        let c = parse(&["--leagues", "47,87", "--min-request-interval-ms", "-5", "live"]);
        assert_eq!(c.leagues(), vec![47, 87]);
        assert_eq!(c.min_request_interval_ms, -5);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_results_days_range() {
        assert!(parse(&["results", "--days", "5"]).validate().is_ok());
        assert!(parse(&["results", "--days", "0"]).validate().is_err());
        assert!(parse(&["results", "--days", "6"]).validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        assert!(parse(&["--poll-interval-secs", "0", "follow", "1"]).validate().is_err());
    }

    #[test]
    fn test_oversized_ttl_and_timeouts_rejected() {
        assert!(parse(&["--cache-ttl-days", "365", "live"]).validate().is_ok());
        assert!(parse(&["--cache-ttl-days", "100000000", "live"]).validate().is_err());
        assert!(parse(&["--fanout-timeout-secs", "18446744073709551615", "live"]).validate().is_err());
        assert!(parse(&["--details-timeout-secs", "3601", "live"]).validate().is_err());
        assert!(parse(&["--poll-interval-secs", "3601", "follow", "1"]).validate().is_err());
    }

    #[test]
    fn test_live_refresh_interval() {
        match parse(&["live"]).command {
            Command::Live { refresh_secs } => assert_eq!(refresh_secs, 300),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(parse(&["live", "--refresh-secs", "0"]).validate().is_ok());
        assert!(parse(&["live", "--refresh-secs", "7200"]).validate().is_err());
    }

    #[test]
    fn test_matches_date_argument() {
        let c = parse(&["matches", "--date", "2025-03-01"]);
        match c.command {
            Command::Matches { date, league } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 3, 1));
                assert_eq!(league, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_matches_single_league() {
        let c = parse(&["matches", "--league", "47"]);
        assert!(matches!(c.command, Command::Matches { league: Some(47), .. }));
        assert!(c.validate().is_ok());
        assert!(parse(&["matches", "--league", "0"]).validate().is_err());
    }

    #[test]
    fn test_expand_home() {
        let home = Some(PathBuf::from("/home/fan"));
        assert_eq!(
            expand_home("~/.matchday/empty-results.json", home.clone()),
            PathBuf::from("/home/fan/.matchday/empty-results.json")
        );
        assert_eq!(expand_home("/tmp/cache.json", home), PathBuf::from("/tmp/cache.json"));
        assert_eq!(expand_home("~/x.json", None), PathBuf::from("~/x.json"));
    }
}
