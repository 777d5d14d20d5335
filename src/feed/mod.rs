pub mod differ;
pub mod empty_cache;
pub mod fetcher;
pub mod fotmob;
pub mod mock;
pub mod poller;
pub mod progressive;
pub mod provider;
pub mod rate_limit;

pub use empty_cache::{EmptyResultCache, SystemClock};
pub use fetcher::{start_live_refresh, SourceFetcher};
pub use fotmob::FotmobClient;
pub use mock::MockSource;
pub use poller::{start_match_poll, MatchPoller, PollMessage};
pub use progressive::{merged_days, merged_matches, DayUnits, LeagueUnits, ProgressiveLoader};
pub use provider::{MatchSource, Tab};
pub use rate_limit::RateLimiter;
