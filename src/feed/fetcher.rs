//! Fan-out of one logical query into concurrent per-league, per-tab requests.
//!
//! ```text
//!  matches_by_date(date)
//!      │  one task per (league, tab)
//!      ├──▶ empty cache? ──yes──▶ skip
//!      │        │ no
//!      │        ▼
//!      │   RateLimiter::wait ──▶ MatchSource::fetch_league (timeout)
//!      │        │
//!      ▼        ▼
//!   collector ◀── mpsc ── PairReport
//!      │  dedup by match id, mark leagues with no matches as empty
//!      ▼
//!   FetchOutcome
//! ```
//!
//! Individual failures are logged and dropped. Only the overall deadline cuts
//! the collection short, and even then the partial aggregate is returned.

use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::empty_cache::EmptyResultCache;
use super::provider::{MatchSource, Tab};
use super::rate_limit::RateLimiter;
use crate::models::{Match, MatchStatus};

/// Aggregated result of a fan-out.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub matches: Vec<Match>,
    /// False when the deadline expired before every request reported.
    pub complete: bool,
}

#[derive(Debug, Clone, Copy)]
enum Query {
    /// Matches kicking off on this UTC date
    Date(NaiveDate),
    /// Matches currently in play, any date
    Live,
}

impl Query {
    fn keep(&self, m: &Match) -> bool {
        match self {
            Query::Date(date) => m.kickoff.is_some_and(|k| k.date_naive() == *date),
            Query::Live => m.status == MatchStatus::Live,
        }
    }
}

enum PairResult {
    Skipped,
    Failed,
    Fetched(Vec<Match>),
}

struct PairReport {
    league_id: i64,
    result: PairResult,
}

/// Per-league bookkeeping in the collector.
#[derive(Default)]
struct LeagueTally {
    pending: usize,
    fetched: usize,
    failed: bool,
    found: usize,
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Clone)]
pub struct SourceFetcher {
    /// `None` in offline mode: every query returns an empty aggregate.
    source: Option<Arc<dyn MatchSource>>,
    limiter: Arc<RateLimiter>,
    cache: Arc<EmptyResultCache>,
    leagues: Vec<i64>,
    request_timeout: Duration,
}

impl SourceFetcher {
    pub fn new(
        source: Option<Arc<dyn MatchSource>>,
        limiter: Arc<RateLimiter>,
        cache: Arc<EmptyResultCache>,
        leagues: Vec<i64>,
        request_timeout: Duration,
    ) -> Self {
        SourceFetcher {
            source,
            limiter,
            cache,
            leagues,
            request_timeout,
        }
    }

    pub fn leagues(&self) -> &[i64] {
        &self.leagues
    }

    /// Matches on `date` across every configured league.
    pub async fn matches_by_date(&self, date: NaiveDate, tabs: &[Tab], deadline: Duration) -> FetchOutcome {
        self.fan_out(&self.leagues, tabs, Query::Date(date), deadline).await
    }

    /// Matches on `date` for a single league.
    pub async fn matches_for_league(
        &self,
        league_id: i64,
        date: NaiveDate,
        tabs: &[Tab],
        deadline: Duration,
    ) -> FetchOutcome {
        self.fan_out(&[league_id], tabs, Query::Date(date), deadline).await
    }

    /// Matches in play across every configured league.
    pub async fn live_matches(&self, deadline: Duration) -> FetchOutcome {
        self.fan_out(&self.leagues, &[Tab::Fixtures], Query::Live, deadline).await
    }

    /// Matches in play for a single league.
    pub async fn live_matches_for_league(&self, league_id: i64, deadline: Duration) -> FetchOutcome {
        self.fan_out(&[league_id], &[Tab::Fixtures], Query::Live, deadline).await
    }

    async fn fan_out(&self, leagues: &[i64], tabs: &[Tab], query: Query, deadline: Duration) -> FetchOutcome {
        let Some(source) = self.source.clone() else {
            debug!("No source configured, returning empty result");
            return FetchOutcome {
                matches: vec![],
                complete: true,
            };
        };
        if leagues.is_empty() || tabs.is_empty() {
            return FetchOutcome {
                matches: vec![],
                complete: true,
            };
        }

        // None: the deadline is beyond what the clock can represent
        let expires = Instant::now().checked_add(deadline);
        let (tx, mut rx) = mpsc::channel::<PairReport>(leagues.len() * tabs.len());
        let mut workers = JoinSet::new();
        let mut tallies: HashMap<i64, LeagueTally> = HashMap::new();

        for &tab in tabs {
            for &league_id in leagues {
                tallies.entry(league_id).or_default().pending += 1;
                workers.spawn(run_pair(
                    Arc::clone(&source),
                    Arc::clone(&self.limiter),
                    Arc::clone(&self.cache),
                    league_id,
                    tab,
                    query,
                    self.request_timeout,
                    tx.clone(),
                ));
            }
        }
        drop(tx);

        let mut seen: HashSet<i64> = HashSet::new();
        let mut matches: Vec<Match> = Vec::new();
        let mut complete = true;

        loop {
            let next = match expires {
                Some(at) => tokio::time::timeout_at(at, rx.recv()).await,
                None => Ok(rx.recv().await),
            };
            match next {
                Ok(Some(report)) => {
                    let tally = tallies.entry(report.league_id).or_default();
                    tally.pending = tally.pending.saturating_sub(1);
                    match report.result {
                        PairResult::Skipped => {}
                        PairResult::Failed => tally.failed = true,
                        PairResult::Fetched(batch) => {
                            tally.fetched += 1;
                            tally.found += batch.len();
                            for m in batch {
                                if seen.insert(m.id) {
                                    matches.push(m);
                                }
                            }
                        }
                    }
                    if let Query::Date(date) = query {
                        // skipped pairs must not push an existing expiry forward
                        if tally.pending == 0 && tally.fetched > 0 && !tally.failed && tally.found == 0 {
                            self.cache.mark_empty(&date_key(date), report.league_id);
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Fan-out deadline of {:?} expired with {} match(es) collected",
                        deadline,
                        matches.len()
                    );
                    complete = false;
                    break;
                }
            }
        }

        // Stragglers notice the closed channel or get aborted here.
        drop(rx);
        workers.abort_all();

        info!(
            "Fetched {} match(es) from {} league(s) x {} tab(s)",
            matches.len(),
            leagues.len(),
            tabs.len()
        );
        FetchOutcome { matches, complete }
    }
}

/// Re-run the live query every `every` until the receiver is dropped. The first
/// refresh arrives one interval after the call.
pub fn start_live_refresh(
    fetcher: SourceFetcher,
    every: Duration,
    deadline: Duration,
) -> (mpsc::Receiver<FetchOutcome>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(4);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tx.closed() => break,
            }
            let outcome = fetcher.live_matches(deadline).await;
            debug!("Live refresh: {} match(es)", outcome.matches.len());
            if tx.send(outcome).await.is_err() {
                break;
            }
        }
    });
    (rx, handle)
}

#[allow(clippy::too_many_arguments)]
async fn run_pair(
    source: Arc<dyn MatchSource>,
    limiter: Arc<RateLimiter>,
    cache: Arc<EmptyResultCache>,
    league_id: i64,
    tab: Tab,
    query: Query,
    request_timeout: Duration,
    tx: mpsc::Sender<PairReport>,
) {
    let result = fetch_pair(&*source, &limiter, &cache, league_id, tab, query, request_timeout).await;
    if tx.send(PairReport { league_id, result }).await.is_err() {
        debug!("Collector gone, discarding league {} ({})", league_id, tab.as_str());
    }
}

async fn fetch_pair(
    source: &dyn MatchSource,
    limiter: &RateLimiter,
    cache: &EmptyResultCache,
    league_id: i64,
    tab: Tab,
    query: Query,
    request_timeout: Duration,
) -> PairResult {
    if let Query::Date(date) = query {
        if cache.is_empty(&date_key(date), league_id) {
            debug!("League {} cached empty for {}, skipping", league_id, date);
            return PairResult::Skipped;
        }
    }

    limiter.wait().await;

    let page = match tokio::time::timeout(request_timeout, source.fetch_league(league_id, tab)).await {
        Ok(Ok(page)) => page,
        Ok(Err(e)) => {
            warn!("[{}] league {} ({}) dropped: {}", source.name(), league_id, tab.as_str(), e);
            return PairResult::Failed;
        }
        Err(_) => {
            warn!(
                "[{}] league {} ({}) timed out after {:?}",
                source.name(),
                league_id,
                tab.as_str(),
                request_timeout
            );
            return PairResult::Failed;
        }
    };

    let mut league = page.league;
    if league.is_unset() {
        league.id = league_id;
    }

    let matches: Vec<Match> = page
        .matches
        .into_iter()
        .filter(|m| query.keep(m))
        .map(|mut m| {
            if m.league.is_unset() {
                m.league = league.clone();
            }
            m
        })
        .collect();

    debug!(
        "[{}] league {} ({}): {} match(es)",
        source.name(),
        league_id,
        tab.as_str(),
        matches.len()
    );
    PairResult::Fetched(matches)
}
