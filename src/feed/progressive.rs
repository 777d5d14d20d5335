//! Progressive loading: split a slow multi-source load into units and hand
//! each unit's result to the consumer as soon as it arrives.
//!
//! Unit `i + 1` is requested when unit `i` reports. Every result is tagged with
//! `(session, index, is_last)`. `is_last` only says which unit it came from;
//! a session is complete when every unit has reported once, whatever the
//! arrival order. Restarting discards the old session, and results still in
//! flight for it are dropped on arrival.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use super::fetcher::SourceFetcher;
use super::provider::Tab;
use crate::models::{Match, MatchStatus};

#[derive(Debug, Clone)]
pub struct UnitResult<T> {
    pub session: u64,
    pub index: usize,
    pub is_last: bool,
    pub payload: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting(usize),
    /// Every unit reported; no unit outstanding.
    Waiting,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Belongs to another session.
    Stale,
    /// Index out of range or already reported.
    Duplicate,
    Progress { index: usize, next: Option<usize> },
    Complete { index: usize },
}

/// Per-load state owned by the consumer that started it.
#[derive(Debug)]
pub struct ProgressiveSession<T> {
    id: u64,
    total: usize,
    requested: Vec<bool>,
    received: Vec<bool>,
    completed: usize,
    buffer: BTreeMap<usize, T>,
    state: SessionState,
}

impl<T> ProgressiveSession<T> {
    pub fn new(id: u64, total: usize) -> Self {
        ProgressiveSession {
            id,
            total,
            requested: vec![false; total],
            received: vec![false; total],
            completed: 0,
            buffer: BTreeMap::new(),
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// `Idle -> Requesting(0)`. Returns the unit to request, or `None` if the
    /// session has no units (it completes at once) or was already started.
    pub fn start(&mut self) -> Option<usize> {
        if self.state != SessionState::Idle {
            return None;
        }
        if self.total == 0 {
            self.state = SessionState::Complete;
            return None;
        }
        self.requested[0] = true;
        self.state = SessionState::Requesting(0);
        Some(0)
    }

    fn next_unrequested(&self, after: usize) -> Option<usize> {
        (after + 1..self.total).find(|&j| !self.requested[j] && !self.received[j])
    }

    pub fn accept(&mut self, result: UnitResult<T>) -> Accepted {
        if result.session != self.id {
            return Accepted::Stale;
        }
        let index = result.index;
        if index >= self.total || self.received[index] {
            return Accepted::Duplicate;
        }

        self.received[index] = true;
        self.completed += 1;
        self.buffer.insert(index, result.payload);

        if self.completed == self.total {
            self.state = SessionState::Complete;
            return Accepted::Complete { index };
        }

        let next = match self.state {
            SessionState::Requesting(current) if current == index => {
                let next = self.next_unrequested(index);
                match next {
                    Some(j) => {
                        self.requested[j] = true;
                        self.state = SessionState::Requesting(j);
                    }
                    None => self.state = SessionState::Waiting,
                }
                next
            }
            _ => None,
        };
        Accepted::Progress { index, next }
    }

    pub fn payload(&self, index: usize) -> Option<&T> {
        self.buffer.get(&index)
    }

    /// Reported payloads in unit order.
    pub fn payloads(&self) -> impl Iterator<Item = (usize, &T)> {
        self.buffer.iter().map(|(i, p)| (*i, p))
    }
}

/// A load split into `total()` independently fetchable units.
#[async_trait]
pub trait UnitLoader: Send + Sync + 'static {
    type Item: Send + 'static;

    fn total(&self) -> usize;

    /// Load one unit. Failures are folded into an empty payload.
    async fn load(&self, index: usize) -> Self::Item;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub session: u64,
    pub index: usize,
    pub is_last: bool,
    pub completed: usize,
    pub total: usize,
    pub done: bool,
}

/// Drives one [`ProgressiveSession`] at a time over a [`UnitLoader`].
pub struct ProgressiveLoader<L: UnitLoader> {
    loader: Arc<L>,
    session: ProgressiveSession<L::Item>,
    last_session: u64,
    tx: mpsc::UnboundedSender<UnitResult<L::Item>>,
    rx: mpsc::UnboundedReceiver<UnitResult<L::Item>>,
    inflight: Vec<AbortHandle>,
}

impl<L: UnitLoader> ProgressiveLoader<L> {
    pub fn new(loader: Arc<L>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        ProgressiveLoader {
            loader,
            session: ProgressiveSession::new(0, 0),
            last_session: 0,
            tx,
            rx,
            inflight: Vec::new(),
        }
    }

    pub fn session(&self) -> &ProgressiveSession<L::Item> {
        &self.session
    }

    /// Drop the current session and request unit 0 of a new one.
    pub fn start(&mut self) -> u64 {
        for handle in self.inflight.drain(..) {
            handle.abort();
        }
        self.last_session += 1;
        let total = self.loader.total();
        self.session = ProgressiveSession::new(self.last_session, total);
        info!("Progressive session {} started ({} units)", self.last_session, total);
        if let Some(first) = self.session.start() {
            self.request(first);
        }
        self.last_session
    }

    fn request(&mut self, index: usize) {
        self.inflight.retain(|h| !h.is_finished());
        let loader = Arc::clone(&self.loader);
        let tx = self.tx.clone();
        let session = self.session.id();
        let total = self.session.total();
        debug!("Session {}: requesting unit {}/{}", session, index + 1, total);
        let handle = tokio::spawn(async move {
            let payload = loader.load(index).await;
            let _ = tx.send(UnitResult {
                session,
                index,
                is_last: index + 1 == total,
                payload,
            });
        });
        self.inflight.push(handle.abort_handle());
    }

    /// Wait for the next unit of the current session. `None` once the
    /// session is complete or was never started.
    pub async fn next(&mut self) -> Option<Progress> {
        loop {
            if matches!(self.session.state(), SessionState::Idle | SessionState::Complete) {
                return None;
            }
            let result = self.rx.recv().await?;
            let is_last = result.is_last;
            let (index, next, done) = match self.session.accept(result) {
                Accepted::Stale | Accepted::Duplicate => continue,
                Accepted::Progress { index, next } => (index, next, false),
                Accepted::Complete { index } => (index, None, true),
            };
            if let Some(n) = next {
                self.request(n);
            }
            if done {
                info!("Progressive session {} complete", self.session.id());
            }
            return Some(Progress {
                session: self.session.id(),
                index,
                is_last,
                completed: self.session.completed(),
                total: self.session.total(),
                done,
            });
        }
    }
}

// ── Loaders ──────────────────────────────────────────────────────────────────

/// Live matches, one unit per league.
pub struct LeagueUnits {
    fetcher: SourceFetcher,
    leagues: Vec<i64>,
    deadline: Duration,
}

impl LeagueUnits {
    pub fn new(fetcher: SourceFetcher, deadline: Duration) -> Self {
        let leagues = fetcher.leagues().to_vec();
        LeagueUnits {
            fetcher,
            leagues,
            deadline,
        }
    }

    pub fn league_at(&self, index: usize) -> Option<i64> {
        self.leagues.get(index).copied()
    }
}

#[async_trait]
impl UnitLoader for LeagueUnits {
    type Item = Vec<Match>;

    fn total(&self) -> usize {
        self.leagues.len()
    }

    async fn load(&self, index: usize) -> Vec<Match> {
        match self.league_at(index) {
            Some(league) => {
                self.fetcher
                    .live_matches_for_league(league, self.deadline)
                    .await
                    .matches
            }
            None => vec![],
        }
    }
}

/// Finished and upcoming matches of one day.
#[derive(Debug, Clone, Default)]
pub struct DayResult {
    pub date: Option<NaiveDate>,
    pub finished: Vec<Match>,
    pub upcoming: Vec<Match>,
}

/// One unit per day, going back from `today`. Today queries both tabs and
/// keeps upcoming matches; earlier days only need results.
pub struct DayUnits {
    fetcher: SourceFetcher,
    today: NaiveDate,
    days: usize,
    deadline: Duration,
}

impl DayUnits {
    pub fn new(fetcher: SourceFetcher, today: NaiveDate, days: usize, deadline: Duration) -> Self {
        DayUnits {
            fetcher,
            today,
            days,
            deadline,
        }
    }

    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.today.checked_sub_signed(ChronoDuration::days(index as i64))
    }
}

#[async_trait]
impl UnitLoader for DayUnits {
    type Item = DayResult;

    fn total(&self) -> usize {
        self.days
    }

    async fn load(&self, index: usize) -> DayResult {
        let Some(date) = self.date_at(index) else {
            return DayResult::default();
        };
        let is_today = index == 0;
        let tabs: &[Tab] = if is_today {
            &[Tab::Fixtures, Tab::Results]
        } else {
            &[Tab::Results]
        };
        let outcome = self.fetcher.matches_by_date(date, tabs, self.deadline).await;

        let mut result = DayResult {
            date: Some(date),
            ..DayResult::default()
        };
        for m in outcome.matches {
            match m.status {
                MatchStatus::Finished => result.finished.push(m),
                MatchStatus::NotStarted if is_today => result.upcoming.push(m),
                _ => {}
            }
        }
        result
    }
}

/// All matches reported so far, in unit order, each id once.
pub fn merged_matches(session: &ProgressiveSession<Vec<Match>>) -> Vec<Match> {
    let mut seen = HashSet::new();
    session
        .payloads()
        .flat_map(|(_, batch)| batch.iter())
        .filter(|m| seen.insert(m.id))
        .cloned()
        .collect()
}

/// Finished matches across all days reported so far, plus today's upcoming.
pub fn merged_days(session: &ProgressiveSession<DayResult>) -> (Vec<Match>, Vec<Match>) {
    let mut seen = HashSet::new();
    let mut finished = Vec::new();
    let mut upcoming = Vec::new();
    for (_, day) in session.payloads() {
        finished.extend(day.finished.iter().filter(|m| seen.insert(m.id)).cloned());
        upcoming.extend(day.upcoming.iter().filter(|m| seen.insert(m.id)).cloned());
    }
    (finished, upcoming)
}
