//! Polls one match while it is live and streams new events to the consumer.
//!
//! A poller is idle until [`MatchPoller::run`] and idle again once it returns.
//! Each iteration fetches the full details, diffs the
//! event list against the previous one, emits formatted updates and goal
//! alerts, and keeps polling only while the match reports `Live`. Any fetch
//! failure ends the loop; there are no retries.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::differ::{format_events, goal_events, new_events, side_of};
use super::provider::MatchSource;
use super::rate_limit::RateLimiter;
use crate::models::{DisplayUpdate, GoalAlert, MatchDetails, MatchEvent, MatchStatus, Side};
use crate::notify::GoalNotifier;

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The match reported a status other than live.
    Status(MatchStatus),
    FetchFailed(String),
    /// No source configured.
    Offline,
    /// The receiving side of the channel was dropped.
    ConsumerGone,
}

#[derive(Debug, Clone)]
pub enum PollMessage {
    Updates { match_id: i64, updates: Vec<DisplayUpdate> },
    Goal(GoalAlert),
    Stopped { match_id: i64, reason: StopReason },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub iterations: usize,
    /// How many iterations compared against a previous event list.
    pub diffs: usize,
    pub final_status: Option<MatchStatus>,
    pub reason: StopReason,
}

enum Step {
    Continue,
    Stop(StopReason),
}

pub struct MatchPoller {
    source: Option<Arc<dyn MatchSource>>,
    limiter: Arc<RateLimiter>,
    notifier: Arc<dyn GoalNotifier>,
    match_id: i64,
    interval: Duration,
    request_timeout: Duration,
    previous: Vec<MatchEvent>,
    iterations: usize,
    diffs: usize,
    last_status: Option<MatchStatus>,
}

impl MatchPoller {
    pub fn new(
        source: Option<Arc<dyn MatchSource>>,
        limiter: Arc<RateLimiter>,
        notifier: Arc<dyn GoalNotifier>,
        match_id: i64,
        interval: Duration,
        request_timeout: Duration,
    ) -> Self {
        MatchPoller {
            source,
            limiter,
            notifier,
            match_id,
            interval,
            request_timeout,
            previous: Vec::new(),
            iterations: 0,
            diffs: 0,
            last_status: None,
        }
    }

    /// A fresh match starts with no known events, so the first iteration
    /// reports the whole history.
    fn begin(&mut self) {
        self.previous.clear();
        self.iterations = 0;
        self.diffs = 0;
        self.last_status = None;
        info!("Polling match {} every {:?}", self.match_id, self.interval);
    }

    async fn fetch(&self) -> Result<MatchDetails, StopReason> {
        let Some(source) = self.source.as_ref() else {
            return Err(StopReason::Offline);
        };
        self.limiter.wait().await;
        match tokio::time::timeout(self.request_timeout, source.fetch_match_details(self.match_id)).await {
            Ok(Ok(details)) => Ok(details),
            Ok(Err(e)) => Err(StopReason::FetchFailed(e.to_string())),
            Err(_) => Err(StopReason::FetchFailed(format!(
                "timed out after {:?}",
                self.request_timeout
            ))),
        }
    }

    async fn step(&mut self, tx: &mpsc::Sender<PollMessage>) -> Step {
        self.iterations += 1;
        let details = match self.fetch().await {
            Ok(d) => d,
            Err(reason) => {
                warn!("Match {} poll stopped: {:?}", self.match_id, reason);
                return Step::Stop(reason);
            }
        };

        let delta = if self.iterations == 1 {
            details.events.clone()
        } else {
            self.diffs += 1;
            new_events(&self.previous, &details.events)
        };

        if !delta.is_empty() {
            debug!("Match {}: {} new event(s)", self.match_id, delta.len());
            let updates = format_events(&delta, details.summary.home_team.id);
            if tx
                .send(PollMessage::Updates {
                    match_id: self.match_id,
                    updates,
                })
                .await
                .is_err()
            {
                return Step::Stop(StopReason::ConsumerGone);
            }

            for alert in goal_alerts(&details, &delta) {
                if let Err(e) = self.notifier.goal(&alert) {
                    warn!("Goal notification failed: {:#}", e);
                }
                if tx.send(PollMessage::Goal(alert)).await.is_err() {
                    return Step::Stop(StopReason::ConsumerGone);
                }
            }
        }

        self.previous = details.events;
        let status = details.summary.status;
        self.last_status = Some(status);
        if status == MatchStatus::Live {
            Step::Continue
        } else {
            Step::Stop(StopReason::Status(status))
        }
    }

    /// Poll until the match stops being live, the fetch fails or the receiver
    /// goes away.
    pub async fn run(mut self, tx: mpsc::Sender<PollMessage>) -> PollOutcome {
        self.begin();
        let reason = loop {
            match self.step(&tx).await {
                Step::Continue => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.interval) => {}
                        _ = tx.closed() => break StopReason::ConsumerGone,
                    }
                }
                Step::Stop(reason) => break reason,
            }
        };

        info!(
            "Stopped polling match {} after {} iteration(s): {:?}",
            self.match_id, self.iterations, reason
        );
        let _ = tx
            .send(PollMessage::Stopped {
                match_id: self.match_id,
                reason: reason.clone(),
            })
            .await;

        PollOutcome {
            iterations: self.iterations,
            diffs: self.diffs,
            final_status: self.last_status,
            reason,
        }
    }
}

/// Spawn the poll loop; messages arrive on the returned channel.
pub fn start_match_poll(poller: MatchPoller) -> (mpsc::Receiver<PollMessage>, JoinHandle<PollOutcome>) {
    let (tx, rx) = mpsc::channel(256);
    let handle = tokio::spawn(poller.run(tx));
    (rx, handle)
}

/// Alerts for the goals in `delta`, each carrying the score right after it.
///
/// The reported score already includes every goal in `delta`, so replaying
/// starts from that score minus the new goals.
pub fn goal_alerts(details: &MatchDetails, delta: &[MatchEvent]) -> Vec<GoalAlert> {
    let summary = &details.summary;
    let home_id = summary.home_team.id;

    let new_home = goal_events(delta)
        .filter(|e| side_of(e, home_id) == Side::Home)
        .count() as i32;
    let new_away = goal_events(delta).count() as i32 - new_home;

    let mut home = (summary.home_score.unwrap_or(0) - new_home).max(0);
    let mut away = (summary.away_score.unwrap_or(0) - new_away).max(0);

    goal_events(delta)
        .map(|goal| {
            match side_of(goal, home_id) {
                Side::Home => home += 1,
                Side::Away => away += 1,
            }
            GoalAlert {
                match_id: summary.id,
                scorer: goal.player.clone(),
                assist: goal.assist.clone(),
                minute: goal.minute,
                team: goal.team.clone(),
                home_team: summary.home_team.clone(),
                away_team: summary.away_team.clone(),
                home_score: home,
                away_score: away,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::mock::{at, event, fixture, snapshot, team, MockSource};
    use crate::models::EventKind;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<GoalAlert>>,
    }

    impl GoalNotifier for RecordingNotifier {
        fn goal(&self, alert: &GoalAlert) -> anyhow::Result<()> {
            self.alerts.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn base() -> crate::models::Match {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        fixture(
            7,
            &team(1, "Manchester United", "Man Utd"),
            &team(2, "Liverpool", "Liverpool"),
            MatchStatus::Live,
            Some((0, 0)),
            at(day, 15),
        )
    }

    fn events() -> Vec<MatchEvent> {
        let m = base();
        vec![
            event(1, 12, EventKind::Goal, &m.home_team, "Rashford"),
            event(2, 34, EventKind::Goal, &m.away_team, "Salah"),
            event(3, 45, EventKind::Card, &m.home_team, "Casemiro"),
            event(4, 56, EventKind::Goal, &m.home_team, "Fernandes"),
        ]
    }

    fn poller(source: Option<Arc<dyn MatchSource>>, notifier: Arc<RecordingNotifier>) -> MatchPoller {
        MatchPoller::new(
            source,
            Arc::new(RateLimiter::new(Duration::ZERO)),
            notifier,
            7,
            Duration::from_secs(90),
            Duration::from_secs(10),
        )
    }

    async fn drain(mut rx: mpsc::Receiver<PollMessage>) -> Vec<PollMessage> {
        let mut out = Vec::new();
        while let Some(msg) = rx.recv().await {
            out.push(msg);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn live_live_finished_diffs_twice_then_stops() {
        let ev = events();
        let source = Arc::new(MockSource::new().with_details(
            7,
            vec![
                snapshot(&base(), MatchStatus::Live, ev[..2].to_vec()),
                snapshot(&base(), MatchStatus::Live, ev[..3].to_vec()),
                snapshot(&base(), MatchStatus::Finished, ev.clone()),
            ],
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let (rx, handle) = start_match_poll(poller(Some(source.clone()), notifier.clone()));

        let messages = drain(rx).await;
        let outcome = handle.await.unwrap();

        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.diffs, 2);
        assert_eq!(outcome.final_status, Some(MatchStatus::Finished));
        assert_eq!(outcome.reason, StopReason::Status(MatchStatus::Finished));
        assert_eq!(source.detail_calls(), 3);

        let update_batches: Vec<usize> = messages
            .iter()
            .filter_map(|m| match m {
                PollMessage::Updates { updates, .. } => Some(updates.len()),
                _ => None,
            })
            .collect();
        assert_eq!(update_batches, vec![2, 1, 1]);
        assert!(matches!(
            messages.last(),
            Some(PollMessage::Stopped { reason: StopReason::Status(MatchStatus::Finished), .. })
        ));

        // one alert per goal, never repeated
        let alerts = notifier.alerts.lock().unwrap();
        let scorers: Vec<_> = alerts.iter().map(|a| a.scorer.clone().unwrap()).collect();
        assert_eq!(scorers, vec!["Rashford", "Salah", "Fernandes"]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_iteration_reports_full_history_with_running_score() {
        let source = Arc::new(
            MockSource::new().with_details(7, vec![snapshot(&base(), MatchStatus::Finished, events())]),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let (rx, handle) = start_match_poll(poller(Some(source), notifier.clone()));
        let messages = drain(rx).await;
        let outcome = handle.await.unwrap();

        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.diffs, 0);
        match &messages[0] {
            PollMessage::Updates { updates, .. } => {
                assert_eq!(updates.len(), 4);
                assert_eq!(updates[1].side, Side::Away);
            }
            other => panic!("unexpected first message {:?}", other),
        }

        let scores: Vec<(i32, i32)> = notifier
            .alerts
            .lock()
            .unwrap()
            .iter()
            .map(|a| (a.home_score, a.away_score))
            .collect();
        assert_eq!(scores, vec![(1, 0), (1, 1), (2, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_stops_polling() {
        let source = Arc::new(MockSource::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let (rx, handle) = start_match_poll(poller(Some(source), notifier));
        let messages = drain(rx).await;
        let outcome = handle.await.unwrap();

        assert_eq!(outcome.iterations, 1);
        assert!(matches!(outcome.reason, StopReason::FetchFailed(_)));
        assert_eq!(outcome.final_status, None);
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn offline_poller_stops_immediately() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (rx, handle) = start_match_poll(poller(None, notifier));
        drain(rx).await;
        assert_eq!(handle.await.unwrap().reason, StopReason::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn postponed_match_is_not_polled_again() {
        let source = Arc::new(
            MockSource::new().with_details(7, vec![snapshot(&base(), MatchStatus::Postponed, vec![])]),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let (rx, handle) = start_match_poll(poller(Some(source.clone()), notifier));
        let messages = drain(rx).await;
        let outcome = handle.await.unwrap();

        assert_eq!(outcome.reason, StopReason::Status(MatchStatus::Postponed));
        assert_eq!(source.detail_calls(), 1);
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_receiver_ends_the_loop() {
        let source = Arc::new(
            MockSource::new().with_details(7, vec![snapshot(&base(), MatchStatus::Live, events())]),
        );
        let notifier = Arc::new(RecordingNotifier::default());
        let (rx, handle) = start_match_poll(poller(Some(source), notifier));
        drop(rx);
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.reason, StopReason::ConsumerGone);
    }

    #[test]
    fn goal_alerts_replay_from_score_before_delta() {
        let mut details = snapshot(&base(), MatchStatus::Live, events());
        details.summary.home_score = Some(3);
        details.summary.away_score = Some(1);
        let delta = vec![events()[3].clone()];
        let alerts = goal_alerts(&details, &delta);
        assert_eq!(alerts.len(), 1);
        assert_eq!((alerts[0].home_score, alerts[0].away_score), (3, 1));
        assert_eq!(alerts[0].minute, 56);
    }
}
