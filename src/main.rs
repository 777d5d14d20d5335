use anyhow::Result;
use chrono::{NaiveDate, Utc};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

mod config;
mod error;
mod feed;
mod models;
mod notify;

use config::{Command, Config};
use feed::{
    merged_days, merged_matches, start_live_refresh, start_match_poll, DayUnits, EmptyResultCache,
    FotmobClient, LeagueUnits, MatchPoller, MatchSource, MockSource, PollMessage, ProgressiveLoader,
    RateLimiter, SourceFetcher, SystemClock, Tab,
};
use models::Match;
use notify::{DesktopNotifier, GoalNotifier, LogNotifier, GOAL_TITLE};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let today = Utc::now().date_naive();

    // Canned data never touches the on-disk cache
    let clock = Arc::new(SystemClock);
    let cache = if config.mock {
        Arc::new(EmptyResultCache::new(config.cache_path(), config.cache_ttl(), clock))
    } else {
        Arc::new(EmptyResultCache::open(config.cache_path(), config.cache_ttl(), clock))
    };

    let source: Option<Arc<dyn MatchSource>> = if config.offline {
        info!("🔌 Offline mode – every query returns nothing");
        None
    } else if config.mock {
        info!("🧪 Mock mode – serving demo data");
        Some(Arc::new(MockSource::demo(today)))
    } else {
        Some(Arc::new(FotmobClient::new(
            &config.api_url,
            &config.user_agent,
            config.request_timeout(),
        )?))
    };
    if let Some(s) = &source {
        info!("Data source: {}", s.name());
    }

    let limiter = Arc::new(RateLimiter::from_millis(config.min_request_interval_ms));
    info!("Minimum request spacing: {:?}", limiter.min_interval());
    let fetcher = SourceFetcher::new(
        source.clone(),
        Arc::clone(&limiter),
        Arc::clone(&cache),
        config.leagues(),
        config.request_timeout(),
    );

    let result = match config.command.clone() {
        Command::Matches { date, league } => {
            show_matches(&fetcher, date.unwrap_or(today), league, &config).await
        }
        Command::Live { refresh_secs } => show_live(fetcher, refresh_secs, &config).await,
        Command::Results { days } => show_results(fetcher, today, days, &config).await,
        Command::Follow { match_id } => {
            let notifier: Arc<dyn GoalNotifier> = if config.no_notifications {
                Arc::new(LogNotifier::new(false))
            } else {
                Arc::new(DesktopNotifier::new())
            };
            follow(source, limiter, notifier, match_id, &config).await
        }
        Command::CacheStats => {
            let (total, expired) = cache.stats();
            println!("Empty-result cache: {}", cache.path().display());
            println!("  entries: {}", total);
            println!("  expired: {}", expired);
            Ok(())
        }
    };

    if !config.mock {
        if let Err(e) = cache.save() {
            warn!("Failed to save empty-result cache: {:#}", e);
        }
    }

    result
}

fn print_matches(matches: &mut [Match]) {
    matches.sort_by(|a, b| a.kickoff.cmp(&b.kickoff).then(a.id.cmp(&b.id)));
    for m in matches.iter() {
        let kickoff = m
            .kickoff
            .map(|k| k.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string());
        println!("{}  {}", kickoff, m.summary());
    }
}

async fn show_matches(
    fetcher: &SourceFetcher,
    date: NaiveDate,
    league: Option<i64>,
    config: &Config,
) -> Result<()> {
    let tabs = [Tab::Fixtures, Tab::Results];
    let outcome = match league {
        Some(id) => fetcher.matches_for_league(id, date, &tabs, config.fanout_timeout()).await,
        None => fetcher.matches_by_date(date, &tabs, config.fanout_timeout()).await,
    };
    if !outcome.complete {
        warn!("Deadline reached, showing partial results");
    }
    println!("Matches on {} ({})", date, outcome.matches.len());
    let mut matches = outcome.matches;
    print_matches(&mut matches);
    Ok(())
}

async fn show_live(fetcher: SourceFetcher, refresh_secs: u64, config: &Config) -> Result<()> {
    let units = Arc::new(LeagueUnits::new(fetcher.clone(), config.fanout_timeout()));
    let mut loader = ProgressiveLoader::new(Arc::clone(&units));
    loader.start();

    while let Some(progress) = loader.next().await {
        let found = loader
            .session()
            .payload(progress.index)
            .map(|batch| batch.len())
            .unwrap_or(0);
        info!(
            "[{}/{}] league {}: {} live",
            progress.completed,
            progress.total,
            units.league_at(progress.index).unwrap_or_default(),
            found
        );
        if let Some(batch) = loader.session().payload(progress.index) {
            for m in batch {
                println!("{}", m.summary());
            }
        }
    }

    let total = merged_matches(loader.session()).len();
    println!("{} live match(es)", total);

    if refresh_secs == 0 {
        return Ok(());
    }
    info!("🔄 Refreshing live matches every {}s (Ctrl-C to stop)", refresh_secs);
    let (mut rx, handle) = start_live_refresh(
        fetcher,
        Duration::from_secs(refresh_secs),
        config.fanout_timeout(),
    );
    loop {
        tokio::select! {
            outcome = rx.recv() => {
                let Some(outcome) = outcome else { break };
                if !outcome.complete {
                    warn!("Deadline reached, showing partial live list");
                }
                println!("── {} live match(es)", outcome.matches.len());
                let mut matches = outcome.matches;
                print_matches(&mut matches);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping live refresh");
                break;
            }
        }
    }
    drop(rx);
    handle.await?;
    Ok(())
}

async fn show_results(fetcher: SourceFetcher, today: NaiveDate, days: usize, config: &Config) -> Result<()> {
    let units = Arc::new(DayUnits::new(fetcher, today, days, config.fanout_timeout()));
    let mut loader = ProgressiveLoader::new(units);
    loader.start();

    while let Some(progress) = loader.next().await {
        if let Some(day) = loader.session().payload(progress.index) {
            info!(
                "[{}/{}] {}: {} finished",
                progress.completed,
                progress.total,
                day.date.map(|d| d.to_string()).unwrap_or_default(),
                day.finished.len()
            );
        }
    }

    let (mut finished, mut upcoming) = merged_days(loader.session());
    println!("Results ({} day(s), {})", days, finished.len());
    print_matches(&mut finished);
    if !upcoming.is_empty() {
        println!("Upcoming today ({})", upcoming.len());
        print_matches(&mut upcoming);
    }
    Ok(())
}

async fn follow(
    source: Option<Arc<dyn MatchSource>>,
    limiter: Arc<RateLimiter>,
    notifier: Arc<dyn GoalNotifier>,
    match_id: i64,
    config: &Config,
) -> Result<()> {
    let poller = MatchPoller::new(
        source,
        limiter,
        notifier,
        match_id,
        config.poll_interval(),
        config.request_timeout(),
    );
    let (mut rx, handle) = start_match_poll(poller);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(PollMessage::Updates { updates, .. }) => {
                    for u in updates {
                        println!("{}", u.text);
                    }
                }
                Some(PollMessage::Goal(alert)) => {
                    println!("{} {}-{}", GOAL_TITLE, alert.home_score, alert.away_score);
                }
                Some(PollMessage::Stopped { reason, .. }) => {
                    println!("Stopped following match {}: {:?}", match_id, reason);
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping poll loop");
                break;
            }
        }
    }

    drop(rx);
    let outcome = handle.await?;
    info!(
        "Match {}: {} poll(s), final status {}",
        match_id,
        outcome.iterations,
        outcome
            .final_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );
    Ok(())
}
