use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::models::GoalAlert;

pub const GOAL_TITLE: &str = "⚽ GOLAZO!";

/// Receiver of goal notifications.
pub trait GoalNotifier: Send + Sync {
    fn goal(&self, alert: &GoalAlert) -> Result<()>;
}

/// Notifier that writes goal alerts to the log.
pub struct LogNotifier {
    enabled: AtomicBool,
}

impl LogNotifier {
    pub fn new(enabled: bool) -> Self {
        LogNotifier {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

impl GoalNotifier for LogNotifier {
    fn goal(&self, alert: &GoalAlert) -> Result<()> {
        if !self.enabled() {
            return Ok(());
        }
        info!("{} {}", GOAL_TITLE, format_goal_message(alert).replace('\n', " | "));
        Ok(())
    }
}

/// Shows `(title, body)` on the desktop.
pub type DesktopSender = Box<dyn Fn(&str, &str) -> Result<()> + Send + Sync>;

fn show_desktop(title: &str, body: &str) -> Result<()> {
    notify_rust::Notification::new()
        .summary(title)
        .body(body)
        .appname("matchday-feed")
        .show()
        .map(|_| ())
        .context("Failed to show desktop notification")
}

/// Native desktop notifications. A goal that cannot be shown (no
/// notification daemon, headless session) is written to the log instead.
pub struct DesktopNotifier {
    send: DesktopSender,
    fallback: LogNotifier,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self::with_sender(Box::new(show_desktop))
    }

    pub fn with_sender(send: DesktopSender) -> Self {
        DesktopNotifier {
            send,
            fallback: LogNotifier::new(true),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl GoalNotifier for DesktopNotifier {
    fn goal(&self, alert: &GoalAlert) -> Result<()> {
        if let Err(e) = (self.send)(GOAL_TITLE, &format_goal_message(alert)) {
            warn!("{:#}, logging the goal instead", e);
            return self.fallback.goal(alert);
        }
        Ok(())
    }
}

/// "Scorer (Assist) 34' [Team]" followed by "Home 2 - 1 Away" on a second line.
pub fn format_goal_message(alert: &GoalAlert) -> String {
    let scorer = alert
        .scorer
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown");
    let assist = match alert.assist.as_deref() {
        Some(a) if !a.is_empty() => format!(" ({})", a),
        _ => String::new(),
    };
    format!(
        "{}{} {}' [{}]\n{} {} - {} {}",
        scorer,
        assist,
        alert.minute,
        alert.team.label(),
        alert.home_team.label(),
        alert.home_score,
        alert.away_score,
        alert.away_team.label()
    )
}
