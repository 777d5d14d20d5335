//! Minimum spacing between outbound requests, shared by every caller.
//!
//! The dispatch-time check and update happen under one lock, so concurrent
//! callers are serialised here while the requests they issue afterwards can
//! still overlap.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

pub struct RateLimiter {
    last_dispatch: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        RateLimiter {
            last_dispatch: Mutex::new(None),
            min_interval,
        }
    }

    /// Build from a signed millisecond value; negative means no throttling.
    pub fn from_millis(min_interval_ms: i64) -> Self {
        Self::new(Duration::from_millis(min_interval_ms.max(0) as u64))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until `min_interval` has passed since the previous dispatch, then
    /// record now as the new dispatch time.
    pub async fn wait(&self) {
        let mut last = self.last_dispatch.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let pause = self.min_interval - elapsed;
                trace!("Rate limiter: sleeping {:?}", pause);
                tokio::time::sleep(pause).await;
            }
        }
        *last = Some(Instant::now());
    }
}
