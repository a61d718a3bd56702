//! Drops stale samples once nobody has been listening for a while.
//!
//! Off unless `idle_clear_secs` is set. At most one clear per idle streak: a
//! streak starts when the last client leaves and ends when one connects.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::GazeCache;
use crate::metrics::RelayMetrics;
use crate::registry::SessionRegistry;

/// How often the policy looks at the registry.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub struct IdlePolicy {
    after: Duration,
    cache: Arc<GazeCache>,
    registry: Arc<SessionRegistry>,
    metrics: Arc<RelayMetrics>,
    /// Start of the streak already cleared, if any.
    cleared_streak: Option<Instant>,
}

/// True when the streak that began at `empty_since` is old enough and has not
/// been cleared yet.
pub fn should_clear(
    empty_since: Option<Instant>,
    now: Instant,
    after: Duration,
    cleared_streak: Option<Instant>,
) -> bool {
    match empty_since {
        None => false,
        Some(since) => {
            cleared_streak != Some(since) && now.saturating_duration_since(since) >= after
        }
    }
}

impl IdlePolicy {
    pub fn new(
        after: Duration,
        cache: Arc<GazeCache>,
        registry: Arc<SessionRegistry>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            after,
            cache,
            registry,
            metrics,
            cleared_streak: None,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(after_secs = self.after.as_secs(), "idle clearing enabled");

        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.check_once(Instant::now()).await;
        }

        debug!("idle policy stopped");
    }

    /// Apply the policy once. Returns how many samples were dropped.
    pub async fn check_once(&mut self, now: Instant) -> usize {
        let empty_since = self.registry.empty_since().await;
        if !should_clear(empty_since, now, self.after, self.cleared_streak) {
            return 0;
        }
        if !self.cache.has_pending().await {
            return 0;
        }

        let cleared = self.cache.clear_pending().await;
        self.cleared_streak = empty_since;
        self.metrics.idle_clear();
        info!(
            cleared,
            idle_secs = empty_since
                .map(|since| now.saturating_duration_since(since).as_secs())
                .unwrap_or(0),
            "no clients connected, dropped pending samples"
        );
        cleared
    }
}
