//! Periodic sampling loop feeding the cache.
//!
//! Every `interval` the sampler pulls whatever the source captured since the
//! last tick, stamps it with the wall-clock time and appends it to the cache
//! as one batch. A failed pull costs one tick and nothing else. Points with
//! a non-finite coordinate never reach the cache.

use chrono::Utc;
use gaze_source::{RawPoint, SampleSource, SourceError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{GazeCache, GazeSample};
use crate::metrics::RelayMetrics;

/// Default sampling period.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Captured { samples: usize, evicted: usize },
    Empty,
    Failed,
}

pub struct Sampler {
    /// `None` only if the source was lost to a panic during `init`.
    source: Option<Box<dyn SampleSource>>,
    source_name: String,
    cache: Arc<GazeCache>,
    metrics: Arc<RelayMetrics>,
    interval: Duration,
    failure_streak: u64,
}

impl Sampler {
    pub fn new(
        source: Box<dyn SampleSource>,
        cache: Arc<GazeCache>,
        metrics: Arc<RelayMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            source_name: source.name().to_string(),
            source: Some(source),
            cache,
            metrics,
            interval,
            failure_streak: 0,
        }
    }

    /// Run the loop on its own task until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            source = %self.source_name,
            interval_ms = self.interval.as_millis() as u64,
            "sampler started"
        );

        let source_name = self.source_name.clone();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(source = %source_name, "sampler cancelled during source init");
                return;
            }
            _ = self.init() => {}
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }

        info!(source = %self.source_name, "sampler stopped");
    }

    /// Initialize the source off the async executor; `init` may block.
    ///
    /// Failure is logged and sampling carries on: the source then simply
    /// produces errors or nothing until it recovers.
    pub async fn init(&mut self) {
        let Some(mut source) = self.source.take() else {
            return;
        };
        let joined = tokio::task::spawn_blocking(move || {
            let result = source.init();
            (source, result)
        })
        .await;

        match joined {
            Ok((source, result)) => {
                self.source = Some(source);
                match result {
                    Ok(()) => info!(source = %self.source_name, "sample source initialized"),
                    Err(e) => warn!(
                        source = %self.source_name,
                        "sample source init failed, continuing without samples: {}", e
                    ),
                }
            }
            Err(e) => error!(source = %self.source_name, "sample source init panicked: {}", e),
        }
    }

    /// Pull once and append the stamped batch.
    pub async fn tick(&mut self) -> TickOutcome {
        let pulled = match self.source.as_mut() {
            Some(source) => source.pull(),
            None => Err(SourceError::NotInitialized),
        };
        self.record_discarded();

        let mut points = match pulled {
            Ok(points) => points,
            Err(e) => {
                self.failure_streak += 1;
                self.metrics.source_error();
                if self.failure_streak == 1 {
                    warn!(source = %self.source_name, "sample pull failed: {}", e);
                } else {
                    debug!(
                        source = %self.source_name,
                        streak = self.failure_streak,
                        "sample pull failed: {}", e
                    );
                }
                return TickOutcome::Failed;
            }
        };

        if self.failure_streak > 0 {
            info!(
                source = %self.source_name,
                failed_pulls = self.failure_streak,
                "sample source recovered"
            );
            self.failure_streak = 0;
        }

        let pulled_len = points.len();
        points.retain(RawPoint::is_finite);
        let rejected = pulled_len - points.len();
        if rejected > 0 {
            self.metrics.samples_rejected(rejected);
            debug!(source = %self.source_name, rejected, "dropped non-finite gaze points");
        }

        if points.is_empty() {
            self.metrics.tick(0, 0);
            return TickOutcome::Empty;
        }

        let captured_at = Utc::now().timestamp_millis();
        let batch: Vec<GazeSample> = points
            .into_iter()
            .map(|p| GazeSample::new(p.x, p.y, captured_at))
            .collect();
        let samples = batch.len();

        let evicted = self.cache.append_batch(batch).await;
        self.metrics.tick(samples, evicted);
        if evicted > 0 {
            debug!(evicted, "cache full, evicted oldest samples");
        }

        TickOutcome::Captured { samples, evicted }
    }

    /// Mirror the source's own discard count into the metrics.
    fn record_discarded(&self) {
        let Some(source) = self.source.as_ref() else {
            return;
        };
        let total = source.discarded();
        let previous = self.metrics.source_discarded(total);
        if total > previous {
            debug!(
                source = %self.source_name,
                discarded = total - previous,
                total,
                "source discarded points"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Location;
    use gaze_source::{RawPoint, ScriptStep, ScriptedSource};

    fn sampler_with(
        source: ScriptedSource,
        capacity: usize,
    ) -> (Sampler, Arc<GazeCache>, Arc<RelayMetrics>) {
        let cache = Arc::new(GazeCache::new(capacity));
        let metrics = Arc::new(RelayMetrics::new());
        let sampler = Sampler::new(
            Box::new(source),
            cache.clone(),
            metrics.clone(),
            Duration::from_millis(10),
        );
        (sampler, cache, metrics)
    }

    #[tokio::test]
    async fn stamps_and_appends_batches() {
        let source = ScriptedSource::from_batches([vec![(0.1, 0.2), (0.3, 0.4)], vec![(0.5, 0.6)]]);
        let (mut sampler, cache, _) = sampler_with(source, 100);
        sampler.init().await;

        let before = Utc::now().timestamp_millis();
        assert_eq!(
            sampler.tick().await,
            TickOutcome::Captured {
                samples: 2,
                evicted: 0
            }
        );
        sampler.tick().await;
        let after = Utc::now().timestamp_millis();

        let drained = cache.drain().await;
        let coords: Vec<_> = drained.iter().map(|s| (s.x, s.y)).collect();
        assert_eq!(coords, vec![(0.1, 0.2), (0.3, 0.4), (0.5, 0.6)]);
        assert!(drained.iter().all(|s| s.captured_at >= before && s.captured_at <= after));
        // One stamp per batch.
        assert_eq!(drained[0].captured_at, drained[1].captured_at);
        assert_eq!(cache.peek_last().await, Some(Location { x: 0.5, y: 0.6 }));
    }

    #[tokio::test]
    async fn empty_pull_keeps_last_location() {
        let source = ScriptedSource::from_batches([vec![(0.7, 0.7)], vec![]]);
        let (mut sampler, cache, _) = sampler_with(source, 100);

        sampler.tick().await;
        assert_eq!(sampler.tick().await, TickOutcome::Empty);
        assert_eq!(cache.peek_last().await, Some(Location { x: 0.7, y: 0.7 }));
    }

    #[tokio::test]
    async fn failed_pull_is_not_fatal() {
        let source = ScriptedSource::new([
            ScriptStep::Fail("pipe broken".to_string()),
            ScriptStep::Fail("pipe broken".to_string()),
            ScriptStep::Batch(vec![RawPoint::new(0.2, 0.2)]),
        ]);
        let (mut sampler, cache, metrics) = sampler_with(source, 100);

        assert_eq!(sampler.tick().await, TickOutcome::Failed);
        assert!(!cache.has_pending().await);
        assert_eq!(sampler.tick().await, TickOutcome::Failed);
        assert!(metrics.source_failing());

        assert!(matches!(sampler.tick().await, TickOutcome::Captured { samples: 1, .. }));
        assert!(!metrics.source_failing());
        assert_eq!(sampler.failure_streak, 0);
        assert_eq!(metrics.snapshot(cache.stats().await).errors.source, 2);
    }

    #[tokio::test]
    async fn non_finite_points_are_dropped() {
        let source = ScriptedSource::from_batches([
            vec![(0.1, 0.1), (f64::NAN, 0.2), (0.3, f64::INFINITY), (0.4, 0.4)],
            vec![(f64::NEG_INFINITY, 0.5)],
        ]);
        let (mut sampler, cache, metrics) = sampler_with(source, 100);

        assert_eq!(
            sampler.tick().await,
            TickOutcome::Captured {
                samples: 2,
                evicted: 0
            }
        );
        // A batch with nothing usable behaves like an empty pull.
        assert_eq!(sampler.tick().await, TickOutcome::Empty);

        let coords: Vec<_> = cache.drain().await.iter().map(|s| (s.x, s.y)).collect();
        assert_eq!(coords, vec![(0.1, 0.1), (0.4, 0.4)]);
        assert_eq!(cache.peek_last().await, Some(Location { x: 0.4, y: 0.4 }));

        let snapshot = metrics.snapshot(cache.stats().await);
        assert_eq!(snapshot.sampler.samples_rejected, 3);
        assert_eq!(snapshot.sampler.samples_captured, 2);
    }

    /// Reports a growing discard total and never yields points.
    struct LossySource {
        discarded: u64,
    }

    impl SampleSource for LossySource {
        fn name(&self) -> &str {
            "lossy"
        }

        fn init(&mut self) -> Result<(), SourceError> {
            Ok(())
        }

        fn pull(&mut self) -> Result<Vec<RawPoint>, SourceError> {
            self.discarded += 4;
            Ok(Vec::new())
        }

        fn discarded(&self) -> u64 {
            self.discarded
        }
    }

    #[tokio::test]
    async fn source_discards_reach_metrics() {
        let cache = Arc::new(GazeCache::new(10));
        let metrics = Arc::new(RelayMetrics::new());
        let mut sampler = Sampler::new(
            Box::new(LossySource { discarded: 0 }),
            cache.clone(),
            metrics.clone(),
            Duration::from_millis(10),
        );

        sampler.tick().await;
        sampler.tick().await;
        assert_eq!(metrics.snapshot(cache.stats().await).sampler.source_discarded, 8);
    }

    #[tokio::test]
    async fn init_failure_still_samples() {
        let source = ScriptedSource::from_batches([vec![(0.4, 0.4)]]).failing_init("no tracker");
        let (mut sampler, cache, _) = sampler_with(source, 100);

        sampler.init().await;
        sampler.tick().await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn reports_evictions() {
        let source = ScriptedSource::from_batches([vec![(0.1, 0.1), (0.2, 0.2), (0.3, 0.3)]]);
        let (mut sampler, cache, metrics) = sampler_with(source, 2);

        assert_eq!(
            sampler.tick().await,
            TickOutcome::Captured {
                samples: 3,
                evicted: 1
            }
        );
        let snapshot = metrics.snapshot(cache.stats().await);
        assert_eq!(snapshot.sampler.samples_evicted, 1);
        assert_eq!(snapshot.cache.evicted, 1);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let source = ScriptedSource::from_batches([vec![(0.1, 0.1)], vec![(0.2, 0.2)]]);
        let (sampler, cache, metrics) = sampler_with(source, 100);
        let cancel = CancellationToken::new();

        let handle = sampler.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sampler did not stop")
            .unwrap();

        assert_eq!(cache.len().await, 2);
        let ticks = metrics.snapshot(cache.stats().await).sampler.ticks;
        assert!(ticks >= 2);

        // Nothing runs after cancellation.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(metrics.snapshot(cache.stats().await).sampler.ticks, ticks);
    }

    #[tokio::test]
    async fn run_exits_immediately_when_already_cancelled() {
        let (sampler, _, metrics) = sampler_with(ScriptedSource::default(), 10);
        let cancel = CancellationToken::new();
        cancel.cancel();
        sampler.run(cancel).await;
        assert_eq!(metrics.sampler_ticks.load(std::sync::atomic::Ordering::Relaxed), 0);
    }
}
