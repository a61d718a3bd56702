//! Bounded, time-ordered sample cache shared by the sampler and every client.
//!
//! All operations take the same lock, so a drain never sees half of an
//! appended batch and two appends never interleave. Nothing waits for data:
//! every call reports the buffer as it is right now.
//!
//! Draining is destructive and first-come: when several clients call
//! `get_movements`, whichever drain runs first takes everything buffered and
//! the others get what arrived after it. Clients that each need the full
//! stream must not share one relay.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Default cache capacity in samples.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// One timestamped gaze coordinate.
///
/// Serialized as `[x, y, captured_at]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "(f64, f64, i64)", from = "(f64, f64, i64)")]
pub struct GazeSample {
    pub x: f64,
    pub y: f64,
    /// Wall-clock capture time in milliseconds since the Unix epoch.
    pub captured_at: i64,
}

impl GazeSample {
    pub fn new(x: f64, y: f64, captured_at: i64) -> Self {
        Self { x, y, captured_at }
    }

    pub fn location(&self) -> Location {
        Location {
            x: self.x,
            y: self.y,
        }
    }
}

impl From<GazeSample> for (f64, f64, i64) {
    fn from(s: GazeSample) -> Self {
        (s.x, s.y, s.captured_at)
    }
}

impl From<(f64, f64, i64)> for GazeSample {
    fn from((x, y, captured_at): (f64, f64, i64)) -> Self {
        Self { x, y, captured_at }
    }
}

/// Most recent gaze position, without a timestamp. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "(f64, f64)", from = "(f64, f64)")]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl From<Location> for (f64, f64) {
    fn from(l: Location) -> Self {
        (l.x, l.y)
    }
}

impl From<(f64, f64)> for Location {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    samples: VecDeque<GazeSample>,
    last_location: Option<Location>,
}

/// Point-in-time view of the cache for metrics and health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub buffered: usize,
    pub capacity: usize,
    pub evicted: u64,
}

pub struct GazeCache {
    state: Mutex<CacheState>,
    capacity: usize,
    evicted: AtomicU64,
}

impl GazeCache {
    /// Create an empty cache holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(CacheState {
                samples: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                last_location: None,
            }),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a batch in capture order, evicting the oldest samples past capacity.
    ///
    /// Updates the last location to the batch's final sample; an empty batch
    /// changes nothing. Returns how many samples were evicted.
    pub async fn append_batch(&self, batch: Vec<GazeSample>) -> usize {
        let Some(last) = batch.last().copied() else {
            return 0;
        };

        let mut state = self.state.lock().await;
        state.last_location = Some(last.location());

        let incoming = batch.len();
        let mut evicted = 0;

        if incoming >= self.capacity {
            evicted = state.samples.len() + (incoming - self.capacity);
            state.samples.clear();
            state
                .samples
                .extend(batch.into_iter().skip(incoming - self.capacity));
        } else {
            let overflow = (state.samples.len() + incoming).saturating_sub(self.capacity);
            if overflow > 0 {
                state.samples.drain(..overflow);
                evicted = overflow;
            }
            state.samples.extend(batch);
        }
        drop(state);

        if evicted > 0 {
            self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    /// Take every buffered sample in capture order, leaving the buffer empty.
    pub async fn drain(&self) -> Vec<GazeSample> {
        let mut state = self.state.lock().await;
        state.samples.drain(..).collect()
    }

    /// The most recently captured position, kept across drains.
    pub async fn peek_last(&self) -> Option<Location> {
        self.state.lock().await.last_location
    }

    /// Whether anything is waiting to be drained.
    pub async fn has_pending(&self) -> bool {
        !self.state.lock().await.samples.is_empty()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.samples.len()
    }

    /// Drop pending samples without returning them. The last location is kept.
    pub async fn clear_pending(&self) -> usize {
        let mut state = self.state.lock().await;
        let cleared = state.samples.len();
        state.samples.clear();
        cleared
    }

    pub async fn stats(&self) -> CacheStats {
        let buffered = self.len().await;
        CacheStats {
            buffered,
            capacity: self.capacity,
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for GazeCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
