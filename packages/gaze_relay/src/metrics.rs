//! Relay metrics for observability
//!
//! Lock-free counters bumped by the sampler and client handlers, exposed as a
//! JSON snapshot on `/metrics`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crate::cache::CacheStats;
use crate::ws::Command;

/// Relay-wide metrics
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connection metrics
    /// Currently open client connections
    pub active_connections: AtomicU64,
    /// Total connections since start
    pub total_connections: AtomicU64,

    // Command metrics
    pub get_movements: AtomicU64,
    pub get_current_location: AtomicU64,
    pub check_status: AtomicU64,
    /// Samples handed out through `get_movements`
    pub samples_delivered: AtomicU64,

    // Error metrics
    /// Undecodable or unknown client commands
    pub protocol_errors: AtomicU64,
    /// Connections that broke instead of closing
    pub transport_errors: AtomicU64,
    /// Failed source pulls (including pulls before a successful init)
    pub source_errors: AtomicU64,

    // Sampler metrics
    pub sampler_ticks: AtomicU64,
    pub samples_captured: AtomicU64,
    pub samples_evicted: AtomicU64,
    /// Points the sampler refused because a coordinate was not finite
    pub samples_rejected: AtomicU64,
    /// Points the source itself threw away, as last reported by the source
    pub source_discarded: AtomicU64,
    /// Times the idle policy dropped pending samples
    pub idle_clears: AtomicU64,

    /// Whether the most recent pull failed
    source_failing: AtomicBool,

    /// Start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    // Command tracking
    pub fn command(&self, command: Command) {
        let counter = match command {
            Command::GetMovements => &self.get_movements,
            Command::GetCurrentLocation => &self.get_current_location,
            Command::CheckStatus => &self.check_status,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples_delivered(&self, n: usize) {
        self.samples_delivered.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    // Sampler tracking
    pub fn tick(&self, captured: usize, evicted: usize) {
        self.sampler_ticks.fetch_add(1, Ordering::Relaxed);
        self.samples_captured.fetch_add(captured as u64, Ordering::Relaxed);
        self.samples_evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        self.source_failing.store(false, Ordering::Relaxed);
    }

    pub fn source_error(&self) {
        self.sampler_ticks.fetch_add(1, Ordering::Relaxed);
        self.source_errors.fetch_add(1, Ordering::Relaxed);
        self.source_failing.store(true, Ordering::Relaxed);
    }

    pub fn samples_rejected(&self, n: usize) {
        self.samples_rejected.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record the source's running discard total; returns the previous value.
    pub fn source_discarded(&self, total: u64) -> u64 {
        self.source_discarded.swap(total, Ordering::Relaxed)
    }

    pub fn idle_clear(&self) {
        self.idle_clears.fetch_add(1, Ordering::Relaxed);
    }

    pub fn source_failing(&self) -> bool {
        self.source_failing.load(Ordering::Relaxed)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self, cache: CacheStats) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
            },
            commands: CommandMetrics {
                get_movements: self.get_movements.load(Ordering::Relaxed),
                get_current_location: self.get_current_location.load(Ordering::Relaxed),
                check_status: self.check_status.load(Ordering::Relaxed),
                samples_delivered: self.samples_delivered.load(Ordering::Relaxed),
            },
            errors: ErrorMetrics {
                protocol: self.protocol_errors.load(Ordering::Relaxed),
                transport: self.transport_errors.load(Ordering::Relaxed),
                source: self.source_errors.load(Ordering::Relaxed),
            },
            sampler: SamplerMetrics {
                ticks: self.sampler_ticks.load(Ordering::Relaxed),
                samples_captured: self.samples_captured.load(Ordering::Relaxed),
                samples_evicted: self.samples_evicted.load(Ordering::Relaxed),
                samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
                source_discarded: self.source_discarded.load(Ordering::Relaxed),
                idle_clears: self.idle_clears.load(Ordering::Relaxed),
                source_failing: self.source_failing(),
            },
            cache,
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub commands: CommandMetrics,
    pub errors: ErrorMetrics,
    pub sampler: SamplerMetrics,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMetrics {
    pub get_movements: u64,
    pub get_current_location: u64,
    pub check_status: u64,
    pub samples_delivered: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub protocol: u64,
    pub transport: u64,
    pub source: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerMetrics {
    pub ticks: u64,
    pub samples_captured: u64,
    pub samples_evicted: u64,
    pub samples_rejected: u64,
    pub source_discarded: u64,
    pub idle_clears: u64,
    pub source_failing: bool,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub buffered: usize,
    pub uptime_secs: u64,
}
