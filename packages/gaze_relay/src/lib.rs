//! Gaze relay.
//!
//! Samples a gaze source on a fixed interval into a bounded in-memory cache
//! and answers WebSocket clients that pull from it:
//!
//! - `get_movements` drains everything buffered since the last drain
//! - `get_current_location` peeks at the most recent position
//! - `check_status` reports whether samples are waiting
//!
//! # Example
//!
//! ```no_run
//! use gaze_relay::{RelayConfig, RelayServer};
//! use gaze_source::SyntheticSource;
//!
//! # async fn run() -> Result<(), gaze_relay::RelayError> {
//! let server = RelayServer::bind(RelayConfig::default(), Box::new(SyntheticSource::default())).await?;
//! let cancel = server.cancel_token();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     cancel.cancel();
//! });
//! server.run().await
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
mod error;
mod handlers;
pub mod idle;
pub mod metrics;
pub mod registry;
pub mod sampler;
pub mod server;
pub mod ws;

pub use cache::{CacheStats, GazeCache, GazeSample, Location};
pub use config::{CliOverrides, FileConfig, RelayConfig, SourceKind, load_config};
pub use error::{ConfigError, RelayError};
pub use metrics::RelayMetrics;
pub use registry::{ClientId, SessionRegistry};
pub use sampler::Sampler;
pub use server::{RelayServer, RelayState};
pub use ws::{Command, Response};
