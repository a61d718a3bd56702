use gaze_source::{SampleSource, ScriptedSource, StreamSource, SyntheticSource};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::error::ConfigError;

// =============================================================================
// File config (figment-deserialized from defaults / gaze-relay.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   gaze-relay.toml:  [sampler]
//                     cache_capacity = 500
//
//   env var:          GAZE_SAMPLER__CACHE_CAPACITY=500   (double underscore = nesting)
//
//   CLI flag:         gaze-relay serve --cache-size 500

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "gaze-relay.toml";

/// Where gaze samples come from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Generated curve, for demos and tests without a tracker
    Synthetic,
    /// 8-byte (x, y) records read from a file or named pipe
    Stream,
    /// 8-byte (x, y) records read from standard input
    Stdin,
    /// No source; the relay serves an empty buffer
    #[serde(rename = "none")]
    #[value(name = "none")]
    Disabled,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Synthetic => "synthetic",
            SourceKind::Stream => "stream",
            SourceKind::Stdin => "stdin",
            SourceKind::Disabled => "none",
        }
    }
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub sampler: SamplerFileConfig,
    #[serde(default)]
    pub source: SourceFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Sampling and buffering knobs (lives under `[sampler]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SamplerFileConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Drop pending samples after this many seconds without clients (0 = never)
    #[serde(default)]
    pub idle_clear_secs: u64,
}

impl Default for SamplerFileConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            cache_capacity: default_cache_capacity(),
            idle_clear_secs: 0,
        }
    }
}

/// Sample source selection (lives under `[source]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceFileConfig {
    #[serde(default = "default_source_kind")]
    pub kind: SourceKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_points_per_pull")]
    pub points_per_pull: usize,
}

impl Default for SourceFileConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            path: None,
            points_per_pull: default_points_per_pull(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8765
}
fn default_interval_secs() -> f64 {
    0.1
}
fn default_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_source_kind() -> SourceKind {
    SourceKind::Synthetic
}
fn default_points_per_pull() -> usize {
    3
}

/// Build a figment that layers: defaults → config file → GAZE_* env vars.
///
/// `path` is the `--config` argument; without it `gaze-relay.toml` in the
/// working directory is used if present. Missing files contribute nothing.
///
/// Env vars use double-underscore for nesting into sections:
///   `GAZE_SERVER__PORT=9000`  →  `server.port = 9000`
///   `GAZE_SAMPLER__INTERVAL_SECS=0.05`  →  `sampler.interval_secs = 0.05`
pub fn load_config(path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed("GAZE_").split("__"))
}

/// Values given on the command line. They win over every other layer.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub interval_secs: Option<f64>,
    pub cache_capacity: Option<usize>,
    pub idle_clear_secs: Option<u64>,
    pub source: Option<SourceKind>,
    pub source_path: Option<PathBuf>,
}

impl CliOverrides {
    pub fn apply(self, fc: &mut FileConfig) {
        if let Some(host) = self.host {
            fc.server.host = host;
        }
        if let Some(port) = self.port {
            fc.server.port = port;
        }
        if let Some(interval) = self.interval_secs {
            fc.sampler.interval_secs = interval;
        }
        if let Some(capacity) = self.cache_capacity {
            fc.sampler.cache_capacity = capacity;
        }
        if let Some(secs) = self.idle_clear_secs {
            fc.sampler.idle_clear_secs = secs;
        }
        if let Some(kind) = self.source {
            fc.source.kind = kind;
        }
        if let Some(path) = self.source_path {
            fc.source.path = Some(path);
        }
    }
}

// =============================================================================
// Runtime config (validated view of FileConfig)
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    /// Sampling period
    pub interval: Duration,
    /// Maximum buffered samples
    pub cache_capacity: usize,
    /// Clear pending samples after this long without clients (None = disabled)
    pub idle_clear_after: Option<Duration>,
    pub source: SourceConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub path: Option<PathBuf>,
    pub points_per_pull: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), default_port()),
            interval: Duration::from_millis(100),
            cache_capacity: DEFAULT_CAPACITY,
            idle_clear_after: None,
            source: SourceConfig {
                kind: default_source_kind(),
                path: None,
                points_per_pull: default_points_per_pull(),
            },
        }
    }
}

impl RelayConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self, ConfigError> {
        let interval_secs = fc.sampler.interval_secs;
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(ConfigError::InvalidInterval(interval_secs));
        }
        let interval = Duration::try_from_secs_f64(interval_secs)
            .map_err(|_| ConfigError::InvalidInterval(interval_secs))?;
        if interval.is_zero() {
            return Err(ConfigError::InvalidInterval(interval_secs));
        }

        if fc.sampler.cache_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        let listen_addr = parse_listen_addr(&fc.server.host, fc.server.port)?;

        let source = &fc.source;
        if source.kind == SourceKind::Stream && source.path.is_none() {
            return Err(ConfigError::MissingSourcePath(SourceKind::Stream.as_str()));
        }

        Ok(Self {
            listen_addr,
            interval,
            cache_capacity: fc.sampler.cache_capacity,
            idle_clear_after: if fc.sampler.idle_clear_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(fc.sampler.idle_clear_secs))
            },
            source: SourceConfig {
                kind: source.kind,
                path: source.path.clone(),
                points_per_pull: source.points_per_pull.max(1),
            },
        })
    }

    /// Reject values the sampler and cache cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidInterval(self.interval.as_secs_f64()));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

fn parse_listen_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let ip = if host.eq_ignore_ascii_case("localhost") {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        host.trim_matches(|c| c == '[' || c == ']')
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidAddress(format!("{}:{}", host, port)))?
    };
    Ok(SocketAddr::new(ip, port))
}

impl SourceConfig {
    /// Construct the configured source. Nothing is opened until `init`.
    pub fn build(&self) -> Result<Box<dyn SampleSource>, ConfigError> {
        Ok(match self.kind {
            SourceKind::Synthetic => Box::new(SyntheticSource::new(self.points_per_pull)),
            SourceKind::Stream => {
                let path = self
                    .path
                    .as_ref()
                    .ok_or(ConfigError::MissingSourcePath(SourceKind::Stream.as_str()))?;
                Box::new(StreamSource::from_path(path.clone()))
            }
            SourceKind::Stdin => Box::new(StreamSource::from_reader("stdin", std::io::stdin())),
            SourceKind::Disabled => Box::new(ScriptedSource::default()),
        })
    }
}
