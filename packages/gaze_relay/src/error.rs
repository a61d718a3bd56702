use std::net::SocketAddr;
use thiserror::Error;

/// Errors that stop the relay from starting.
///
/// Nothing that happens after a successful bind is fatal: source failures,
/// bad client messages and dropped connections are all handled locally.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sampling interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),

    #[error("cache capacity must be at least 1")]
    ZeroCapacity,

    #[error("invalid listen address {0:?}")]
    InvalidAddress(String),

    #[error("source kind {0} requires source.path to be set")]
    MissingSourcePath(&'static str),

    #[error("failed to load configuration: {0}")]
    Load(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(err.to_string())
    }
}
