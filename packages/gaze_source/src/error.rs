use thiserror::Error;

/// Errors reported by a [`SampleSource`](crate::SampleSource).
///
/// None of these are fatal to the relay: a failed `init` means "no samples
/// available" and a failed `pull` means "nothing this tick".
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source initialization failed: {0}")]
    Init(String),

    #[error("source was never initialized")]
    NotInitialized,

    #[error("source stream closed")]
    Closed,

    #[error("failed to read samples: {0}")]
    Read(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
