use crate::SourceError;

/// One untimestamped gaze coordinate, normalized to the screen.
///
/// Values are passed through as the sensor reports them; clamping to
/// `[0, 1]` is left to whoever draws them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
}

impl RawPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for RawPoint {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Supplier of raw gaze points.
///
/// `init` runs once and may block (opening a FIFO waits for its writer), so
/// callers on an async runtime should run it on a blocking thread. `pull`
/// must never block: it returns whatever arrived since the previous call,
/// which may be nothing.
pub trait SampleSource: Send {
    /// Short label for logs.
    fn name(&self) -> &str;

    fn init(&mut self) -> Result<(), SourceError>;

    fn pull(&mut self) -> Result<Vec<RawPoint>, SourceError>;

    /// Points thrown away before they could be pulled (queue overflow or
    /// unusable records), counted since `init`.
    fn discarded(&self) -> u64 {
        0
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn init(&mut self) -> Result<(), SourceError> {
        (**self).init()
    }

    fn pull(&mut self) -> Result<Vec<RawPoint>, SourceError> {
        (**self).pull()
    }

    fn discarded(&self) -> u64 {
        (**self).discarded()
    }
}
