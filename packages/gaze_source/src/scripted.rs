use std::collections::VecDeque;

use crate::{RawPoint, SampleSource, SourceError};

/// One scripted response to `pull`.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Batch(Vec<RawPoint>),
    Fail(String),
}

/// Replays a fixed script of pull results, then returns empty batches.
///
/// Stands in for the sensor in tests so that sampler and server behavior
/// is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    steps: VecDeque<ScriptStep>,
    init_error: Option<String>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            ..Default::default()
        }
    }

    /// A script made only of successful batches of `(x, y)` pairs.
    pub fn from_batches<I, B>(batches: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: IntoIterator<Item = (f64, f64)>,
    {
        Self::new(
            batches
                .into_iter()
                .map(|b| ScriptStep::Batch(b.into_iter().map(RawPoint::from).collect())),
        )
    }

    /// Make `init` fail with `message`.
    pub fn failing_init(mut self, message: impl Into<String>) -> Self {
        self.init_error = Some(message.into());
        self
    }
}

impl SampleSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn init(&mut self) -> Result<(), SourceError> {
        if let Some(message) = &self.init_error {
            return Err(SourceError::Init(message.clone()));
        }
        Ok(())
    }

    fn pull(&mut self) -> Result<Vec<RawPoint>, SourceError> {
        match self.steps.pop_front() {
            Some(ScriptStep::Batch(points)) => Ok(points),
            Some(ScriptStep::Fail(message)) => Err(SourceError::Read(message)),
            None => Ok(Vec::new()),
        }
    }
}
