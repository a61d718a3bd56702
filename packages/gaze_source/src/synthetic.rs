use std::f64::consts::TAU;

use crate::{RawPoint, SampleSource, SourceError};

/// Deterministic fake tracker tracing a Lissajous figure across the screen.
///
/// Each pull yields `points_per_pull` points continuing the same curve, so a
/// client drawing them sees a smooth path. Useful without hardware attached.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    points_per_pull: usize,
    step: u64,
}

/// Points per full cycle of the slower axis.
const PERIOD: f64 = 600.0;

impl SyntheticSource {
    pub fn new(points_per_pull: usize) -> Self {
        Self {
            points_per_pull,
            step: 0,
        }
    }

    fn point_at(step: u64) -> RawPoint {
        let t = step as f64 / PERIOD * TAU;
        RawPoint::new(0.5 + 0.4 * (3.0 * t).sin(), 0.5 + 0.4 * (2.0 * t).cos())
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(3)
    }
}

impl SampleSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn init(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn pull(&mut self) -> Result<Vec<RawPoint>, SourceError> {
        let start = self.step;
        self.step += self.points_per_pull as u64;
        Ok((start..self.step).map(Self::point_at).collect())
    }
}
