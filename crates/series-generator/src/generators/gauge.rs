//! Bounded random walk values.

use super::{uniform, ValueGenerator};
use rand::Rng;

/// Fraction of the value range a single step may move.
const STEP_FRACTION: f64 = 0.1;

/// Gauge that starts anywhere in `[min, max]` and then moves by a signed
/// perturbation of at most a tenth of the range, clamped into `[min, max]`.
#[derive(Debug, Clone)]
pub struct GaugeValues {
    min: f64,
    max: f64,
    step: f64,
    current: Option<f64>,
}

impl GaugeValues {
    pub fn new(min: f64, max: f64) -> Self {
        let mut step = (max - min) * STEP_FRACTION;
        if !step.is_finite() {
            step = max * STEP_FRACTION - min * STEP_FRACTION;
        }
        Self {
            min,
            max,
            step,
            current: None,
        }
    }
}

impl ValueGenerator for GaugeValues {
    fn next_value<R: Rng>(&mut self, rng: &mut R) -> f64 {
        let next = match self.current {
            None => uniform(rng, self.min, self.max),
            Some(current) => {
                let delta = uniform(rng, -self.step, self.step);
                (current + delta).clamp(self.min, self.max)
            }
        };
        self.current = Some(next);
        next
    }
}
