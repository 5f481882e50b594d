//! Independent uniform values.

use super::{uniform, ValueGenerator};
use rand::Rng;

/// Every value is drawn independently and uniformly from `[min, max]`.
#[derive(Debug, Clone)]
pub struct RandomValues {
    min: f64,
    max: f64,
}

impl RandomValues {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl ValueGenerator for RandomValues {
    fn next_value<R: Rng>(&mut self, rng: &mut R) -> f64 {
        uniform(rng, self.min, self.max)
    }
}
