//! Monotonic counter values.

use super::{uniform, ValueGenerator};
use rand::Rng;

/// Counter that only ever increases.
///
/// Each value adds an increment drawn uniformly from `[max(min, 0), max(max, 0)]`
/// to the running total, which starts at zero. Negative bounds are clamped so
/// the counter never decreases. Resets are not modeled: once the total would
/// stop being finite it holds its last value.
#[derive(Debug, Clone)]
pub struct CounterValues {
    min_increment: f64,
    max_increment: f64,
    total: f64,
}

impl CounterValues {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min_increment: min.max(0.0),
            max_increment: max.max(0.0),
            total: 0.0,
        }
    }
}

impl ValueGenerator for CounterValues {
    fn next_value<R: Rng>(&mut self, rng: &mut R) -> f64 {
        let next = self.total + uniform(rng, self.min_increment, self.max_increment);
        if next.is_finite() {
            self.total = next;
        }
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_counter_never_decreases() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut values = CounterValues::new(100.0, 400.0);

        let mut last = 0.0;
        for _ in 0..5760 {
            let v = values.next_value(&mut rng);
            assert!(v >= last);
            last = v;
        }
        assert!(last >= 100.0 * 5760.0);
    }

    #[test]
    fn test_negative_bounds_clamped() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut values = CounterValues::new(-10.0, -1.0);

        for _ in 0..100 {
            assert_eq!(values.next_value(&mut rng), 0.0);
        }

        let mut values = CounterValues::new(-10.0, 10.0);
        let mut last = 0.0;
        for _ in 0..100 {
            let v = values.next_value(&mut rng);
            assert!(v >= last);
            last = v;
        }
    }

    #[test]
    fn test_total_saturates_instead_of_overflowing() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut values = CounterValues::new(1e307, 1e307);

        let mut last = 0.0;
        for _ in 0..40 {
            let v = values.next_value(&mut rng);
            assert!(v.is_finite());
            assert!(v >= last);
            last = v;
        }
        assert!(last > 1e308);
    }
}
