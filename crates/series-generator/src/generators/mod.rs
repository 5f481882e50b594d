//! Sample generators for the different value shapes.
//!
//! A [`SampleIterator`] owns the tick schedule (scrape interval, jitter,
//! change windows) and delegates value production to a [`ValueGenerator`].
//! Per tick, the jitter is drawn first and the value second, so the random
//! stream consumed for a given seed never depends on anything but the
//! characteristics.

pub mod counter;
pub mod gauge;
pub mod random;

use blockgen_core::{Characteristics, GenType, SpecError};
use rand::rngs::StdRng;
use rand::Rng;

pub use counter::CounterValues;
pub use gauge::GaugeValues;
pub use random::RandomValues;

/// One sample: millisecond timestamp and value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Trait for producing successive values of one series.
pub trait ValueGenerator: Send {
    /// Produce the value for the next change window.
    fn next_value<R: Rng>(&mut self, rng: &mut R) -> f64;
}

/// Draw uniformly from `[min, max]`, without consuming randomness when the range is empty.
///
/// Spans too wide for an `f64` are interpolated instead of sampled directly.
pub(crate) fn uniform<R: Rng>(rng: &mut R, min: f64, max: f64) -> f64 {
    if min >= max {
        min
    } else if (max - min).is_finite() {
        rng.gen_range(min..=max)
    } else {
        let t: f64 = rng.gen();
        (min * (1.0 - t) + max * t).clamp(min, max)
    }
}

/// Lazy, finite, strictly increasing sequence of samples in `[min_time, max_time)`.
///
/// Not restartable: build a new iterator from the same seed to replay it.
pub struct SampleIterator<V> {
    rng: StdRng,
    values: V,
    min_time: i64,
    max_time: i64,
    interval: i64,
    jitter: i64,
    change_interval: Option<i64>,
    tick: i64,
    window: Option<i64>,
    value: f64,
}

impl<V: ValueGenerator> SampleIterator<V> {
    /// Create an iterator after validating the characteristics.
    pub fn new(
        rng: StdRng,
        values: V,
        min_time: i64,
        max_time: i64,
        characteristics: &Characteristics,
    ) -> Result<Self, SpecError> {
        if min_time > max_time {
            return Err(SpecError::InvalidTimeRange { min_time, max_time });
        }
        characteristics.validate()?;
        Ok(Self {
            rng,
            values,
            min_time,
            max_time,
            interval: characteristics.scrape_interval_ms(),
            jitter: characteristics.jitter_ms(),
            change_interval: characteristics.change_interval_ms(),
            tick: 0,
            window: None,
            value: 0.0,
        })
    }

    /// Base timestamp of the current tick, or `None` once past the range.
    fn base_timestamp(&self) -> Option<i64> {
        self.tick
            .checked_mul(self.interval)
            .and_then(|offset| self.min_time.checked_add(offset))
            .filter(|base| *base < self.max_time)
    }
}

impl<V: ValueGenerator> Iterator for SampleIterator<V> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        let base = self.base_timestamp()?;
        self.tick += 1;

        let mut timestamp = base;
        if self.jitter > 0 {
            timestamp = timestamp.saturating_add(self.rng.gen_range(0..=self.jitter));
        }
        // Only the last tick can overshoot, since jitter < interval.
        if timestamp >= self.max_time {
            timestamp = self.max_time - 1;
        }

        let window = match self.change_interval {
            Some(change) => (base - self.min_time) / change,
            None => self.tick,
        };
        if self.window != Some(window) {
            self.window = Some(window);
            self.value = self.values.next_value(&mut self.rng);
        }

        Some(Sample::new(timestamp, self.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.base_timestamp() {
            Some(base) => {
                let span = i128::from(self.max_time) - i128::from(base);
                let interval = i128::from(self.interval);
                (span + interval - 1) / interval
            }
            None => 0,
        };
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// Create the sample iterator for a generator type.
pub fn create_samples(
    kind: GenType,
    rng: StdRng,
    min_time: i64,
    max_time: i64,
    characteristics: &Characteristics,
) -> Result<Box<dyn Iterator<Item = Sample> + Send>, SpecError> {
    let (min, max) = (characteristics.min, characteristics.max);
    let iter: Box<dyn Iterator<Item = Sample> + Send> = match kind {
        GenType::Random => Box::new(SampleIterator::new(
            rng,
            RandomValues::new(min, max),
            min_time,
            max_time,
            characteristics,
        )?),
        GenType::Counter => Box::new(SampleIterator::new(
            rng,
            CounterValues::new(min, max),
            min_time,
            max_time,
            characteristics,
        )?),
        GenType::Gauge => Box::new(SampleIterator::new(
            rng,
            GaugeValues::new(min, max),
            min_time,
            max_time,
            characteristics,
        )?),
    };
    Ok(iter)
}
