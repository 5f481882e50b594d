//! A labeled series bound to its sample iterator.

use crate::generators::Sample;
use blockgen_core::Labels;
use std::fmt;

/// One series: a label set and the iterator producing its samples.
///
/// The series exclusively owns its iterator, which is drained once by
/// whichever worker receives the series.
pub struct Series {
    labels: Labels,
    samples: Box<dyn Iterator<Item = Sample> + Send>,
}

impl Series {
    pub fn new<I>(labels: Labels, samples: I) -> Self
    where
        I: Iterator<Item = Sample> + Send + 'static,
    {
        Self {
            labels,
            samples: Box::new(samples),
        }
    }

    /// Build a series from an already boxed iterator.
    pub fn from_boxed(labels: Labels, samples: Box<dyn Iterator<Item = Sample> + Send>) -> Self {
        Self { labels, samples }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// Split into labels and the sample iterator.
    pub fn into_parts(self) -> (Labels, Box<dyn Iterator<Item = Sample> + Send>) {
        (self.labels, self.samples)
    }
}

impl fmt::Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Series")
            .field("labels", &self.labels)
            .field("remaining", &self.samples.size_hint())
            .finish()
    }
}
