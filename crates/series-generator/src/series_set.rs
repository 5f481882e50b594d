//! Expansion of a block spec into its series.

use crate::generators::create_samples;
use crate::series::Series;
use blockgen_core::{BlockSpec, Labels, SeriesSpec, SpecError, TARGET_LABEL};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// Error type for series enumeration.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// The generator for a series could not be constructed
    #[error("Invalid series {labels}: {source}")]
    InvalidSeries {
        labels: Labels,
        #[source]
        source: SpecError,
    },
}

/// Seed of the random source for a series with the given (merged) labels.
pub fn series_seed(labels: &Labels) -> u64 {
    labels.stable_hash()
}

/// Lazy enumeration of every series of a block spec.
///
/// Series specs are visited in declaration order and, within a spec, targets
/// count down from `targets` to 1. Only one series exists at a time; the set
/// is restarted by constructing a new one. Not meant to be shared between
/// tasks: a single coordinator drives it.
///
/// After a construction failure the error is yielded once and the
/// enumeration ends.
pub struct BlockSeriesSet<'a> {
    block: &'a BlockSpec,
    spec_index: usize,
    remaining: Option<u64>,
    failed: bool,
}

impl<'a> BlockSeriesSet<'a> {
    pub fn new(block: &'a BlockSpec) -> Self {
        Self {
            block,
            spec_index: 0,
            remaining: None,
            failed: false,
        }
    }

    /// Labels of the given target: spec labels, then external labels on
    /// top, then the target label.
    fn target_labels(&self, spec: &SeriesSpec, target: u64) -> Labels {
        let mut labels = spec.labels.merge(self.block.external_labels());
        labels.set(TARGET_LABEL, target.to_string());
        labels
    }

    fn build(&self, spec: &SeriesSpec, target: u64) -> Result<Series, GeneratorError> {
        let labels = self.target_labels(spec, target);
        let rng = StdRng::seed_from_u64(series_seed(&labels));
        match create_samples(
            spec.kind,
            rng,
            spec.min_time,
            spec.max_time,
            &spec.characteristics,
        ) {
            Ok(samples) => Ok(Series::from_boxed(labels, samples)),
            Err(source) => Err(GeneratorError::InvalidSeries { labels, source }),
        }
    }
}

impl Iterator for BlockSeriesSet<'_> {
    type Item = Result<Series, GeneratorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let spec = self.block.series.get(self.spec_index)?;
            let remaining = match self.remaining {
                Some(remaining) => remaining,
                None => {
                    debug!(
                        "Expanding series spec {} into {} targets",
                        spec.labels, spec.targets
                    );
                    spec.targets
                }
            };
            if remaining == 0 {
                self.spec_index += 1;
                self.remaining = None;
                continue;
            }
            self.remaining = Some(remaining - 1);

            let result = self.build(spec, remaining);
            if result.is_err() {
                self.failed = true;
            }
            return Some(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::Sample;
    use std::collections::HashSet;

    // Specs are built unvalidated so construction errors surface from the set.
    fn block(yaml: &str) -> BlockSpec {
        let mut spec = BlockSpec::new(0, 120_000);
        for doc in yaml.split("---") {
            if doc.trim().is_empty() {
                continue;
            }
            let series: SeriesSpec = serde_yaml::from_str(doc).unwrap();
            spec.series.push(series);
        }
        spec
    }

    const TWO_SPECS: &str = r#"
labels:
  __name__: cpu
targets: 3
type: GAUGE
minTime: 0
maxTime: 120000
scrapeInterval: 15s
min: 0
max: 1
---
labels:
  __name__: requests
targets: 2
type: COUNTER
minTime: 0
maxTime: 60000
scrapeInterval: 30s
min: 1
max: 5
"#;

    fn drain(series: Series) -> (Labels, Vec<Sample>) {
        let (labels, samples) = series.into_parts();
        (labels, samples.collect())
    }

    #[test]
    fn test_expansion_order_and_labels() {
        let spec = block(TWO_SPECS);
        let series: Vec<Series> = BlockSeriesSet::new(&spec)
            .collect::<Result<_, _>>()
            .unwrap();

        let ids: Vec<(String, String)> = series
            .iter()
            .map(|s| {
                (
                    s.labels().get("__name__").unwrap().to_string(),
                    s.labels().get(TARGET_LABEL).unwrap().to_string(),
                )
            })
            .collect();
        let expected: Vec<(String, String)> = [
            ("cpu", "3"),
            ("cpu", "2"),
            ("cpu", "1"),
            ("requests", "2"),
            ("requests", "1"),
        ]
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_targets_have_distinct_labels() {
        let mut spec = block(TWO_SPECS);
        spec.series[0].targets = 250;
        let labels: HashSet<Labels> = BlockSeriesSet::new(&spec)
            .map(|s| s.unwrap().labels().clone())
            .collect();
        assert_eq!(labels.len(), 252);
    }

    #[test]
    fn test_zero_targets_yields_nothing() {
        let mut spec = block(TWO_SPECS);
        spec.series[0].targets = 0;
        let series: Vec<_> = BlockSeriesSet::new(&spec).collect();
        assert_eq!(series.len(), 2);

        spec.series[1].targets = 0;
        assert!(BlockSeriesSet::new(&spec).next().is_none());
    }

    #[test]
    fn test_zero_length_range_yields_empty_series() {
        let mut spec = block(TWO_SPECS);
        spec.series[0].max_time = 0;
        let series: Vec<_> = BlockSeriesSet::new(&spec).map(|s| drain(s.unwrap())).collect();
        assert_eq!(series.len(), 5);
        assert!(series[..3].iter().all(|(_, samples)| samples.is_empty()));
        assert!(series[3..].iter().all(|(_, samples)| samples.len() == 2));
    }

    #[test]
    fn test_external_labels_merged_and_win() {
        let mut spec = block(TWO_SPECS);
        spec.series[0].labels.set("cluster", "from-series");
        spec.thanos.labels = Labels::from_pairs([("cluster", "ext"), ("region", "eu")]).unwrap();

        for series in BlockSeriesSet::new(&spec) {
            let series = series.unwrap();
            assert_eq!(series.labels().get("cluster"), Some("ext"));
            assert_eq!(series.labels().get("region"), Some("eu"));
        }
    }

    #[test]
    fn test_reproducible_across_sets() {
        let spec = block(TWO_SPECS);
        let first: Vec<_> = BlockSeriesSet::new(&spec).map(|s| drain(s.unwrap())).collect();
        let second: Vec<_> = BlockSeriesSet::new(&spec).map(|s| drain(s.unwrap())).collect();
        assert_eq!(first, second);

        // Same labels give the same samples regardless of their position.
        let mut reordered = spec.clone();
        reordered.series.reverse();
        let mut third: Vec<_> = BlockSeriesSet::new(&reordered)
            .map(|s| drain(s.unwrap()))
            .collect();
        let mut first_sorted = first;
        first_sorted.sort_by(|a, b| a.0.cmp(&b.0));
        third.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(first_sorted, third);
    }

    #[test]
    fn test_seed_depends_on_labels() {
        let spec = block(TWO_SPECS);
        let seeds: HashSet<u64> = BlockSeriesSet::new(&spec)
            .map(|s| series_seed(s.unwrap().labels()))
            .collect();
        assert_eq!(seeds.len(), 5);
    }

    #[test]
    fn test_construction_error_ends_enumeration() {
        let mut spec = block(TWO_SPECS);
        spec.series[1].characteristics.jitter = std::time::Duration::from_secs(60);

        let mut set = BlockSeriesSet::new(&spec);
        for _ in 0..3 {
            assert!(set.next().unwrap().is_ok());
        }
        match set.next() {
            Some(Err(GeneratorError::InvalidSeries { labels, source })) => {
                assert_eq!(labels.get("__name__"), Some("requests"));
                assert!(matches!(source, SpecError::JitterTooLarge { .. }));
            }
            other => panic!("expected construction error, got {other:?}"),
        }
        assert!(set.next().is_none());
    }
}
