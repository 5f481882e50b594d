//! Synthetic series generator for blockgen.
//!
//! This crate turns a [`BlockSpec`](blockgen_core::BlockSpec) into a lazy
//! enumeration of [`Series`], each owning a deterministic sample iterator.
//! Every series is seeded from the FNV-1a hash of its full label set, so the
//! same labels always produce the same samples, whatever order the series
//! are generated in and however many workers consume them.
//!
//! # Architecture
//!
//! ```text
//! BlockSpec (YAML)
//!        │
//!        ▼
//! ┌──────────────────┐
//! │  BlockSeriesSet  │  spec order, targets N..1
//! │                  │
//! │  labels + target │
//! │  seed = fnv(lbl) │
//! └────────┬─────────┘
//!          │
//!          ▼
//!    Series { labels, SampleIterator<RandomValues|CounterValues|GaugeValues> }
//! ```
//!
//! # Example
//!
//! ```rust
//! use blockgen_core::BlockSpec;
//! use series_generator::BlockSeriesSet;
//!
//! let spec = BlockSpec::from_yaml(r#"
//! minTime: 0
//! maxTime: 60000
//! series:
//!   - labels:
//!       __name__: up
//!     targets: 2
//!     type: GAUGE
//!     minTime: 0
//!     maxTime: 60000
//!     scrapeInterval: 15s
//!     min: 0
//!     max: 1
//! "#).unwrap();
//!
//! for series in BlockSeriesSet::new(&spec) {
//!     let series = series.unwrap();
//!     let samples: Vec<_> = series.into_parts().1.collect();
//!     assert_eq!(samples.len(), 4);
//! }
//! ```

pub mod generators;
pub mod series;
pub mod series_set;

// Re-exports for convenience
pub use generators::{create_samples, Sample, SampleIterator, ValueGenerator};
pub use series::Series;
pub use series_set::{series_seed, BlockSeriesSet, GeneratorError};
