//! Core types for the blockgen framework.
//!
//! This crate provides the foundational types shared by the generator,
//! the append pipeline and the block writer:
//!
//! - [`Labels`] - Sorted, validated label sets with a canonical byte encoding
//! - [`Characteristics`] - Value-shape configuration for one series
//! - [`SeriesSpec`] / [`BlockSpec`] - Declarative block specifications loaded from YAML
//! - [`BlockSpecStream`] - Incremental decoding of a `---` separated spec stream
//! - [`SpecError`] - Errors for malformed or invalid input
//!
//! # Architecture
//!
//! ```text
//! blockgen-core (this crate)
//!    │
//!    ├─── series-generator  (expands BlockSpec into seeded Series)
//!    ├─── append-sink       (sink capability traits keyed by Labels)
//!    ├─── append-pipeline   (drains Series into a sink)
//!    └─── block-writer      (writes blocks, carries BlockSpec metadata)
//! ```
//!
//! # Example
//!
//! ```rust
//! use blockgen_core::BlockSpec;
//!
//! let spec = BlockSpec::from_yaml(r#"
//! minTime: 0
//! maxTime: 7200000
//! thanos:
//!   labels:
//!     cluster: eu-1
//! series:
//!   - labels:
//!       __name__: http_requests_total
//!     targets: 10
//!     type: COUNTER
//!     minTime: 0
//!     maxTime: 7200000
//!     scrapeInterval: 15s
//!     min: 0
//!     max: 100
//! "#).unwrap();
//!
//! assert_eq!(spec.series[0].targets, 10);
//! ```

pub mod duration;
pub mod error;
pub mod labels;
pub mod spec;
pub mod stream;

// Re-exports for convenience
pub use error::SpecError;
pub use labels::{Label, Labels, TARGET_LABEL};
pub use spec::{BlockSpec, Characteristics, Compaction, Downsample, GenType, SeriesSpec, ThanosMeta};
pub use stream::BlockSpecStream;
