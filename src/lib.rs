//! Blockgen Library
//!
//! Generates synthetic time-series blocks from declarative YAML specs.
//!
//! # Features
//!
//! - Deterministic series: every series is seeded from its own labels
//! - Random, counter and gauge value shapes with jitter and change windows
//! - Concurrent append pipeline with all-or-nothing block semantics
//! - Hardcoded plans laying blocks out the way a compactor would
//!
//! # Workspace Crates
//!
//! - `blockgen_core` - labels, block and series specs, spec streams
//! - `series_generator` - sample iterators and block series sets
//! - `append_sink` - sink capability traits and an in-memory sink
//! - `append_pipeline` - bounded worker pool draining series into a sink
//! - `block_writer` - sink writing a block directory
//!
//! # CLI Usage
//!
//! ```bash
//! # Plan one week of blocks and generate them
//! blockgen block plan --profile continuous-1w-small --labels 'cluster="one"' \
//!   | blockgen block gen --output-dir ./genblocks --workers 20
//!
//! # Generate from a YAML list of block specs
//! blockgen block gen --output-dir ./genblocks --config blocks.yaml
//! ```

use clap::Args;
use std::path::PathBuf;

pub mod generate;
pub mod plan;

pub use generate::{generate, generate_all, read_meta};
pub use plan::{plan, Profile};

#[derive(Args, Clone, Debug)]
pub struct GenOpts {
    /// Output directory for generated blocks
    #[arg(long, short = 'o', env = "BLOCKGEN_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Number of append workers (0 = twice the number of CPUs)
    #[arg(long, default_value = "0", env = "BLOCKGEN_WORKERS")]
    pub workers: usize,
}

impl GenOpts {
    /// Worker count with the default applied.
    pub fn concurrency(&self) -> usize {
        if self.workers == 0 {
            append_pipeline::default_concurrency()
        } else {
            self.workers
        }
    }
}
