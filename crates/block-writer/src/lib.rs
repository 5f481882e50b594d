//! Block directory writer.
//!
//! [`BlockWriter`] is an [`Appendable`](append_sink::Appendable) that keeps
//! committed series in memory and writes them out on [`BlockWriter::flush`]:
//!
//! ```text
//! <output-dir>/<ulid>/
//!   ├── series.jsonl   one {"labels": {..}, "samples": [[t, v], ..]} per line
//!   └── meta.json      BlockMeta
//! ```

pub mod error;
pub mod meta;
pub mod writer;

pub use error::WriterError;
pub use meta::{
    read_series, BlockMeta, BlockStats, CompactionMeta, SeriesRecord, META_FILENAME,
    SERIES_FILENAME,
};
pub use writer::{BlockWriter, BlockWriterAppender};
