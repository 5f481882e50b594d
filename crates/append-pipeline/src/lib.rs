//! Concurrent append pipeline.
//!
//! [`append`] drains a series set into an [`Appendable`](append_sink::Appendable)
//! sink using a fixed number of workers:
//!
//! ```text
//!   BlockSeriesSet ──► coordinator ──► queue (capacity 1) ──► worker 0 ─► appender 0
//!                                                        ├──► worker 1 ─► appender 1
//!                                                        └──► worker N ─► appender N
//! ```
//!
//! - The coordinator is the only task touching the series set.
//! - Each worker owns one appender for its whole life and commits it once,
//!   after the queue is closed.
//! - Any failure rolls back the failing worker's appender and cancels the
//!   shared token, so the other workers roll back too.

pub mod error;
pub mod pipeline;

pub use error::AppendError;
pub use pipeline::{append, default_concurrency, AppendStats};
