//! Append sink trait abstraction.
//!
//! This crate defines the capability interface the append pipeline writes
//! through. A sink ([`Appendable`]) hands out independent writer handles
//! ([`Appender`]); each handle buffers appended samples until it is
//! committed or rolled back.
//!
//! [`MemorySink`] keeps committed samples in memory and is used by tests
//! and dry runs.

mod memory;
mod traits;

pub use memory::{MemoryAppender, MemorySink, MemorySinkStats};
pub use traits::{Appendable, Appender, SeriesRef};
