//! Appendable and Appender trait definitions.

use anyhow::Result;
use blockgen_core::Labels;

/// Opaque per-series cursor handed back by [`Appender::append`].
///
/// The first append of a series passes [`SeriesRef::EMPTY`]; later appends of
/// the same series pass the ref returned by the previous call, so the sink
/// does not have to resolve the labels again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesRef(pub u64);

impl SeriesRef {
    pub const EMPTY: SeriesRef = SeriesRef(0);

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

/// Source of independent writer handles.
///
/// # Usage Pattern
///
/// The pipeline opens one appender per worker up front and moves each into
/// its worker task:
///
/// ```ignore
/// let appender = sink.appender().await?;
/// tokio::spawn(async move {
///     let mut r = SeriesRef::EMPTY;
///     r = appender.append(r, &labels, t, v).await?;
///     appender.commit().await
/// });
/// ```
#[async_trait::async_trait]
pub trait Appendable: Send + Sync {
    type Appender: Appender + 'static;

    /// Open a new writer handle.
    async fn appender(&self) -> Result<Self::Appender>;
}

/// Writer handle owned by a single worker.
///
/// Appended samples become visible only on [`Appender::commit`]. Both
/// `commit` and `rollback` consume the handle, so each handle ends exactly
/// once.
#[async_trait::async_trait]
pub trait Appender: Send + Sized {
    /// Append one sample and return the series ref to use for the next
    /// sample of the same series.
    ///
    /// Samples of one series must be appended in increasing timestamp order.
    async fn append(
        &mut self,
        series_ref: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef>;

    /// Make every pending sample visible.
    async fn commit(self) -> Result<()>;

    /// Discard every pending sample.
    async fn rollback(self) -> Result<()>;
}
