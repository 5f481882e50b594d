//! In-memory sink.

use crate::traits::{Appendable, Appender, SeriesRef};
use anyhow::{bail, Result};
use blockgen_core::Labels;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Counters of appender lifecycle events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySinkStats {
    pub appenders_opened: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

#[derive(Debug, Default)]
struct State {
    committed: BTreeMap<Labels, Vec<(i64, f64)>>,
    stats: MemorySinkStats,
}

/// Sink that keeps committed series in memory.
///
/// Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<State>>,
    next_ref: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }

    /// Snapshot of every committed series.
    pub fn committed(&self) -> BTreeMap<Labels, Vec<(i64, f64)>> {
        self.lock().committed.clone()
    }

    /// Total number of committed samples.
    pub fn committed_samples(&self) -> usize {
        self.lock().committed.values().map(Vec::len).sum()
    }

    pub fn stats(&self) -> MemorySinkStats {
        self.lock().stats
    }
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // A panicking test thread must not hide the data from the others.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl Appendable for MemorySink {
    type Appender = MemoryAppender;

    async fn appender(&self) -> Result<MemoryAppender> {
        self.lock().stats.appenders_opened += 1;
        Ok(MemoryAppender {
            state: Arc::clone(&self.state),
            next_ref: Arc::clone(&self.next_ref),
            pending: HashMap::new(),
        })
    }
}

/// Appender of a [`MemorySink`]. Buffers samples until commit.
#[derive(Debug)]
pub struct MemoryAppender {
    state: Arc<Mutex<State>>,
    next_ref: Arc<AtomicU64>,
    pending: HashMap<SeriesRef, (Labels, Vec<(i64, f64)>)>,
}

#[async_trait::async_trait]
impl Appender for MemoryAppender {
    async fn append(
        &mut self,
        series_ref: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef> {
        let series_ref = if series_ref.is_empty() {
            SeriesRef(self.next_ref.fetch_add(1, Ordering::Relaxed) + 1)
        } else {
            series_ref
        };
        let (_, samples) = self
            .pending
            .entry(series_ref)
            .or_insert_with(|| (labels.clone(), Vec::new()));
        if let Some((last, _)) = samples.last() {
            if timestamp <= *last {
                bail!("out of order sample for {labels}: {timestamp} after {last}");
            }
        }
        samples.push((timestamp, value));
        Ok(series_ref)
    }

    async fn commit(self) -> Result<()> {
        let mut state = lock_state(&self.state);
        for (_, (labels, samples)) in self.pending {
            state.committed.entry(labels).or_default().extend(samples);
        }
        state.stats.commits += 1;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        lock_state(&self.state).stats.rollbacks += 1;
        Ok(())
    }
}
