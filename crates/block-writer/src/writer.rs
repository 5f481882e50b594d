//! In-memory block builder backing the append sink.

use crate::error::WriterError;
use crate::meta::{BlockMeta, BlockStats, CompactionMeta, SeriesRecord, SERIES_FILENAME};
use anyhow::{bail, Result};
use append_sink::{Appendable, Appender, SeriesRef};
use blockgen_core::{Labels, ThanosMeta};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use ulid::Ulid;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Default)]
struct State {
    series: BTreeMap<Labels, Vec<(i64, f64)>>,
    commits: usize,
    rollbacks: usize,
}

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Writes one block under an output directory.
///
/// Appenders buffer samples until commit; committed series are kept in
/// memory, ordered by labels, until [`BlockWriter::flush`].
#[derive(Debug)]
pub struct BlockWriter {
    output_dir: PathBuf,
    ulid: Ulid,
    state: Arc<Mutex<State>>,
    next_ref: Arc<AtomicU64>,
}

impl BlockWriter {
    /// Create a writer for a new block under `output_dir`, creating the
    /// directory if needed.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self, WriterError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            ulid: Ulid::new(),
            state: Arc::default(),
            next_ref: Arc::default(),
        })
    }

    pub fn ulid(&self) -> Ulid {
        self.ulid
    }

    /// Directory the block lands in after flush.
    pub fn block_dir(&self) -> PathBuf {
        self.output_dir.join(self.ulid.to_string())
    }

    /// Write every committed series and the block meta.
    ///
    /// The block is assembled in a temporary directory and renamed into
    /// place, so a crashed flush leaves no half-written block behind.
    pub fn flush(self) -> Result<BlockMeta, WriterError> {
        let state = std::mem::take(&mut *lock_state(&self.state));
        if state.series.is_empty() {
            return Err(WriterError::NoSeries);
        }

        let block_dir = self.block_dir();
        if block_dir.exists() {
            return Err(WriterError::AlreadyExists(block_dir));
        }
        let tmp_dir = self
            .output_dir
            .join(format!("{}.tmp-for-creation", self.ulid));
        if tmp_dir.exists() {
            std::fs::remove_dir_all(&tmp_dir)?;
        }
        let meta = publish(&tmp_dir, &block_dir, |dir| {
            write_block(self.ulid, dir, &state.series)
        })?;
        let stats = meta.stats;

        info!(
            "Flushed block {} to {} ({} series, {} samples, {} commits, {} rollbacks)",
            self.ulid,
            block_dir.display(),
            stats.num_series,
            stats.num_samples,
            state.commits,
            state.rollbacks
        );
        Ok(meta)
    }
}

/// Run `write` in a fresh `tmp_dir` and rename it to `block_dir`. On
/// failure the temporary directory is removed.
fn publish<F>(tmp_dir: &Path, block_dir: &Path, write: F) -> Result<BlockMeta, WriterError>
where
    F: FnOnce(&Path) -> Result<BlockMeta, WriterError>,
{
    std::fs::create_dir_all(tmp_dir)?;
    let written = write(tmp_dir).and_then(|meta| {
        std::fs::rename(tmp_dir, block_dir)?;
        Ok(meta)
    });
    if written.is_err() {
        if let Err(e) = std::fs::remove_dir_all(tmp_dir) {
            warn!("Failed to remove {}: {e}", tmp_dir.display());
        }
    }
    written
}

fn write_block(
    ulid: Ulid,
    dir: &Path,
    series: &BTreeMap<Labels, Vec<(i64, f64)>>,
) -> Result<BlockMeta, WriterError> {
    let stats = write_series(dir, series)?;
    let (min_time, max_time) = time_range(series);
    let meta = BlockMeta {
        ulid,
        min_time,
        max_time,
        stats,
        compaction: CompactionMeta {
            level: 1,
            sources: vec![ulid],
        },
        version: 1,
        thanos: ThanosMeta::default(),
    };
    meta.write_to(dir)?;
    Ok(meta)
}

fn write_series(dir: &Path, series: &BTreeMap<Labels, Vec<(i64, f64)>>) -> Result<BlockStats, WriterError> {
    let file = File::create(dir.join(SERIES_FILENAME))?;
    let mut writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
    let mut stats = BlockStats::default();

    for (labels, samples) in series {
        let record = SeriesRecord {
            labels: labels.clone(),
            samples: samples.clone(),
        };
        serde_json::to_writer(&mut writer, &record)?;
        writer.write_all(b"\n")?;
        stats.num_series += 1;
        stats.num_samples += samples.len() as u64;
    }
    writer.flush()?;
    Ok(stats)
}

/// Observed `[min, max + 1)` over every sample. Series without samples do
/// not contribute.
fn time_range(series: &BTreeMap<Labels, Vec<(i64, f64)>>) -> (i64, i64) {
    let mut min_time = i64::MAX;
    let mut max_time = i64::MIN;
    for samples in series.values() {
        if let (Some((first, _)), Some((last, _))) = (samples.first(), samples.last()) {
            min_time = min_time.min(*first);
            max_time = max_time.max(*last);
        }
    }
    if min_time > max_time {
        return (0, 0);
    }
    (min_time, max_time.saturating_add(1))
}

#[async_trait::async_trait]
impl Appendable for BlockWriter {
    type Appender = BlockWriterAppender;

    async fn appender(&self) -> Result<BlockWriterAppender> {
        Ok(BlockWriterAppender {
            state: Arc::clone(&self.state),
            next_ref: Arc::clone(&self.next_ref),
            pending: HashMap::new(),
        })
    }
}

/// Appender of a [`BlockWriter`].
#[derive(Debug)]
pub struct BlockWriterAppender {
    state: Arc<Mutex<State>>,
    next_ref: Arc<AtomicU64>,
    pending: HashMap<SeriesRef, (Labels, Vec<(i64, f64)>)>,
}

#[async_trait::async_trait]
impl Appender for BlockWriterAppender {
    async fn append(
        &mut self,
        series_ref: SeriesRef,
        labels: &Labels,
        timestamp: i64,
        value: f64,
    ) -> Result<SeriesRef> {
        if !value.is_finite() {
            bail!("non-finite value {value} for {labels} at {timestamp}");
        }
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
        // Reject the whole commit before merging anything.
        for (labels, samples) in self.pending.values() {
            let last = state.series.get(labels).and_then(|s| s.last());
            if let (Some((last, _)), Some((first, _))) = (last, samples.first()) {
                if first <= last {
                    bail!("out of order commit for {labels}: {first} after {last}");
                }
            }
        }
        let series = self.pending.len();
        for (_, (labels, samples)) in self.pending {
            state.series.entry(labels).or_default().extend(samples);
        }
        state.commits += 1;
        debug!("Committed {series} series");
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        let mut state = lock_state(&self.state);
        state.rollbacks += 1;
        debug!("Rolled back {} pending series", self.pending.len());
        Ok(())
    }
}
