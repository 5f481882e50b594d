//! On-disk layout of a block: `meta.json` and `series.jsonl`.

use crate::error::WriterError;
use blockgen_core::{Labels, ThanosMeta};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use ulid::Ulid;

pub const META_FILENAME: &str = "meta.json";
pub const SERIES_FILENAME: &str = "series.jsonl";

/// Series and sample counts of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStats {
    pub num_series: u64,
    pub num_samples: u64,
}

/// Compaction state of a block. A freshly written block is its own source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionMeta {
    pub level: u32,
    #[serde(default)]
    pub sources: Vec<Ulid>,
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMeta {
    pub ulid: Ulid,

    /// First sample timestamp in milliseconds
    pub min_time: i64,

    /// Last sample timestamp plus one, in milliseconds
    pub max_time: i64,

    pub stats: BlockStats,
    pub compaction: CompactionMeta,
    pub version: u32,
    pub thanos: ThanosMeta,
}

impl BlockMeta {
    pub fn path(block_dir: &Path) -> PathBuf {
        block_dir.join(META_FILENAME)
    }

    /// Read `meta.json` of the given block directory.
    pub fn read_from(block_dir: &Path) -> Result<Self, WriterError> {
        let content = std::fs::read_to_string(Self::path(block_dir))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write `meta.json` into the given block directory, replacing any
    /// existing one atomically.
    pub fn write_to(&self, block_dir: &Path) -> Result<(), WriterError> {
        let tmp = block_dir.join(format!("{META_FILENAME}.tmp"));
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, Self::path(block_dir))?;
        Ok(())
    }
}

/// One line of `series.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub labels: Labels,
    pub samples: Vec<(i64, f64)>,
}

/// Read every series of a block, in file order.
pub fn read_series(block_dir: &Path) -> Result<Vec<SeriesRecord>, WriterError> {
    let reader = BufReader::new(File::open(block_dir.join(SERIES_FILENAME))?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
