//! Declarative block specifications.
//!
//! A [`BlockSpec`] describes one block: its time range, the external labels
//! and metadata carried into the block meta, and an ordered list of
//! [`SeriesSpec`] templates. Each series spec is expanded into `targets`
//! concrete series by the generator.

use crate::duration::{as_millis_i64, format_duration, serde_duration, serde_duration_opt};
use crate::error::SpecError;
use crate::labels::Labels;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Characteristics
// ============================================================================

/// Value-shape configuration shared by every target of a series spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Characteristics {
    /// Time between two consecutive samples
    #[serde(with = "serde_duration")]
    pub scrape_interval: Duration,

    /// Maximum random offset added to each sample timestamp
    #[serde(default, with = "serde_duration")]
    pub jitter: Duration,

    /// When set, values are only redrawn once per change window
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_duration_opt"
    )]
    pub change_interval: Option<Duration>,

    /// Lower value bound (inclusive)
    pub min: f64,

    /// Upper value bound (inclusive)
    pub max: f64,
}

impl Characteristics {
    /// Create characteristics without jitter or change interval.
    pub fn new(scrape_interval: Duration, min: f64, max: f64) -> Self {
        Self {
            scrape_interval,
            jitter: Duration::ZERO,
            change_interval: None,
            min,
            max,
        }
    }

    /// Set the timestamp jitter.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the change interval.
    pub fn with_change_interval(mut self, change_interval: Duration) -> Self {
        self.change_interval = Some(change_interval);
        self
    }

    /// Scrape interval in milliseconds.
    pub fn scrape_interval_ms(&self) -> i64 {
        as_millis_i64(self.scrape_interval)
    }

    /// Jitter in milliseconds.
    pub fn jitter_ms(&self) -> i64 {
        as_millis_i64(self.jitter)
    }

    /// Change interval in milliseconds, if set.
    pub fn change_interval_ms(&self) -> Option<i64> {
        self.change_interval.map(as_millis_i64)
    }

    /// Check the invariants generators rely on.
    ///
    /// Jitter must stay below the scrape interval, otherwise consecutive
    /// samples could swap order.
    pub fn validate(&self) -> Result<(), SpecError> {
        let interval = self.scrape_interval_ms();
        if interval <= 0 {
            return Err(SpecError::InvalidScrapeInterval);
        }
        let jitter = self.jitter_ms();
        if jitter >= interval {
            return Err(SpecError::JitterTooLarge {
                jitter_ms: jitter,
                scrape_interval_ms: interval,
            });
        }
        if matches!(self.change_interval_ms(), Some(ms) if ms <= 0) {
            return Err(SpecError::InvalidChangeInterval);
        }
        // The span must be finite too, generators draw from it.
        if !self.min.is_finite()
            || !self.max.is_finite()
            || self.min > self.max
            || !(self.max - self.min).is_finite()
        {
            return Err(SpecError::InvalidBounds {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Generator Type
// ============================================================================

/// Value-shape policy of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum GenType {
    /// Independent uniform draws in `[min, max]`
    Random,
    /// Monotonically non-decreasing values
    Counter,
    /// Bounded random walk within `[min, max]`
    Gauge,
}

impl GenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenType::Random => "RANDOM",
            GenType::Counter => "COUNTER",
            GenType::Gauge => "GAUGE",
        }
    }
}

impl FromStr for GenType {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RANDOM" => Ok(GenType::Random),
            "COUNTER" => Ok(GenType::Counter),
            "GAUGE" => Ok(GenType::Gauge),
            _ => Err(SpecError::UnsupportedGeneratorKind(s.to_string())),
        }
    }
}

impl TryFrom<String> for GenType {
    type Error = SpecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for GenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Series Spec
// ============================================================================

fn default_targets() -> u64 {
    1
}

/// Template for one or more series sharing labels and characteristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSpec {
    /// Base labels of every expanded series
    #[serde(default)]
    pub labels: Labels,

    /// Number of label-distinguished instances to expand into
    #[serde(default = "default_targets")]
    pub targets: u64,

    /// Generator type
    #[serde(rename = "type")]
    pub kind: GenType,

    /// Start of the sample range in milliseconds (inclusive)
    pub min_time: i64,

    /// End of the sample range in milliseconds (exclusive)
    pub max_time: i64,

    #[serde(flatten)]
    pub characteristics: Characteristics,
}

impl SeriesSpec {
    /// Check the time range and characteristics.
    pub fn validate(&self) -> Result<(), SpecError> {
        validate_range(self.min_time, self.max_time)?;
        self.characteristics.validate()
    }
}

// ============================================================================
// Block Spec
// ============================================================================

/// Compaction metadata carried into the block meta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compaction {
    pub level: u32,
}

impl Default for Compaction {
    fn default() -> Self {
        Self { level: 1 }
    }
}

/// Downsampling metadata carried into the block meta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downsample {
    #[serde(default)]
    pub resolution: i64,
}

/// External labels and provenance of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThanosMeta {
    /// External labels, merged into every series of the block
    #[serde(default)]
    pub labels: Labels,

    #[serde(default)]
    pub downsample: Downsample,

    /// Component that produced the block
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "blockgen".to_string()
}

impl Default for ThanosMeta {
    fn default() -> Self {
        Self {
            labels: Labels::new(),
            downsample: Downsample::default(),
            source: default_source(),
        }
    }
}

fn default_version() -> u32 {
    1
}

/// Specification of one block to generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSpec {
    /// Start of the block range in milliseconds
    pub min_time: i64,

    /// End of the block range in milliseconds
    pub max_time: i64,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub compaction: Compaction,

    #[serde(default)]
    pub thanos: ThanosMeta,

    /// Series templates, expanded in declaration order
    #[serde(default)]
    pub series: Vec<SeriesSpec>,
}

impl BlockSpec {
    /// Create an empty block spec for the given range.
    pub fn new(min_time: i64, max_time: i64) -> Self {
        Self {
            min_time,
            max_time,
            version: default_version(),
            compaction: Compaction::default(),
            thanos: ThanosMeta::default(),
            series: Vec::new(),
        }
    }

    /// Parse a single block spec from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, SpecError> {
        let spec: BlockSpec = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a YAML sequence of block specs.
    pub fn list_from_yaml(yaml: &str) -> Result<Vec<Self>, SpecError> {
        let specs: Vec<BlockSpec> = serde_yaml::from_str(yaml)?;
        for spec in &specs {
            spec.validate()?;
        }
        Ok(specs)
    }

    /// Load a YAML sequence of block specs from a file.
    pub fn list_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<Self>, SpecError> {
        let content = fs::read_to_string(path)?;
        Self::list_from_yaml(&content)
    }

    /// Serialize as a YAML document.
    pub fn to_yaml(&self) -> Result<String, SpecError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// External labels of the block.
    pub fn external_labels(&self) -> &Labels {
        &self.thanos.labels
    }

    /// Total number of series the block expands into.
    pub fn series_count(&self) -> u64 {
        self.series.iter().map(|s| s.targets).sum()
    }

    /// Check the block range and every series spec.
    pub fn validate(&self) -> Result<(), SpecError> {
        validate_range(self.min_time, self.max_time)?;
        for series in &self.series {
            series.validate()?;
        }
        Ok(())
    }

    /// Short description used in log lines, e.g. `[0 - 7200000](2h)`.
    pub fn summary(&self) -> String {
        let length = u64::try_from(self.max_time.saturating_sub(self.min_time)).unwrap_or(0);
        format!(
            "[{} - {}]({})",
            self.min_time,
            self.max_time,
            format_duration(Duration::from_millis(length))
        )
    }
}

fn validate_range(min_time: i64, max_time: i64) -> Result<(), SpecError> {
    if min_time > max_time {
        return Err(SpecError::InvalidTimeRange { min_time, max_time });
    }
    Ok(())
}
