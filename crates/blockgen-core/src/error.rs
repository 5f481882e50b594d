//! Error types for spec parsing and validation.

/// Error type for malformed or semantically invalid input.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// Error reading spec input
    #[error("Failed to read spec: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generator type is not one of RANDOM, COUNTER, GAUGE
    #[error("Unsupported generator kind: {0}")]
    UnsupportedGeneratorKind(String),

    /// Label name does not match `[a-zA-Z_][a-zA-Z0-9_]*`
    #[error("Invalid label name: {0:?}")]
    InvalidLabelName(String),

    /// The same label name was given twice
    #[error("Duplicate label name: {0}")]
    DuplicateLabel(String),

    /// Label flag is not `name="value"`
    #[error("Invalid label format: {0}")]
    InvalidLabelFormat(String),

    /// Time range with min time after max time
    #[error("Invalid time range: minTime {min_time} > maxTime {max_time}")]
    InvalidTimeRange { min_time: i64, max_time: i64 },

    /// Scrape interval must be at least one millisecond
    #[error("Scrape interval must be positive")]
    InvalidScrapeInterval,

    /// Change interval, when set, must be at least one millisecond
    #[error("Change interval must be positive")]
    InvalidChangeInterval,

    /// Jitter would let consecutive samples overlap
    #[error("Jitter {jitter_ms}ms must be less than scrape interval {scrape_interval_ms}ms")]
    JitterTooLarge {
        jitter_ms: i64,
        scrape_interval_ms: i64,
    },

    /// Value bounds are inverted or not finite
    #[error("Invalid value bounds: min {min}, max {max}")]
    InvalidBounds { min: f64, max: f64 },

    /// Duration string could not be parsed
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
}
