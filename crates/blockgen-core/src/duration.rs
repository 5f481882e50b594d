//! Duration parsing utilities.
//!
//! Durations in spec files and flags are written like `"15s"`, `"500ms"`,
//! `"30m"`, `"2h"`, `"1d"` or `"1w"`. A plain number is interpreted as
//! milliseconds, matching the unit of sample timestamps.

use crate::error::SpecError;
use std::time::Duration;

/// Parse a duration string like "1h", "30m", "15s", "500ms", "300" into a [`Duration`].
///
/// Supports:
/// - Plain numbers (interpreted as milliseconds): "300"
/// - Milliseconds suffix: "500ms"
/// - Seconds suffix: "15s"
/// - Minutes suffix: "30m"
/// - Hours suffix: "2h"
/// - Days suffix: "1d"
/// - Weeks suffix: "1w"
pub fn parse_duration(s: &str) -> Result<Duration, SpecError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SpecError::InvalidDuration("empty duration string".to_string()));
    }

    // "ms" has to be checked before the single-letter suffixes
    let (num_str, unit_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else if let Some(n) = s.strip_suffix('d') {
        (n, 86_400_000)
    } else if let Some(n) = s.strip_suffix('w') {
        (n, 604_800_000)
    } else {
        (s, 1)
    };

    let value: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| SpecError::InvalidDuration(s.to_string()))?;
    let millis = value
        .checked_mul(unit_ms)
        .ok_or_else(|| SpecError::InvalidDuration(s.to_string()))?;
    Ok(Duration::from_millis(millis))
}

/// Format a duration using the largest unit that represents it exactly.
///
/// The output is accepted by [`parse_duration`].
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    const UNITS: [(u128, &str); 5] = [
        (604_800_000, "w"),
        (86_400_000, "d"),
        (3_600_000, "h"),
        (60_000, "m"),
        (1_000, "s"),
    ];
    for (size, suffix) in UNITS {
        if millis % size == 0 {
            return format!("{}{suffix}", millis / size);
        }
    }
    format!("{millis}ms")
}

/// Convert a duration into whole milliseconds, saturating at `i64::MAX`.
pub fn as_millis_i64(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Millis(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration(self) -> Result<Duration, SpecError> {
        match self {
            RawDuration::Millis(ms) => Ok(Duration::from_millis(ms)),
            RawDuration::Text(s) => parse_duration(&s),
        }
    }
}

/// Serde adapter for `Duration` fields written as duration strings.
pub mod serde_duration {
    use super::{format_duration, RawDuration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        RawDuration::deserialize(deserializer)?
            .into_duration()
            .map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<Duration>` fields written as duration strings.
pub mod serde_duration_opt {
    use super::{format_duration, RawDuration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_some(&format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<RawDuration>::deserialize(deserializer)?
            .map(RawDuration::into_duration)
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}
