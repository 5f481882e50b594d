//! Hardcoded block plans.
//!
//! A plan lays blocks out backwards from a max time aligned to a 2h
//! boundary, newest first, with the block ranges a compactor would have
//! produced. Each block carries the same set of series specs.

use anyhow::{Context, Result};
use blockgen_core::duration::{as_millis_i64, parse_duration};
use blockgen_core::{BlockSpec, Characteristics, Compaction, GenType, Labels, SeriesSpec};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use std::time::Duration;
use tracing::debug;

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Blocks are aligned to this range.
pub const BLOCK_ALIGNMENT_MS: i64 = 2 * HOUR_MS;

/// Compaction ranges; a block's level is the index of the smallest range
/// holding it, plus one.
const COMPACTION_RANGES_MS: [i64; 4] = [2 * HOUR_MS, 8 * HOUR_MS, 2 * DAY_MS, 14 * DAY_MS];

const SCRAPE_INTERVAL: Duration = Duration::from_secs(15);

/// Named plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// One 2h block of a handful of gauges
    Tiny,
    /// One week of continuous blocks, 50k series
    #[value(name = "continuous-1w-small")]
    Continuous1wSmall,
    /// 30 days of compacted blocks, 100 series
    #[value(name = "continuous-30d-tiny")]
    Continuous30dTiny,
    /// One day of 2h blocks of counters
    #[value(name = "counters-1d-small")]
    Counters1dSmall,
}

/// Block ranges and series shape of a profile.
struct Layout {
    /// Range pattern, newest first; the last entry repeats
    ranges: &'static [i64],
    total: i64,
    apps: usize,
    metrics: usize,
    targets: u64,
    kind: GenType,
}

impl Profile {
    fn layout(self) -> Layout {
        match self {
            Profile::Tiny => Layout {
                ranges: &[2 * HOUR_MS],
                total: 2 * HOUR_MS,
                apps: 10,
                metrics: 10,
                targets: 5,
                kind: GenType::Gauge,
            },
            Profile::Continuous1wSmall => Layout {
                ranges: &[2 * HOUR_MS, 2 * HOUR_MS, 2 * HOUR_MS, 8 * HOUR_MS, 2 * DAY_MS],
                total: 7 * DAY_MS,
                apps: 50,
                metrics: 100,
                targets: 10,
                kind: GenType::Gauge,
            },
            Profile::Continuous30dTiny => Layout {
                ranges: &[2 * DAY_MS, 14 * DAY_MS],
                total: 30 * DAY_MS,
                apps: 1,
                metrics: 100,
                targets: 1,
                kind: GenType::Gauge,
            },
            Profile::Counters1dSmall => Layout {
                ranges: &[2 * HOUR_MS],
                total: DAY_MS,
                apps: 20,
                metrics: 50,
                targets: 5,
                kind: GenType::Counter,
            },
        }
    }

    pub fn name(self) -> String {
        self.to_possible_value()
            .map(|v| v.get_name().to_string())
            .unwrap_or_default()
    }
}

/// Parse `--max-time`: an RFC 3339 timestamp, or a duration subtracted from
/// `now`. Returns milliseconds.
pub fn parse_time_or_duration(value: &str, now: DateTime<Utc>) -> Result<i64> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.timestamp_millis());
    }
    let ago = parse_duration(value)
        .with_context(|| format!("Invalid time or duration: {value}"))?;
    Ok(now.timestamp_millis() - as_millis_i64(ago))
}

/// Round down to the block alignment.
pub fn align_down(t: i64) -> i64 {
    t - t.rem_euclid(BLOCK_ALIGNMENT_MS)
}

fn compaction_level(range: i64) -> u32 {
    COMPACTION_RANGES_MS
        .iter()
        .position(|r| range <= *r)
        .unwrap_or(COMPACTION_RANGES_MS.len() - 1) as u32
        + 1
}

/// Ranges of the blocks of a layout, newest first. The pattern's last entry
/// repeats and the final block is cut to fit `total`.
fn block_ranges(layout: &Layout) -> Vec<i64> {
    let mut ranges = Vec::new();
    let mut covered = 0;
    let mut pattern = layout.ranges.iter();
    let mut current = 0;
    while covered < layout.total {
        if let Some(next) = pattern.next() {
            current = *next;
        }
        if current <= 0 {
            break;
        }
        let range = current.min(layout.total - covered);
        ranges.push(range);
        covered += range;
    }
    ranges
}

fn series_specs(layout: &Layout, min_time: i64, max_time: i64) -> Vec<SeriesSpec> {
    let characteristics = match layout.kind {
        GenType::Counter => Characteristics::new(SCRAPE_INTERVAL, 0.0, 50.0),
        _ => Characteristics::new(SCRAPE_INTERVAL, 0.0, 100.0),
    };
    let mut specs = Vec::with_capacity(layout.apps * layout.metrics);
    for app in 0..layout.apps {
        for metric in 0..layout.metrics {
            let name = match layout.kind {
                GenType::Counter => format!("blockgen_requests_{metric}_total"),
                _ => format!("blockgen_gauge_{metric}"),
            };
            let mut labels = Labels::new();
            labels.set("__name__", name);
            labels.set("app", format!("app-{app}"));
            specs.push(SeriesSpec {
                labels,
                targets: layout.targets,
                kind: layout.kind,
                min_time,
                max_time,
                characteristics: characteristics.clone(),
            });
        }
    }
    specs
}

/// Emit the block specs of `profile` ending at `max_time`, newest first.
///
/// `emit` is called once per block; its first error stops the plan.
pub fn plan<F>(profile: Profile, max_time: i64, external_labels: &Labels, mut emit: F) -> Result<()>
where
    F: FnMut(BlockSpec) -> Result<()>,
{
    let layout = profile.layout();
    let mut block_max = align_down(max_time);
    for range in block_ranges(&layout) {
        let block_min = block_max - range;
        let mut spec = BlockSpec::new(block_min, block_max);
        spec.compaction = Compaction {
            level: compaction_level(range),
        };
        spec.thanos.labels = external_labels.clone();
        spec.series = series_specs(&layout, block_min, block_max);
        debug!("Planned block {}", spec.summary());
        emit(spec)?;
        block_max = block_min;
    }
    Ok(())
}

/// Render a block spec as one document of a `---` separated YAML stream.
pub fn to_stream_document(spec: &BlockSpec) -> Result<String> {
    Ok(format!("---\n{}", spec.to_yaml()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockgen_core::BlockSpecStream;
    use chrono::TimeZone;

    fn collect(profile: Profile, max_time: i64) -> Vec<BlockSpec> {
        let mut specs = Vec::new();
        plan(profile, max_time, &Labels::new(), |spec| {
            specs.push(spec);
            Ok(())
        })
        .unwrap();
        specs
    }

    #[test]
    fn test_tiny_profile() {
        let specs = collect(Profile::Tiny, 5 * HOUR_MS + 123);
        assert_eq!(specs.len(), 1);
        let block = &specs[0];
        assert_eq!(block.min_time, 2 * HOUR_MS);
        assert_eq!(block.max_time, 4 * HOUR_MS);
        assert_eq!(block.series.len(), 100);
        assert_eq!(block.series_count(), 500);
        assert_eq!(block.compaction.level, 1);
        assert!(block.validate().is_ok());
    }

    #[test]
    fn test_one_week_layout_is_contiguous() {
        let max = 100 * DAY_MS;
        let specs = collect(Profile::Continuous1wSmall, max);
        let ranges: Vec<i64> = specs.iter().map(|s| s.max_time - s.min_time).collect();
        assert_eq!(
            ranges,
            vec![
                2 * HOUR_MS,
                2 * HOUR_MS,
                2 * HOUR_MS,
                8 * HOUR_MS,
                2 * DAY_MS,
                2 * DAY_MS,
                2 * DAY_MS,
                10 * HOUR_MS
            ]
        );
        assert_eq!(specs[0].max_time, max);
        for pair in specs.windows(2) {
            assert_eq!(pair[0].min_time, pair[1].max_time);
        }
        assert_eq!(specs.last().unwrap().min_time, max - 7 * DAY_MS);
        assert_eq!(specs[3].compaction.level, 2);
        assert_eq!(specs[4].compaction.level, 3);
    }

    #[test]
    fn test_thirty_days_layout() {
        let specs = collect(Profile::Continuous30dTiny, 60 * DAY_MS);
        let ranges: Vec<i64> = specs.iter().map(|s| s.max_time - s.min_time).collect();
        assert_eq!(ranges, vec![2 * DAY_MS, 14 * DAY_MS, 14 * DAY_MS]);
        assert_eq!(specs[1].compaction.level, 4);
        assert_eq!(specs[0].series_count(), 100);
    }

    #[test]
    fn test_counters_profile() {
        let specs = collect(Profile::Counters1dSmall, DAY_MS);
        assert_eq!(specs.len(), 12);
        assert!(specs
            .iter()
            .flat_map(|b| b.series.iter())
            .all(|s| s.kind == GenType::Counter));
        assert_eq!(specs[0].series_count(), 20 * 50 * 5);
    }

    #[test]
    fn test_external_labels_and_stream_round_trip() {
        let labels = Labels::parse_flags(&["cluster=\"eu-1\""]).unwrap();
        let mut stream = String::new();
        plan(Profile::Tiny, 4 * HOUR_MS, &labels, |spec| {
            stream.push_str(&to_stream_document(&spec)?);
            Ok(())
        })
        .unwrap();

        let decoded: Vec<BlockSpec> = BlockSpecStream::new(stream.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].external_labels().get("cluster"), Some("eu-1"));

        let mut expected = collect(Profile::Tiny, 4 * HOUR_MS).remove(0);
        expected.thanos.labels = labels;
        assert_eq!(decoded[0], expected);
    }

    #[test]
    fn test_emit_error_stops_plan() {
        let mut calls = 0;
        let result = plan(Profile::Counters1dSmall, DAY_MS, &Labels::new(), |_| {
            calls += 1;
            anyhow::bail!("stdout closed")
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_parse_max_time() {
        let now = Utc.with_ymd_and_hms(2019, 10, 18, 1, 0, 0).unwrap();
        assert_eq!(
            parse_time_or_duration("30m", now).unwrap(),
            now.timestamp_millis() - 30 * 60 * 1000
        );
        assert_eq!(
            parse_time_or_duration("2019-10-18T00:00:00Z", now).unwrap(),
            now.timestamp_millis() - HOUR_MS
        );
        assert!(parse_time_or_duration("yesterday", now).is_err());
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Profile::Tiny.name(), "tiny");
        assert_eq!(Profile::Continuous1wSmall.name(), "continuous-1w-small");
        assert_eq!(
            Profile::from_str("counters-1d-small", false).unwrap(),
            Profile::Counters1dSmall
        );
    }
}
