//! Group per-node observations by key and keep the most recent ones.
//!
//! The same primitive serves two modes: latest-only (`depth = 1`) for the
//! live dashboard state, and a bounded window for time-series charts.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Default window depth for per-node history.
pub const SNAPSHOT_DEPTH: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateMode {
    LatestOnly,
    Windowed(usize),
}

impl AggregateMode {
    pub fn depth(&self) -> usize {
        match self {
            AggregateMode::LatestOnly => 1,
            AggregateMode::Windowed(depth) => (*depth).max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOptions {
    pub depth: usize,
    /// Key for records that carry none of their own. `None` drops them.
    pub default_key: Option<String>,
}

impl AggregateOptions {
    pub fn new(mode: AggregateMode) -> Self {
        Self {
            depth: mode.depth(),
            default_key: None,
        }
    }

    pub fn latest_only() -> Self {
        Self::new(AggregateMode::LatestOnly)
    }

    pub fn windowed(depth: usize) -> Self {
        Self::new(AggregateMode::Windowed(depth))
    }

    pub fn with_default_key(mut self, key: Option<String>) -> Self {
        self.default_key = key;
        self
    }
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self::latest_only()
    }
}

/// One key and its most recent records, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotGroup<R> {
    pub key: String,
    pub series: Vec<R>,
}

impl<R> SnapshotGroup<R> {
    pub fn latest(&self) -> Option<&R> {
        self.series.first()
    }
}

pub(crate) fn sort_value(timestamp: Option<f64>) -> f64 {
    timestamp
        .filter(|t| !t.is_nan())
        .unwrap_or(f64::NEG_INFINITY)
}

/// Group `records` by `key_fn`, order each group by `timestamp_fn` descending
/// and keep at most `options.depth` entries per group.
///
/// Records without a timestamp sort last; equal timestamps keep input order.
/// Groups are returned in the order their key was first seen.
pub fn aggregate<R, K, T>(
    records: impl IntoIterator<Item = R>,
    key_fn: K,
    timestamp_fn: T,
    options: &AggregateOptions,
) -> Vec<SnapshotGroup<R>>
where
    K: Fn(&R) -> Option<String>,
    T: Fn(&R) -> Option<f64>,
{
    let depth = options.depth.max(1);
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<(String, Vec<(f64, R)>)> = Vec::new();

    for record in records {
        let Some(key) = key_fn(&record).or_else(|| options.default_key.clone()) else {
            continue;
        };
        let timestamp = sort_value(timestamp_fn(&record));
        let slot = *slots.entry(key.clone()).or_insert_with(|| {
            buckets.push((key, Vec::new()));
            buckets.len() - 1
        });
        buckets[slot].1.push((timestamp, record));
    }

    buckets
        .into_iter()
        .map(|(key, mut entries)| {
            // stable: ties keep input order
            entries.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
            entries.truncate(depth);
            SnapshotGroup {
                key,
                series: entries.into_iter().map(|(_, record)| record).collect(),
            }
        })
        .collect()
}

/// Latest-only aggregation flattened into a key → record map.
pub fn latest_by_key<R, K, T>(
    records: impl IntoIterator<Item = R>,
    key_fn: K,
    timestamp_fn: T,
) -> HashMap<String, R>
where
    K: Fn(&R) -> Option<String>,
    T: Fn(&R) -> Option<f64>,
{
    aggregate(records, key_fn, timestamp_fn, &AggregateOptions::latest_only())
        .into_iter()
        .filter_map(|group| {
            let key = group.key;
            group.series.into_iter().next().map(|record| (key, record))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Obs {
        key: Option<&'static str>,
        ts: Option<f64>,
        value: i32,
    }

    fn obs(key: Option<&'static str>, ts: Option<f64>, value: i32) -> Obs {
        Obs { key, ts, value }
    }

    fn run(records: Vec<Obs>, options: &AggregateOptions) -> Vec<SnapshotGroup<Obs>> {
        aggregate(records, |o| o.key.map(str::to_string), |o| o.ts, options)
    }

    #[test]
    fn latest_only_keeps_most_recent() {
        let groups = run(
            vec![obs(Some("a"), Some(100.0), 50), obs(Some("a"), Some(200.0), 40)],
            &AggregateOptions::latest_only(),
        );
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].series.len(), 1);
        assert_eq!(groups[0].latest().unwrap().value, 40);
    }

    #[test]
    fn window_is_bounded_and_ordered_with_stable_ties() {
        let records = vec![
            obs(Some("a"), Some(1.0), 1),
            obs(Some("a"), Some(5.0), 2),
            obs(Some("a"), None, 3),
            obs(Some("a"), Some(5.0), 4),
            obs(Some("a"), Some(3.0), 5),
        ];
        let groups = run(records, &AggregateOptions::windowed(3));
        let values: Vec<i32> = groups[0].series.iter().map(|o| o.value).collect();
        assert_eq!(values, vec![2, 4, 5]);
    }

    #[test]
    fn missing_timestamps_sort_last() {
        let records = vec![obs(Some("a"), None, 1), obs(Some("a"), Some(-1e9), 2)];
        let groups = run(records, &AggregateOptions::windowed(5));
        let values: Vec<i32> = groups[0].series.iter().map(|o| o.value).collect();
        assert_eq!(values, vec![2, 1]);
    }

    #[test]
    fn keyless_records_use_default_or_are_dropped() {
        let records = vec![obs(None, Some(1.0), 1), obs(Some("b"), Some(1.0), 2)];
        let dropped = run(records.clone(), &AggregateOptions::latest_only());
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].key, "b");

        let options = AggregateOptions::latest_only().with_default_key(Some("fallback".into()));
        let kept = run(records, &options);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].key, "fallback");
    }

    #[test]
    fn groups_follow_first_seen_order() {
        let records = vec![
            obs(Some("z"), Some(1.0), 1),
            obs(Some("a"), Some(1.0), 2),
            obs(Some("z"), Some(2.0), 3),
        ];
        let keys: Vec<String> = run(records, &AggregateOptions::latest_only())
            .into_iter()
            .map(|g| g.key)
            .collect();
        assert_eq!(keys, vec!["z".to_string(), "a".to_string()]);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let records = vec![
            obs(Some("a"), Some(3.0), 1),
            obs(Some("b"), Some(2.0), 2),
            obs(Some("a"), Some(9.0), 3),
        ];
        let options = AggregateOptions::windowed(2);
        assert_eq!(run(records.clone(), &options), run(records, &options));
    }

    #[test]
    fn zero_depth_is_treated_as_latest_only() {
        assert_eq!(AggregateMode::Windowed(0).depth(), 1);
        let records = vec![obs(Some("a"), Some(1.0), 1), obs(Some("a"), Some(2.0), 2)];
        let options = AggregateOptions {
            depth: 0,
            default_key: None,
        };
        assert_eq!(run(records, &options)[0].series.len(), 1);
    }

    #[test]
    fn latest_by_key_flattens_groups() {
        let map = latest_by_key(
            vec![obs(Some("a"), Some(1.0), 1), obs(Some("a"), Some(2.0), 2)],
            |o| o.key.map(str::to_string),
            |o| o.ts,
        );
        assert_eq!(map["a"].value, 2);
    }
}
