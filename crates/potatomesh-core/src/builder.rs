//! Cross-source node reconstruction.
//!
//! Every feed is aggregated on its own, then folded into one
//! [`NodeAggregate`] in a fixed order: fallback hint, node metadata,
//! reference overrides, telemetry, position. Nothing here fetches; callers
//! hand in whatever the feeds returned, and a feed that failed is simply an
//! empty list.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::identity::{node_num_from_id, snapshot_key, HopRef, NodeRef};
use crate::merge;
use crate::naming;
use crate::node::NodeAggregate;
use crate::records::{
    parse_records, NeighborEdge, NodeRecord, PositionSnapshot, TelemetrySnapshot, TraceRecord,
};
use crate::snapshot::{aggregate, latest_by_key, sort_value, AggregateOptions};

/// Role assumed for nodes that never reported one.
pub const DEFAULT_ROLE: &str = "CLIENT";

/// Parsed contents of every node-related feed for one refresh.
#[derive(Debug, Clone, Default)]
pub struct FeedBundle {
    pub nodes: Vec<NodeRecord>,
    pub telemetry: Vec<TelemetrySnapshot>,
    pub positions: Vec<PositionSnapshot>,
    pub neighbors: Vec<NeighborEdge>,
    pub traces: Vec<TraceRecord>,
    /// Set when every feed came from a per-node endpoint. Only then are rows
    /// without an identifier attributed to the node being built; list feeds
    /// drop them.
    pub per_node: bool,
}

impl FeedBundle {
    pub fn from_values(
        nodes: &[Value],
        telemetry: &[Value],
        positions: &[Value],
        neighbors: &[Value],
        traces: &[Value],
    ) -> Self {
        Self {
            nodes: parse_records(nodes),
            telemetry: parse_records(telemetry),
            positions: parse_records(positions),
            neighbors: NeighborEdge::from_feed(neighbors),
            traces: parse_records(traces),
            per_node: false,
        }
    }

    /// Mark the bundle as the answer of per-node endpoints.
    pub fn from_node_endpoints(mut self) -> Self {
        self.per_node = true;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.telemetry.is_empty()
            && self.positions.is_empty()
            && self.neighbors.is_empty()
            && self.traces.is_empty()
    }
}

/// Windowed telemetry and position series for one node, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeHistory {
    pub key: String,
    pub telemetry: Vec<TelemetrySnapshot>,
    pub positions: Vec<PositionSnapshot>,
}

fn node_time(record: &NodeRecord) -> Option<f64> {
    record.last_heard.map(|t| t as f64)
}

/// Every grouping key a node may appear under in the feeds.
fn identity_keys(node_id: Option<&str>, node_num: Option<u64>) -> Vec<String> {
    let mut keys = Vec::new();
    let derived = node_id
        .filter(|id| id.trim().starts_with('!'))
        .and_then(node_num_from_id);
    for key in [
        snapshot_key(node_id, None),
        snapshot_key(None, node_num),
        snapshot_key(None, derived),
    ]
    .into_iter()
    .flatten()
    {
        push_key(&mut keys, key);
    }
    keys
}

fn push_key(keys: &mut Vec<String>, key: String) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}

fn hop_key(hop: &HopRef) -> Option<String> {
    match hop {
        HopRef::Id(id) => snapshot_key(Some(id), None),
        HopRef::Num(num) => snapshot_key(None, Some(*num)),
    }
}

/// Latest record among the groups whose key is one of `keys`. Keyless
/// records are attributed to the first key when `claim_keyless` is set and
/// dropped otherwise.
fn select_latest<'a, R, K, T>(
    records: &'a [R],
    key_fn: K,
    timestamp_fn: T,
    keys: &[String],
    claim_keyless: bool,
) -> Option<&'a R>
where
    K: Fn(&R) -> Option<String>,
    T: Fn(&R) -> Option<f64>,
{
    let default_key = if claim_keyless {
        keys.first().cloned()
    } else {
        None
    };
    let options = AggregateOptions::latest_only().with_default_key(default_key);
    let mut best: Option<&'a R> = None;
    for group in aggregate(
        records.iter(),
        |r: &&'a R| key_fn(*r),
        |r: &&'a R| timestamp_fn(*r),
        &options,
    ) {
        if !keys.contains(&group.key) {
            continue;
        }
        let Some(candidate) = group.series.into_iter().next() else {
            continue;
        };
        let newer = best.map_or(true, |current| {
            sort_value(timestamp_fn(candidate)) > sort_value(timestamp_fn(current))
        });
        if newer {
            best = Some(candidate);
        }
    }
    best
}

fn finalize(node: &mut NodeAggregate) {
    merge::derive_last_heard(node);
    if node.role.as_deref().map_or(true, |r| r.trim().is_empty()) {
        node.role = Some(DEFAULT_ROLE.to_string());
    }
    naming::synthesize_names(node);
}

/// Reconstruct one node from the feeds.
///
/// Records are matched to the node strictly by their uppercased grouping
/// key. Records without any identifier are attributed to `reference` only
/// when `feeds` came from per-node endpoints (see [`FeedBundle::per_node`]),
/// which may omit the identifier.
pub fn build_node(reference: &NodeRef, feeds: &FeedBundle) -> NodeAggregate {
    let mut keys = identity_keys(reference.node_id(), reference.node_num());
    let mut node = NodeAggregate::default();

    if let Some(fallback) = reference.fallback() {
        merge::merge_record(&mut node, fallback);
        node.raw_sources.fallback = Some(fallback.raw.clone());
    }

    if let Some(record) = select_latest(
        &feeds.nodes,
        NodeRecord::snapshot_key,
        node_time,
        &keys,
        feeds.per_node,
    ) {
        merge::merge_record(&mut node, record);
        node.raw_sources.node = Some(record.raw.clone());
        for key in identity_keys(record.node_id.as_deref(), record.node_num) {
            push_key(&mut keys, key);
        }
    }

    merge::merge_reference(&mut node, reference);

    if let Some(snapshot) = select_latest(
        &feeds.telemetry,
        TelemetrySnapshot::snapshot_key,
        TelemetrySnapshot::observed_at,
        &keys,
        feeds.per_node,
    ) {
        merge::merge_telemetry(&mut node.telemetry, &snapshot.reading);
        node.raw_sources.telemetry = Some(snapshot.raw.clone());
    }

    if let Some(snapshot) = select_latest(
        &feeds.positions,
        PositionSnapshot::snapshot_key,
        PositionSnapshot::observed_at,
        &keys,
        feeds.per_node,
    ) {
        merge::merge_position(&mut node.position, &snapshot.fix);
        node.raw_sources.position = Some(snapshot.raw.clone());
    }

    finalize(&mut node);

    node.raw_sources.neighbors = feeds
        .neighbors
        .iter()
        .filter(|edge| keys.iter().any(|key| edge.involves(key)))
        .map(|edge| edge.raw.clone())
        .collect();
    node.raw_sources.traces = feeds
        .traces
        .iter()
        .filter(|trace| {
            trace
                .path()
                .iter()
                .flatten()
                .filter_map(hop_key)
                .any(|key| keys.contains(&key))
        })
        .map(|trace| trace.raw.clone())
        .collect();

    node
}

/// Reconstruct every node the node feed knows about.
///
/// One aggregate per grouping key, in first-seen order. Telemetry and
/// position come from the latest snapshot under any of the node's keys.
/// Neighbor and trace provenance is left to [`build_node`].
pub fn build_network(feeds: &FeedBundle) -> Vec<NodeAggregate> {
    let telemetry = latest_by_key(
        feeds.telemetry.iter(),
        |s: &&TelemetrySnapshot| s.snapshot_key(),
        |s: &&TelemetrySnapshot| s.observed_at(),
    );
    let positions = latest_by_key(
        feeds.positions.iter(),
        |s: &&PositionSnapshot| s.snapshot_key(),
        |s: &&PositionSnapshot| s.observed_at(),
    );

    aggregate(
        feeds.nodes.iter(),
        |r: &&NodeRecord| r.snapshot_key(),
        |r: &&NodeRecord| node_time(r),
        &AggregateOptions::latest_only(),
    )
    .into_iter()
    .filter_map(|group| group.series.into_iter().next())
    .map(|record| {
        let mut node = NodeAggregate::default();
        merge::merge_record(&mut node, record);
        node.raw_sources.node = Some(record.raw.clone());

        let keys = identity_keys(record.node_id.as_deref(), record.node_num);
        if let Some(snapshot) = keys.iter().find_map(|key| telemetry.get(key)) {
            merge::merge_telemetry(&mut node.telemetry, &snapshot.reading);
            node.raw_sources.telemetry = Some(snapshot.raw.clone());
        }
        if let Some(snapshot) = keys.iter().find_map(|key| positions.get(key)) {
            merge::merge_position(&mut node.position, &snapshot.fix);
            node.raw_sources.position = Some(snapshot.raw.clone());
        }

        finalize(&mut node);
        node
    })
    .collect()
}

/// Windowed history for one node, `depth` newest entries per feed. Keyless
/// rows count only for per-node bundles.
pub fn node_history(reference: &NodeRef, feeds: &FeedBundle, depth: usize) -> NodeHistory {
    let keys = identity_keys(reference.node_id(), reference.node_num());
    let key = keys.first().cloned().unwrap_or_default();
    let belongs =
        |candidate: Option<String>| candidate.map_or(feeds.per_node, |k| keys.contains(&k));
    let options = AggregateOptions::windowed(depth);

    let telemetry = aggregate(
        feeds
            .telemetry
            .iter()
            .filter(|s| belongs(s.snapshot_key()))
            .cloned(),
        |_| Some(key.clone()),
        TelemetrySnapshot::observed_at,
        &options,
    );
    let positions = aggregate(
        feeds
            .positions
            .iter()
            .filter(|s| belongs(s.snapshot_key()))
            .cloned(),
        |_| Some(key.clone()),
        PositionSnapshot::observed_at,
        &options,
    );

    NodeHistory {
        telemetry: telemetry.into_iter().flat_map(|g| g.series).collect(),
        positions: positions.into_iter().flat_map(|g| g.series).collect(),
        key,
    }
}

/// Windowed history for every node seen in the telemetry or position feeds,
/// ordered by key.
pub fn history_windows(feeds: &FeedBundle, depth: usize) -> Vec<NodeHistory> {
    let options = AggregateOptions::windowed(depth);
    let mut histories: BTreeMap<String, NodeHistory> = BTreeMap::new();

    for group in aggregate(
        feeds.telemetry.iter().cloned(),
        TelemetrySnapshot::snapshot_key,
        TelemetrySnapshot::observed_at,
        &options,
    ) {
        let entry = histories.entry(group.key.clone()).or_insert_with(|| NodeHistory {
            key: group.key.clone(),
            ..Default::default()
        });
        entry.telemetry = group.series;
    }

    for group in aggregate(
        feeds.positions.iter().cloned(),
        PositionSnapshot::snapshot_key,
        PositionSnapshot::observed_at,
        &options,
    ) {
        let entry = histories.entry(group.key.clone()).or_insert_with(|| NodeHistory {
            key: group.key.clone(),
            ..Default::default()
        });
        entry.positions = group.series;
    }

    histories.into_values().collect()
}

/// Lookup table from every key of a built node to its position in `nodes`.
pub fn key_lookup(nodes: &[NodeAggregate]) -> HashMap<String, usize> {
    let mut lookup = HashMap::new();
    for (slot, node) in nodes.iter().enumerate() {
        for key in identity_keys(node.node_id.as_deref(), node.node_num) {
            lookup.entry(key).or_insert(slot);
        }
    }
    lookup
}
