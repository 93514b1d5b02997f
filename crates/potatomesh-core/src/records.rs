//! Typed views over raw feed items.
//!
//! Each record is built from a canonicalized object (see [`crate::alias`]) and
//! keeps the untouched raw JSON for provenance.

use serde_json::{Map, Value};
use tracing::debug;

use crate::alias::canonical_object;
use crate::coerce;
use crate::identity::{snapshot_key, HopRef};
use crate::node::{PositionBlock, TelemetryBlock};

/// A feed item that maps onto exactly one typed record.
pub trait FeedRecord: Sized {
    const FEED: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

/// Parse every item of a feed, skipping the ones that are not objects.
pub fn parse_records<T: FeedRecord>(values: &[Value]) -> Vec<T> {
    let records: Vec<T> = values.iter().filter_map(T::from_value).collect();
    if records.len() != values.len() {
        debug!(
            "Skipped {} malformed {} records",
            values.len() - records.len(),
            T::FEED
        );
    }
    records
}

/// Timestamp and its ISO companion, read as a pair.
fn paired_time(map: &Map<String, Value>, time_key: &str, iso_key: &str) -> (Option<i64>, Option<String>) {
    let time = coerce::integer_field(map, time_key);
    let iso = time.and_then(|_| coerce::string_field(map, iso_key));
    (time, iso)
}

/// Node metadata as served by `/api/nodes`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeRecord {
    pub node_id: Option<String>,
    pub node_num: Option<u64>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub role: Option<String>,
    pub hw_model: Option<String>,
    pub modem_preset: Option<String>,
    pub lora_freq: Option<f64>,
    pub first_heard: Option<i64>,
    pub last_heard: Option<i64>,
    pub last_seen_iso: Option<String>,
    pub snr: Option<f64>,
    pub hops_away: Option<i64>,
    pub public_key: Option<String>,
    pub telemetry: TelemetryBlock,
    pub position: PositionBlock,
    pub raw: Value,
}

impl NodeRecord {
    pub fn snapshot_key(&self) -> Option<String> {
        snapshot_key(self.node_id.as_deref(), self.node_num)
    }
}

impl FeedRecord for NodeRecord {
    const FEED: &'static str = "nodes";

    fn from_value(value: &Value) -> Option<Self> {
        let map = canonical_object(value)?;
        let (last_heard, last_seen_iso) = paired_time(&map, "last_heard", "last_seen_iso");
        let (telemetry_time, telemetry_iso) = paired_time(&map, "telemetry_time", "telemetry_iso");
        let (position_time, position_iso) = paired_time(&map, "position_time", "position_iso");

        Some(Self {
            node_id: coerce::string_field(&map, "node_id"),
            node_num: coerce::unsigned_field(&map, "node_num"),
            short_name: coerce::string_field(&map, "short_name"),
            long_name: coerce::string_field(&map, "long_name"),
            role: coerce::string_field(&map, "role"),
            hw_model: coerce::string_field(&map, "hw_model"),
            modem_preset: coerce::string_field(&map, "modem_preset"),
            lora_freq: coerce::number_field(&map, "lora_freq"),
            first_heard: coerce::integer_field(&map, "first_heard"),
            last_heard,
            last_seen_iso,
            snr: coerce::number_field(&map, "snr"),
            hops_away: coerce::integer_field(&map, "hops_away"),
            public_key: coerce::string_field(&map, "public_key"),
            telemetry: TelemetryBlock {
                time: telemetry_time,
                iso: telemetry_iso,
                metrics: TelemetryBlock::read_metrics(&map),
            },
            position: PositionBlock::read_fields(&map, position_time, position_iso),
            raw: value.clone(),
        })
    }
}

fn subject_id(map: &Map<String, Value>) -> Option<String> {
    coerce::string_field(map, "node_id").or_else(|| coerce::string_field(map, "from_id"))
}

/// One reading from `/api/telemetry`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub node_id: Option<String>,
    pub node_num: Option<u64>,
    pub rx_time: Option<i64>,
    pub rx_iso: Option<String>,
    /// Timed by `telemetry_time`, or by `rx_time` when the device sent none.
    pub reading: TelemetryBlock,
    pub raw: Value,
}

impl TelemetrySnapshot {
    pub fn snapshot_key(&self) -> Option<String> {
        snapshot_key(self.node_id.as_deref(), self.node_num)
    }

    /// Ordering timestamp within a snapshot group.
    pub fn observed_at(&self) -> Option<f64> {
        self.rx_time.or(self.reading.time).map(|t| t as f64)
    }
}

impl FeedRecord for TelemetrySnapshot {
    const FEED: &'static str = "telemetry";

    fn from_value(value: &Value) -> Option<Self> {
        let map = canonical_object(value)?;
        let (rx_time, rx_iso) = paired_time(&map, "rx_time", "rx_iso");
        let (telemetry_time, telemetry_iso) = paired_time(&map, "telemetry_time", "telemetry_iso");
        let (time, iso) = match telemetry_time {
            Some(_) => (telemetry_time, telemetry_iso),
            None => (rx_time, rx_iso.clone()),
        };

        Some(Self {
            node_id: subject_id(&map),
            node_num: coerce::unsigned_field(&map, "node_num"),
            rx_time,
            rx_iso,
            reading: TelemetryBlock {
                time,
                iso,
                metrics: TelemetryBlock::read_metrics(&map),
            },
            raw: value.clone(),
        })
    }
}

/// One fix from `/api/positions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionSnapshot {
    pub node_id: Option<String>,
    pub node_num: Option<u64>,
    pub rx_time: Option<i64>,
    pub rx_iso: Option<String>,
    /// Timed by `position_time`, or by `rx_time` when the device sent none.
    pub fix: PositionBlock,
    pub raw: Value,
}

impl PositionSnapshot {
    pub fn snapshot_key(&self) -> Option<String> {
        snapshot_key(self.node_id.as_deref(), self.node_num)
    }

    pub fn observed_at(&self) -> Option<f64> {
        self.rx_time.or(self.fix.time).map(|t| t as f64)
    }
}

impl FeedRecord for PositionSnapshot {
    const FEED: &'static str = "positions";

    fn from_value(value: &Value) -> Option<Self> {
        let map = canonical_object(value)?;
        let (rx_time, rx_iso) = paired_time(&map, "rx_time", "rx_iso");
        let (position_time, position_iso) = paired_time(&map, "position_time", "position_iso");
        let (time, iso) = match position_time {
            Some(_) => (position_time, position_iso),
            None => (rx_time, rx_iso.clone()),
        };

        Some(Self {
            node_id: subject_id(&map),
            node_num: coerce::unsigned_field(&map, "node_num"),
            rx_time,
            rx_iso,
            fix: PositionBlock::read_fields(&map, time, iso),
            raw: value.clone(),
        })
    }
}

/// "`node` heard `neighbor`". Directed: A→B and B→A are different edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborEdge {
    pub node_id: Option<String>,
    pub node_num: Option<u64>,
    pub neighbor_id: Option<String>,
    pub neighbor_num: Option<u64>,
    pub snr: Option<f64>,
    pub rx_time: Option<i64>,
    pub rx_iso: Option<String>,
    pub raw: Value,
}

impl NeighborEdge {
    /// Flatten a neighbor feed. Rows are either flat edges or a reporting node
    /// with a nested `neighbors` list; nested entries inherit the parent's
    /// `rx_time` when they carry none.
    pub fn from_feed(values: &[Value]) -> Vec<NeighborEdge> {
        let mut edges = Vec::new();
        for value in values {
            let Some(map) = canonical_object(value) else {
                continue;
            };
            let node_id = coerce::string_field(&map, "node_id");
            let node_num = coerce::unsigned_field(&map, "node_num");
            let (parent_rx, parent_iso) = paired_time(&map, "rx_time", "rx_iso");

            match map.get("neighbors") {
                Some(Value::Array(entries)) => {
                    for entry in entries {
                        let Some(entry_map) = canonical_object(entry) else {
                            continue;
                        };
                        let (rx_time, rx_iso) = match paired_time(&entry_map, "rx_time", "rx_iso") {
                            (Some(t), iso) => (Some(t), iso),
                            (None, _) => (parent_rx, parent_iso.clone()),
                        };
                        edges.push(NeighborEdge {
                            node_id: node_id.clone(),
                            node_num,
                            neighbor_id: coerce::string_field(&entry_map, "neighbor_id")
                                .or_else(|| coerce::string_field(&entry_map, "node_id")),
                            neighbor_num: coerce::unsigned_field(&entry_map, "neighbor_num"),
                            snr: coerce::number_field(&entry_map, "snr"),
                            rx_time,
                            rx_iso,
                            raw: entry.clone(),
                        });
                    }
                }
                _ => edges.push(NeighborEdge {
                    node_id,
                    node_num,
                    neighbor_id: coerce::string_field(&map, "neighbor_id"),
                    neighbor_num: coerce::unsigned_field(&map, "neighbor_num"),
                    snr: coerce::number_field(&map, "snr"),
                    rx_time: parent_rx,
                    rx_iso: parent_iso,
                    raw: value.clone(),
                }),
            }
        }
        edges.retain(|edge| edge.neighbor_id.is_some() || edge.neighbor_num.is_some());
        edges
    }

    pub fn involves(&self, key: &str) -> bool {
        let matches = |id: &Option<String>, num: Option<u64>| {
            snapshot_key(id.as_deref(), num).as_deref() == Some(key)
        };
        matches(&self.node_id, self.node_num) || matches(&self.neighbor_id, self.neighbor_num)
    }
}

/// One traceroute observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceRecord {
    pub id: Option<i64>,
    pub request_id: Option<i64>,
    pub src: Option<HopRef>,
    pub dest: Option<HopRef>,
    /// Intermediate hops in order. `None` marks an entry that could not be
    /// read and therefore breaks the path.
    pub hops: Vec<Option<HopRef>>,
    pub rx_time: Option<i64>,
    pub rx_iso: Option<String>,
    pub raw: Value,
}

impl TraceRecord {
    /// `[src, hop1, …, dest]`, without repeating an endpoint that the hop
    /// list already includes.
    pub fn path(&self) -> Vec<Option<HopRef>> {
        let mut path = Vec::with_capacity(self.hops.len() + 2);
        if let Some(src) = &self.src {
            path.push(Some(src.clone()));
        }
        path.extend(self.hops.iter().cloned());
        if let Some(dest) = &self.dest {
            path.push(Some(dest.clone()));
        }
        path.dedup_by(|a, b| a.is_some() && a == b);
        path
    }

    pub fn involves(&self, hop: &HopRef) -> bool {
        self.path().iter().any(|h| h.as_ref() == Some(hop))
    }
}

impl FeedRecord for TraceRecord {
    const FEED: &'static str = "traces";

    fn from_value(value: &Value) -> Option<Self> {
        let map = canonical_object(value)?;
        let (rx_time, rx_iso) = paired_time(&map, "rx_time", "rx_iso");
        let hops = match map.get("hops") {
            Some(Value::Array(items)) => items.iter().map(HopRef::from_value).collect(),
            _ => Vec::new(),
        };

        Some(Self {
            id: coerce::integer_field(&map, "id"),
            request_id: coerce::integer_field(&map, "request_id"),
            src: coerce::field(&map, "src").and_then(HopRef::from_value),
            dest: coerce::field(&map, "dest").and_then(HopRef::from_value),
            hops,
            rx_time,
            rx_iso,
            raw: value.clone(),
        })
    }
}

/// One chat message from `/api/messages`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageRecord {
    pub id: Option<i64>,
    pub rx_time: Option<i64>,
    pub rx_iso: Option<String>,
    pub from_id: Option<String>,
    pub to_id: Option<String>,
    pub channel: Option<i64>,
    pub channel_name: Option<String>,
    pub portnum: Option<String>,
    pub text: Option<String>,
    pub encrypted: bool,
    pub ciphertext: Option<String>,
    pub snr: Option<f64>,
    pub rssi: Option<i64>,
    pub hop_limit: Option<i64>,
    pub lora_freq: Option<f64>,
    pub modem_preset: Option<String>,
    pub reply_id: Option<i64>,
    pub node_id: Option<String>,
    pub raw: Value,
}

impl FeedRecord for MessageRecord {
    const FEED: &'static str = "messages";

    fn from_value(value: &Value) -> Option<Self> {
        let map = canonical_object(value)?;
        let (rx_time, rx_iso) = paired_time(&map, "rx_time", "rx_iso");
        let ciphertext = coerce::field(&map, "encrypted")
            .filter(|v| v.is_string())
            .and_then(coerce::trimmed_string);
        let encrypted = ciphertext.is_some() || coerce::bool_field(&map, "encrypted").unwrap_or(false);

        Some(Self {
            id: coerce::integer_field(&map, "id"),
            rx_time,
            rx_iso,
            from_id: coerce::string_field(&map, "from_id"),
            to_id: coerce::string_field(&map, "to_id"),
            channel: coerce::integer_field(&map, "channel"),
            channel_name: coerce::string_field(&map, "channel_name"),
            portnum: coerce::string_field(&map, "portnum"),
            text: coerce::field(&map, "text").and_then(|v| v.as_str()).map(str::to_string),
            encrypted,
            ciphertext,
            snr: coerce::number_field(&map, "snr"),
            rssi: coerce::integer_field(&map, "rssi"),
            hop_limit: coerce::integer_field(&map, "hop_limit"),
            lora_freq: coerce::number_field(&map, "lora_freq"),
            modem_preset: coerce::string_field(&map, "modem_preset"),
            reply_id: coerce::integer_field(&map, "reply_id"),
            node_id: coerce::string_field(&map, "node_id"),
            raw: value.clone(),
        })
    }
}
