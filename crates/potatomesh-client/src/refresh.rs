//! One refresh cycle: fetch every feed at once, rebuild everything.
//!
//! Nothing survives from the previous cycle. The node list and the primary
//! message fetch are required; any other feed may fail and is then treated
//! as empty.

use chrono::{DateTime, Utc};
use potatomesh_core::builder::{build_network, build_node, history_windows, FeedBundle, NodeHistory};
use potatomesh_core::config::MeshConfig;
use potatomesh_core::identity::{IdentityIndex, NodeRef};
use potatomesh_core::node::NodeAggregate;
use potatomesh_core::records::{parse_records, MessageRecord};
use potatomesh_graph::{
    best_links, map_lines, network_segments, sort_map_lines, MapLine, NeighborLink, TraceSegment,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chat::{ChatEntry, ChatHydrator};
use crate::error::{ClientError, Result};
use crate::source::{Feed, FeedQuery, FeedSource};

/// Immutable view of the mesh for one cycle.
#[derive(Debug, Clone)]
pub struct MeshSnapshot {
    pub generated_at: DateTime<Utc>,
    pub index: IdentityIndex<NodeAggregate>,
    pub links: Vec<NeighborLink>,
    pub map_lines: Vec<MapLine>,
    pub trace_segments: Vec<TraceSegment>,
    pub messages: Vec<ChatEntry>,
    pub history: Vec<NodeHistory>,
    /// Optional feeds that failed this cycle
    pub degraded: Vec<Feed>,
    feeds: FeedBundle,
}

impl MeshSnapshot {
    pub fn nodes(&self) -> &[NodeAggregate] {
        self.index.entries()
    }

    pub fn node(&self, reference: &NodeRef) -> Option<&NodeAggregate> {
        self.index.resolve(reference)
    }

    /// Full per-node rebuild from this cycle's feeds, including neighbor and
    /// trace provenance.
    pub fn detail(&self, reference: &NodeRef) -> NodeAggregate {
        build_node(reference, &self.feeds)
    }

    pub fn feeds(&self) -> &FeedBundle {
        &self.feeds
    }
}

pub struct RefreshCycle {
    source: Arc<dyn FeedSource>,
    chat: ChatHydrator,
    config: MeshConfig,
}

impl RefreshCycle {
    pub fn new(source: Arc<dyn FeedSource>, config: MeshConfig) -> Self {
        Self {
            chat: ChatHydrator::new(Arc::clone(&source)),
            source,
            config,
        }
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    async fn optional(&self, feed: Feed, query: FeedQuery, enabled: bool) -> Option<Vec<Value>> {
        if !enabled {
            return Some(Vec::new());
        }
        match self.source.fetch(feed, &query).await {
            Ok(items) => Some(items),
            Err(e) => {
                warn!("{} feed unavailable, continuing without it: {}", feed, e);
                None
            }
        }
    }

    pub async fn run(&self) -> Result<MeshSnapshot> {
        let limits = &self.config.limits;
        let refresh = &self.config.refresh;

        let node_query = FeedQuery::list(limits.nodes).with_history(refresh.node_history);
        let message_query = FeedQuery::list(limits.messages);

        let (nodes, messages, encrypted, telemetry, positions, neighbors, traces) = tokio::join!(
            self.source.fetch(Feed::Nodes, &node_query),
            self.source.fetch(Feed::Messages, &message_query),
            self.optional(
                Feed::Messages,
                FeedQuery::list(limits.messages).with_encrypted(true),
                refresh.include_encrypted,
            ),
            self.optional(Feed::Telemetry, FeedQuery::list(limits.telemetry), true),
            self.optional(Feed::Positions, FeedQuery::list(limits.positions), true),
            self.optional(Feed::Neighbors, FeedQuery::list(limits.neighbors), true),
            self.optional(Feed::Traces, FeedQuery::list(limits.traces), refresh.include_traces),
        );

        let nodes = nodes.map_err(|e| ClientError::feed(Feed::Nodes, e))?;
        let messages = messages.map_err(|e| ClientError::feed(Feed::Messages, e))?;

        let mut degraded = Vec::new();
        let mut settle = |feed: Feed, items: Option<Vec<Value>>| {
            items.unwrap_or_else(|| {
                if !degraded.contains(&feed) {
                    degraded.push(feed);
                }
                Vec::new()
            })
        };
        let encrypted = settle(Feed::Messages, encrypted);
        let telemetry = settle(Feed::Telemetry, telemetry);
        let positions = settle(Feed::Positions, positions);
        let neighbors = settle(Feed::Neighbors, neighbors);
        let traces = settle(Feed::Traces, traces);

        let feeds = FeedBundle::from_values(&nodes, &telemetry, &positions, &neighbors, &traces);
        let index = IdentityIndex::build(build_network(&feeds));

        let links = best_links(&feeds.neighbors);
        let mut lines = map_lines(&feeds.neighbors, &index);
        sort_map_lines(&mut lines);
        let trace_segments = network_segments(&feeds.traces, &index);
        let history = history_windows(&feeds, refresh.snapshot_depth);

        let messages = merge_messages(parse_records(&messages), parse_records(&encrypted));
        let messages = self.chat.hydrate(messages, &index).await;

        info!(
            nodes = index.len(),
            links = links.len(),
            map_lines = lines.len(),
            trace_segments = trace_segments.len(),
            messages = messages.len(),
            degraded = degraded.len(),
            "Refresh cycle complete"
        );

        Ok(MeshSnapshot {
            generated_at: Utc::now(),
            index,
            links,
            map_lines: lines,
            trace_segments,
            messages,
            history,
            degraded,
            feeds,
        })
    }
}

/// Plain and encrypted messages, newest first, each id once.
fn merge_messages(plain: Vec<MessageRecord>, encrypted: Vec<MessageRecord>) -> Vec<MessageRecord> {
    let mut seen: HashSet<i64> = HashSet::new();
    let mut merged: Vec<MessageRecord> = plain
        .into_iter()
        .chain(encrypted)
        .filter(|m| m.id.map_or(true, |id| seen.insert(id)))
        .collect();
    merged.sort_by(|a, b| b.rx_time.cmp(&a.rx_time));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use potatomesh_core::builder::DEFAULT_ROLE;
    use serde_json::json;

    fn msg(id: i64, rx: i64, encrypted: bool) -> MessageRecord {
        MessageRecord {
            id: Some(id),
            rx_time: Some(rx),
            encrypted,
            ..Default::default()
        }
    }

    #[test]
    fn merged_messages_are_unique_and_newest_first() {
        let merged = merge_messages(
            vec![msg(1, 10, false), msg(2, 30, false)],
            vec![msg(2, 30, true), msg(3, 20, true)],
        );
        let ids: Vec<_> = merged.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![Some(2), Some(3), Some(1)]);
        assert!(!merged[0].encrypted);
    }

    #[tokio::test]
    async fn detail_ignores_keyless_list_rows() {
        let source = MemorySource::new()
            .with_feed(
                Feed::Nodes,
                vec![
                    json!({"node_id": "!aa", "short_name": "AA", "last_heard": 10}),
                    json!({"short_name": "GHOST", "role": "ROUTER", "last_heard": 99}),
                ],
            )
            .with_feed(Feed::Telemetry, vec![json!({"rx_time": 500, "battery_level": 3})]);
        let cycle = RefreshCycle::new(Arc::new(source), MeshConfig::default());
        let snapshot = cycle.run().await.unwrap();

        let aa = snapshot.detail(&NodeRef::ById("!aa".into()));
        assert_eq!(aa.short_name.as_deref(), Some("AA"));
        assert_eq!(aa.role.as_deref(), Some(DEFAULT_ROLE));
        assert_eq!(aa.last_heard, Some(10));
        assert_eq!(aa.battery_level(), None);

        let bb = snapshot.detail(&NodeRef::ById("!bb".into()));
        assert_ne!(bb.short_name.as_deref(), Some("GHOST"));
        assert_eq!(bb.battery_level(), None);
    }
}
