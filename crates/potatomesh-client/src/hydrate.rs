//! Per-node detail hydration: fetch every per-node feed concurrently and
//! rebuild the node from scratch.

use potatomesh_core::builder::{build_node, node_history, FeedBundle, NodeHistory};
use potatomesh_core::config::MeshConfig;
use potatomesh_core::identity::NodeRef;
use potatomesh_core::node::NodeAggregate;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::generation::RequestGenerations;
use crate::source::{Feed, FeedQuery, FeedSource};

/// Fetch a feed whose failure must not abort the caller. Errors are logged
/// and become an empty list.
pub(crate) async fn fetch_or_empty(
    source: &dyn FeedSource,
    feed: Feed,
    query: &FeedQuery,
) -> Vec<Value> {
    match source.fetch(feed, query).await {
        Ok(items) => items,
        Err(e) => {
            warn!("{} feed unavailable, continuing without it: {}", feed, e);
            Vec::new()
        }
    }
}

pub struct NodeHydrator {
    source: Arc<dyn FeedSource>,
    snapshot_depth: usize,
    include_traces: bool,
    limit: usize,
}

impl NodeHydrator {
    pub fn new(source: Arc<dyn FeedSource>, config: &MeshConfig) -> Self {
        Self {
            source,
            snapshot_depth: config.refresh.snapshot_depth,
            include_traces: config.refresh.include_traces,
            limit: config.limits.telemetry,
        }
    }

    /// Per-node feeds for `reference`. Every feed degrades independently.
    pub async fn fetch_bundle(&self, reference: &NodeRef) -> FeedBundle {
        let Some(node_id) = reference.lookup_id() else {
            return FeedBundle::default();
        };
        let source = self.source.as_ref();
        let node_query = FeedQuery::for_node(node_id.clone(), None);
        let query = FeedQuery::for_node(node_id, Some(self.limit));

        let traces = async {
            if self.include_traces {
                fetch_or_empty(source, Feed::Traces, &query).await
            } else {
                Vec::new()
            }
        };
        let (nodes, telemetry, positions, neighbors, traces) = tokio::join!(
            fetch_or_empty(source, Feed::Nodes, &node_query),
            fetch_or_empty(source, Feed::Telemetry, &query),
            fetch_or_empty(source, Feed::Positions, &query),
            fetch_or_empty(source, Feed::Neighbors, &query),
            traces,
        );

        debug!(
            node = %reference,
            nodes = nodes.len(),
            telemetry = telemetry.len(),
            positions = positions.len(),
            neighbors = neighbors.len(),
            traces = traces.len(),
            "Hydrating node"
        );
        FeedBundle::from_values(&nodes, &telemetry, &positions, &neighbors, &traces)
            .from_node_endpoints()
    }

    pub async fn hydrate(&self, reference: &NodeRef) -> NodeAggregate {
        let bundle = self.fetch_bundle(reference).await;
        build_node(reference, &bundle)
    }

    /// Hydrate on behalf of a UI `anchor`. The node reaches `apply` only if
    /// no newer request for the same anchor started while this one was in
    /// flight. Returns whether it was applied.
    pub async fn hydrate_for<F>(
        &self,
        generations: &RequestGenerations,
        anchor: &str,
        reference: &NodeRef,
        apply: F,
    ) -> bool
    where
        F: FnOnce(NodeAggregate),
    {
        let token = generations.begin(anchor);
        let node = self.hydrate(reference).await;
        generations.apply(&token, node, apply)
    }

    /// The node plus its windowed telemetry and position history.
    pub async fn hydrate_with_history(&self, reference: &NodeRef) -> (NodeAggregate, NodeHistory) {
        let bundle = self.fetch_bundle(reference).await;
        let node = build_node(reference, &bundle);
        let history = node_history(reference, &bundle, self.snapshot_depth);
        (node, history)
    }
}
