//! Chat entries with their sender's node attached.

use futures::future::join_all;
use potatomesh_core::builder::{build_node, FeedBundle};
use potatomesh_core::identity::{IdentityIndex, NodeRef};
use potatomesh_core::node::NodeAggregate;
use potatomesh_core::records::{parse_records, MessageRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::single_flight::{normalize_key, SingleFlight};
use crate::source::{Feed, FeedQuery, FeedSource};

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub message: MessageRecord,
    /// `None` for broadcast or anonymous senders
    pub sender: Option<NodeAggregate>,
}

/// Resolves message senders against the cycle's index and looks up the
/// rest through `/api/nodes/{id}`, one flight per identifier.
pub struct ChatHydrator {
    source: Arc<dyn FeedSource>,
    flights: SingleFlight<NodeAggregate>,
}

impl ChatHydrator {
    pub fn new(source: Arc<dyn FeedSource>) -> Self {
        Self {
            source,
            flights: SingleFlight::new(),
        }
    }

    /// Node metadata for `node_id`. A failed or empty lookup still yields an
    /// aggregate carrying the identifier and synthesized names.
    pub async fn lookup(&self, node_id: &str) -> NodeAggregate {
        let reference = NodeRef::ById(node_id.trim().to_string());
        let source = Arc::clone(&self.source);
        let flight_ref = reference.clone();
        let result = self
            .flights
            .run(node_id, move || async move {
                let query = FeedQuery::for_node(node_id_of(&flight_ref), None);
                let items = source.fetch(Feed::Nodes, &query).await?;
                let bundle = FeedBundle {
                    nodes: parse_records(&items),
                    per_node: true,
                    ..Default::default()
                };
                Ok(build_node(&flight_ref, &bundle))
            })
            .await;

        match result {
            Ok(node) => node,
            Err(e) => {
                warn!("Sender lookup for {} failed: {}", node_id, e);
                build_node(&reference, &FeedBundle::default())
            }
        }
    }

    pub async fn hydrate(
        &self,
        messages: Vec<MessageRecord>,
        index: &IdentityIndex<NodeAggregate>,
    ) -> Vec<ChatEntry> {
        let mut unknown: Vec<String> = Vec::new();
        for message in &messages {
            if let Some(id) = sender_id(message) {
                if index.resolve_id(id).is_none() && !unknown.iter().any(|u| u == id) {
                    unknown.push(id.to_string());
                }
            }
        }

        let fetched: HashMap<String, NodeAggregate> = join_all(
            unknown
                .iter()
                .map(|id| async move { (normalize_key(id), self.lookup(id).await) }),
        )
        .await
        .into_iter()
        .collect();

        messages
            .into_iter()
            .map(|message| {
                let sender = sender_id(&message).and_then(|id| {
                    index
                        .resolve_id(id)
                        .cloned()
                        .or_else(|| fetched.get(&normalize_key(id)).cloned())
                });
                ChatEntry { message, sender }
            })
            .collect()
    }
}

fn node_id_of(reference: &NodeRef) -> String {
    reference.lookup_id().unwrap_or_default()
}

/// Sender identifier, ignoring broadcast pseudo-addresses.
fn sender_id(message: &MessageRecord) -> Option<&str> {
    message
        .from_id
        .as_deref()
        .or(message.node_id.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty() && !id.starts_with('^'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use serde_json::json;

    fn message(id: i64, from: &str) -> MessageRecord {
        MessageRecord {
            id: Some(id),
            from_id: Some(from.to_string()),
            raw: json!({}),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn known_senders_skip_the_network() {
        let source = Arc::new(MemorySource::new());
        let hydrator = ChatHydrator::new(source.clone());
        let index = IdentityIndex::build(vec![NodeAggregate {
            node_id: Some("!aa".into()),
            long_name: Some("Alpha".into()),
            ..Default::default()
        }]);

        let entries = hydrator.hydrate(vec![message(1, "!aa")], &index).await;
        assert_eq!(
            entries[0].sender.as_ref().and_then(|n| n.long_name.as_deref()),
            Some("Alpha")
        );
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_senders_are_fetched_once() {
        let source = Arc::new(MemorySource::new().with_feed(
            Feed::Nodes,
            vec![json!({"node_id": "!a1b2c3d4", "long_name": "Remote"})],
        ));
        let hydrator = ChatHydrator::new(source.clone());
        let index = IdentityIndex::default();

        let entries = hydrator
            .hydrate(
                vec![message(1, "!a1b2c3d4"), message(2, "!a1b2c3d4"), message(3, "^all")],
                &index,
            )
            .await;
        assert_eq!(source.request_count(Feed::Nodes), 1);
        assert_eq!(
            entries[1].sender.as_ref().and_then(|n| n.long_name.as_deref()),
            Some("Remote")
        );
        assert!(entries[2].sender.is_none());
    }

    #[tokio::test]
    async fn failed_lookup_synthesizes_names() {
        let source = Arc::new(MemorySource::new().failing(Feed::Nodes));
        let hydrator = ChatHydrator::new(source);
        let node = hydrator.lookup("!0badc0de").await;
        assert_eq!(node.short_name.as_deref(), Some("c0de"));
        assert_eq!(node.node_id.as_deref(), Some("!0badc0de"));
    }
}
