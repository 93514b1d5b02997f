//! The seam between reconciliation and transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{ClientError, Result};

/// A read-only collection endpoint of the PotatoMesh API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feed {
    Nodes,
    Telemetry,
    Positions,
    Neighbors,
    Traces,
    Messages,
}

impl Feed {
    pub const ALL: [Feed; 6] = [
        Feed::Nodes,
        Feed::Telemetry,
        Feed::Positions,
        Feed::Neighbors,
        Feed::Traces,
        Feed::Messages,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Feed::Nodes => "nodes",
            Feed::Telemetry => "telemetry",
            Feed::Positions => "positions",
            Feed::Neighbors => "neighbors",
            Feed::Traces => "traces",
            Feed::Messages => "messages",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Parameters of one feed request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FeedQuery {
    /// Per-node endpoint (`/api/<feed>/<id>`) when set
    pub node_id: Option<String>,
    pub limit: Option<usize>,
    /// `history=1`, node list only
    pub history: bool,
    /// Include encrypted payloads
    pub encrypted: bool,
}

impl FeedQuery {
    pub fn list(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn for_node(node_id: impl Into<String>, limit: Option<usize>) -> Self {
        Self {
            node_id: Some(node_id.into()),
            limit,
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }
}

/// Anything that can answer feed requests with raw JSON items.
///
/// "No data" (HTTP 404) is an empty list, never an error.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, feed: Feed, query: &FeedQuery) -> Result<Vec<Value>>;
}

/// In-memory feed source serving canned payloads.
///
/// Per-node queries are answered by filtering list items whose `node_id`
/// (or `from_id`) equals the requested identifier. Feeds marked as failing
/// return an error. Every request is recorded.
#[derive(Debug, Default)]
pub struct MemorySource {
    feeds: HashMap<Feed, Vec<Value>>,
    failing: HashSet<Feed>,
    requests: Mutex<Vec<(Feed, FeedQuery)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(mut self, feed: Feed, items: Vec<Value>) -> Self {
        self.feeds.insert(feed, items);
        self
    }

    pub fn failing(mut self, feed: Feed) -> Self {
        self.failing.insert(feed);
        self
    }

    pub fn requests(&self) -> Vec<(Feed, FeedQuery)> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, feed: Feed) -> usize {
        self.requests.lock().iter().filter(|(f, _)| *f == feed).count()
    }
}

fn item_mentions(item: &Value, node_id: &str) -> bool {
    ["node_id", "nodeId", "from_id", "fromId"]
        .iter()
        .any(|key| item.get(*key).and_then(Value::as_str) == Some(node_id))
}

#[async_trait]
impl FeedSource for MemorySource {
    async fn fetch(&self, feed: Feed, query: &FeedQuery) -> Result<Vec<Value>> {
        self.requests.lock().push((feed, query.clone()));
        if self.failing.contains(&feed) {
            return Err(ClientError::Status {
                url: format!("memory://{}", feed),
                status: StatusCode::SERVICE_UNAVAILABLE,
            });
        }
        let items = self.feeds.get(&feed).cloned().unwrap_or_default();
        let mut items: Vec<Value> = match &query.node_id {
            Some(id) => items.into_iter().filter(|item| item_mentions(item, id)).collect(),
            None => items,
        };
        if let Some(limit) = query.limit {
            items.truncate(limit);
        }
        Ok(items)
    }
}
