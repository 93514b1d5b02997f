//! Dual-keyed node identity: canonical string IDs (`!a1b2c3d4`) and legacy
//! numeric IDs (`2712847316`).

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::alias;
use crate::coerce;
use crate::error::{MeshError, Result};
use crate::node::NodeAggregate;
use crate::records::{FeedRecord, NodeRecord};

const NODE_NUM_MASK: u64 = 0xFFFF_FFFF;

/// `!%08x` form of a node number.
pub fn canonical_id_from_num(num: u64) -> String {
    format!("!{:08x}", num & NODE_NUM_MASK)
}

/// Normalize any node reference the ingestors emit into `!%08x`.
///
/// Broadcast addresses (`^all`) pass through unchanged.
pub fn canonical_node_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(_) => coerce::unsigned(value).map(canonical_id_from_num),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed.starts_with('^') {
                return Some(trimmed.to_string());
            }
            let body = if let Some(rest) = trimmed.strip_prefix('!') {
                rest
            } else if let Some(rest) = trimmed
                .strip_prefix("0x")
                .or_else(|| trimmed.strip_prefix("0X"))
            {
                rest
            } else if trimmed.chars().all(|c| c.is_ascii_digit()) {
                return trimmed.parse::<u64>().ok().map(canonical_id_from_num);
            } else {
                trimmed
            };
            if body.is_empty() {
                return None;
            }
            u64::from_str_radix(body, 16)
                .ok()
                .map(canonical_id_from_num)
        }
        _ => None,
    }
}

/// Inverse of [`canonical_id_from_num`]; tolerates a `0x` prefix.
///
/// The body is always read as hex, like the ingestor does: an all-digit
/// input such as `"170"` yields `0x170`, not 170.
pub fn node_num_from_id(node_id: &str) -> Option<u64> {
    let mut trimmed = node_id.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed = trimmed.strip_prefix('!').unwrap_or(trimmed);
    trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u64::from_str_radix(trimmed, 16).ok()
}

/// Grouping key for snapshot aggregation.
///
/// Uppercased on purpose: grouping must be stable across feeds that disagree
/// on hex casing. General lookups through [`IdentityIndex`] stay
/// case-sensitive.
pub fn snapshot_key(node_id: Option<&str>, node_num: Option<u64>) -> Option<String> {
    node_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_uppercase)
        .or_else(|| node_num.map(|num| canonical_id_from_num(num).to_uppercase()))
}

/// Anything that can be indexed by string ID and/or node number.
pub trait Identified {
    fn node_id(&self) -> Option<&str>;
    fn node_num(&self) -> Option<u64>;
}

impl Identified for NodeAggregate {
    fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    fn node_num(&self) -> Option<u64> {
        self.node_num
    }
}

impl Identified for NodeRecord {
    fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    fn node_num(&self) -> Option<u64> {
        self.node_num
    }
}

/// Reference carrying its own identifiers plus an optional fallback record
/// to seed the aggregate before any feed data arrives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FallbackRef {
    pub node_id: Option<String>,
    pub node_num: Option<u64>,
    pub fallback: Option<NodeRecord>,
}

/// How a caller asks for a node. Parsed once at the entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRef {
    ById(String),
    ByNum(u64),
    WithFallback(FallbackRef),
}

impl NodeRef {
    /// Parse a duck-typed reference: a string ID, a node number, or an
    /// object `{node_id?, node_num?, fallback?}`.
    ///
    /// An empty identifier or an object with neither identifier is a caller
    /// bug and fails immediately. A malformed `fallback` is only logged.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Self::from_str(s),
            Value::Number(_) => coerce::unsigned(value).map(NodeRef::ByNum).ok_or_else(|| {
                MeshError::InvalidReference(format!("node number out of range: {}", value))
            }),
            Value::Object(raw) => {
                if let Some(Value::String(s)) = raw.get("node_id").or_else(|| raw.get("nodeId")) {
                    if s.trim().is_empty() {
                        return Err(MeshError::InvalidReference(
                            "empty node identifier".to_string(),
                        ));
                    }
                }
                let map = alias::canonicalize(raw);
                let node_id = coerce::string_field(&map, "node_id")
                    .or_else(|| coerce::string_field(&map, "id"));
                let node_num = coerce::unsigned_field(&map, "node_num");
                if node_id.is_none() && node_num.is_none() {
                    return Err(MeshError::InvalidReference(
                        "reference carries neither an identifier nor a node number".to_string(),
                    ));
                }
                let fallback = map.get("fallback").and_then(parse_fallback);
                Ok(NodeRef::WithFallback(FallbackRef {
                    node_id,
                    node_num,
                    fallback,
                }))
            }
            other => Err(MeshError::InvalidReference(format!(
                "unsupported reference type: {}",
                other
            ))),
        }
    }

    /// Attach a fallback payload, keeping the identifiers already known.
    pub fn with_fallback(self, fallback: Option<&Value>) -> Self {
        let fallback = fallback.and_then(parse_fallback);
        if fallback.is_none() {
            return self;
        }
        NodeRef::WithFallback(FallbackRef {
            node_id: self.node_id().map(str::to_string),
            node_num: self.node_num(),
            fallback,
        })
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            NodeRef::ById(id) => Some(id.as_str()),
            NodeRef::ByNum(_) => None,
            NodeRef::WithFallback(r) => r.node_id.as_deref(),
        }
    }

    pub fn node_num(&self) -> Option<u64> {
        match self {
            NodeRef::ById(_) => None,
            NodeRef::ByNum(num) => Some(*num),
            NodeRef::WithFallback(r) => r.node_num,
        }
    }

    pub fn fallback(&self) -> Option<&NodeRecord> {
        match self {
            NodeRef::WithFallback(r) => r.fallback.as_ref(),
            _ => None,
        }
    }

    /// Identifier used for per-node endpoints and single-flight keys.
    pub fn lookup_id(&self) -> Option<String> {
        self.node_id()
            .map(str::to_string)
            .or_else(|| self.node_num().map(canonical_id_from_num))
    }

    pub fn snapshot_key(&self) -> Option<String> {
        snapshot_key(self.node_id(), self.node_num())
    }
}

impl FromStr for NodeRef {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(MeshError::InvalidReference(
                "empty node identifier".to_string(),
            ));
        }
        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(num) = trimmed.parse::<u64>() {
                return Ok(NodeRef::ByNum(num));
            }
        }
        Ok(NodeRef::ById(trimmed.to_string()))
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.lookup_id() {
            Some(id) => write!(f, "{}", id),
            None => write!(f, "<unidentified>"),
        }
    }
}

fn parse_fallback(value: &Value) -> Option<NodeRecord> {
    match value {
        Value::Object(_) => NodeRecord::from_value(value),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(parsed) => NodeRecord::from_value(&parsed),
            Err(err) => {
                warn!("Ignoring malformed fallback payload: {}", err);
                None
            }
        },
        Value::Null => None,
        other => {
            warn!("Ignoring fallback payload of unexpected type: {}", other);
            None
        }
    }
}

/// One hop in a traceroute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HopRef {
    Id(String),
    Num(u64),
}

impl HopRef {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(_) => coerce::unsigned(value).map(HopRef::Num),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else if trimmed.chars().all(|c| c.is_ascii_digit()) {
                    trimmed.parse::<u64>().ok().map(HopRef::Num)
                } else {
                    Some(HopRef::Id(trimmed.to_string()))
                }
            }
            _ => None,
        }
    }
}

/// Immutable per-cycle lookup table over a set of entities.
///
/// The first entity registered under a key owns it. Entities with no usable
/// identifier are kept in `entries` but are never resolvable.
#[derive(Debug, Clone)]
pub struct IdentityIndex<T> {
    entries: Vec<T>,
    by_id: HashMap<String, usize>,
    by_num: HashMap<u64, usize>,
}

impl<T> Default for IdentityIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            by_id: HashMap::new(),
            by_num: HashMap::new(),
        }
    }
}

impl<T: Identified> IdentityIndex<T> {
    pub fn build(entities: impl IntoIterator<Item = T>) -> Self {
        let mut index = Self::default();
        for entity in entities {
            let slot = index.entries.len();
            let explicit_id = entity
                .node_id()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            let num = entity.node_num().or_else(|| {
                explicit_id
                    .as_deref()
                    .filter(|id| id.starts_with('!'))
                    .and_then(node_num_from_id)
            });
            let id = explicit_id.or_else(|| num.map(canonical_id_from_num));

            if id.is_none() && num.is_none() {
                debug!("Indexing entity without identifiers at slot {}", slot);
            }
            if let Some(id) = id {
                index.by_id.entry(id).or_insert(slot);
            }
            if let Some(num) = num {
                index.by_num.entry(num).or_insert(slot);
            }
            index.entries.push(entity);
        }
        index
    }

    /// String ID first, then node number.
    pub fn resolve(&self, reference: &NodeRef) -> Option<&T> {
        self.resolve_parts(reference.node_id(), reference.node_num())
    }

    pub fn resolve_parts(&self, node_id: Option<&str>, node_num: Option<u64>) -> Option<&T> {
        node_id
            .and_then(|id| self.resolve_id(id))
            .or_else(|| node_num.and_then(|num| self.resolve_num(num)))
    }

    /// Case-sensitive after trimming.
    pub fn resolve_id(&self, node_id: &str) -> Option<&T> {
        self.by_id
            .get(node_id.trim())
            .and_then(|slot| self.entries.get(*slot))
    }

    pub fn resolve_num(&self, node_num: u64) -> Option<&T> {
        self.by_num
            .get(&node_num)
            .and_then(|slot| self.entries.get(*slot))
    }

    pub fn resolve_hop(&self, hop: &HopRef) -> Option<&T> {
        match hop {
            HopRef::Id(id) => self.resolve_id(id),
            HopRef::Num(num) => self.resolve_num(*num),
        }
    }
}

impl<T> IdentityIndex<T> {
    pub fn entries(&self) -> &[T] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<T> {
        self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
