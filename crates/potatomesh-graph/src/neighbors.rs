//! Two resolvers over the same neighbor feed.
//!
//! [`best_links`] feeds tables and overlays: one link per `(node, neighbor)`
//! with the strongest SNR and latest `rx_time` ever seen for it.
//! [`map_lines`] feeds the map: one line per direction, taken from the first
//! edge in feed order. The two intentionally disagree when a pair was
//! observed more than once.

use potatomesh_core::identity::{canonical_id_from_num, canonical_node_id, IdentityIndex};
use potatomesh_core::node::{Coordinates, NodeAggregate};
use potatomesh_core::records::NeighborEdge;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::roles::role_priority;

/// Aggregated `node heard neighbor` relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborLink {
    pub node_id: String,
    pub neighbor_id: String,
    pub snr: Option<f64>,
    pub rx_time: Option<i64>,
    pub rx_iso: Option<String>,
    /// Number of edges folded into this link
    pub observations: usize,
}

/// One drawable neighbor line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLine {
    pub source_id: String,
    pub target_id: String,
    pub source: Coordinates,
    pub target: Coordinates,
    pub snr: Option<f64>,
    pub rx_time: Option<i64>,
    /// Role of the reporting node, used for draw order
    pub role: Option<String>,
}

/// `!`/`0x` IDs and numeric-only endpoints collapse to `!%08x`; other labels
/// are kept as given after trimming.
fn endpoint(id: &Option<String>, num: Option<u64>) -> Option<String> {
    match id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) if id.starts_with('!') || id.starts_with("0x") || id.starts_with("0X") => {
            Some(canonical_node_id(&Value::from(id)).unwrap_or_else(|| id.to_string()))
        }
        Some(id) => Some(id.to_string()),
        None => num.map(canonical_id_from_num),
    }
}

fn endpoints(edge: &NeighborEdge) -> Option<(String, String)> {
    Some((
        endpoint(&edge.node_id, edge.node_num)?,
        endpoint(&edge.neighbor_id, edge.neighbor_num)?,
    ))
}

fn max_f64(current: Option<f64>, candidate: Option<f64>) -> Option<f64> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Max SNR and max `rx_time` per `(node, neighbor)`, in first-seen order.
/// Both maxima are taken independently and may come from different edges.
pub fn best_links(edges: &[NeighborEdge]) -> Vec<NeighborLink> {
    let mut slots: HashMap<(String, String), usize> = HashMap::new();
    let mut links: Vec<NeighborLink> = Vec::new();

    for edge in edges {
        let Some((node_id, neighbor_id)) = endpoints(edge) else {
            continue;
        };
        match slots.get(&(node_id.clone(), neighbor_id.clone())) {
            Some(&slot) => {
                let link = &mut links[slot];
                link.snr = max_f64(link.snr, edge.snr);
                if edge.rx_time > link.rx_time {
                    link.rx_time = edge.rx_time;
                    link.rx_iso = edge.rx_iso.clone();
                }
                link.observations += 1;
            }
            None => {
                slots.insert((node_id.clone(), neighbor_id.clone()), links.len());
                links.push(NeighborLink {
                    node_id,
                    neighbor_id,
                    snr: edge.snr,
                    rx_time: edge.rx_time,
                    rx_iso: edge.rx_iso.clone(),
                    observations: 1,
                });
            }
        }
    }

    links
}

/// [`best_links`] restricted to edges touching the node with grouping key
/// `key`.
pub fn best_links_for(edges: &[NeighborEdge], key: &str) -> Vec<NeighborLink> {
    let touching: Vec<NeighborEdge> = edges
        .iter()
        .filter(|edge| edge.involves(key))
        .cloned()
        .collect();
    best_links(&touching)
}

fn located<'a>(
    index: &'a IdentityIndex<NodeAggregate>,
    endpoint: &str,
    num: Option<u64>,
) -> Option<(&'a NodeAggregate, Coordinates)> {
    let node = index.resolve_parts(Some(endpoint), num)?;
    node.coordinates().map(|coords| (node, coords))
}

/// One line per direction `source→target`, from the first edge in input
/// order. Later edges for the same direction are discarded even if they are
/// stronger or newer. Lines whose endpoints do not both resolve to a node
/// with coordinates are dropped.
pub fn map_lines(edges: &[NeighborEdge], index: &IdentityIndex<NodeAggregate>) -> Vec<MapLine> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut lines = Vec::new();

    for edge in edges {
        let Some((source_id, target_id)) = endpoints(edge) else {
            continue;
        };
        if !seen.insert(format!("{}→{}", source_id, target_id)) {
            continue;
        }
        let (Some((source_node, source)), Some((_, target))) = (
            located(index, &source_id, edge.node_num),
            located(index, &target_id, edge.neighbor_num),
        ) else {
            debug!("Skipping map line {}→{}: endpoint not placeable", source_id, target_id);
            continue;
        };
        lines.push(MapLine {
            source_id,
            target_id,
            source,
            target,
            snr: edge.snr,
            rx_time: edge.rx_time,
            role: source_node.role.clone(),
        });
    }

    lines
}

/// Draw order: role priority ascending, then `rx_time` descending, then
/// source and target IDs.
pub fn sort_map_lines(lines: &mut [MapLine]) {
    lines.sort_by(|a, b| {
        role_priority(a.role.as_deref())
            .cmp(&role_priority(b.role.as_deref()))
            .then_with(|| b.rx_time.cmp(&a.rx_time))
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.target_id.cmp(&b.target_id))
    });
}

/// Strongest-first ordering for link tables. Missing SNR sorts last.
pub fn sort_links_by_snr(links: &mut [NeighborLink]) {
    links.sort_by(|a, b| match (a.snr, b.snr) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use potatomesh_core::node::PositionBlock;
    use serde_json::json;

    fn edge(node: &str, neighbor: &str, snr: f64, rx_time: i64) -> NeighborEdge {
        NeighborEdge {
            node_id: Some(node.to_string()),
            neighbor_id: Some(neighbor.to_string()),
            snr: Some(snr),
            rx_time: Some(rx_time),
            raw: json!({}),
            ..Default::default()
        }
    }

    fn placed(id: &str, role: &str, lat: f64) -> NodeAggregate {
        NodeAggregate {
            node_id: Some(id.to_string()),
            role: Some(role.to_string()),
            position: PositionBlock {
                latitude: Some(lat),
                longitude: Some(0.0),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn best_link_takes_independent_maxima() {
        let edges = vec![edge("A", "B", 9.0, 10), edge("A", "B", 5.0, 20), edge("B", "A", 1.0, 5)];
        let links = best_links(&edges);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].snr, Some(9.0));
        assert_eq!(links[0].rx_time, Some(20));
        assert_eq!(links[0].observations, 2);
        assert_eq!(links[1].node_id, "B");
    }

    #[test]
    fn map_lines_keep_direction_and_need_coordinates() {
        let index = IdentityIndex::build(vec![
            placed("A", "CLIENT", 1.0),
            placed("B", "ROUTER", 2.0),
            NodeAggregate {
                node_id: Some("C".into()),
                ..Default::default()
            },
        ]);
        let edges = vec![
            edge("A", "B", 1.0, 1),
            edge("B", "A", 2.0, 2),
            edge("A", "C", 3.0, 3),
            edge("A", "Z", 4.0, 4),
        ];
        let lines = map_lines(&edges, &index);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].source_id, "A");
        assert_eq!(lines[1].source_id, "B");
        assert_eq!(lines[1].source.latitude, 2.0);
    }

    #[test]
    fn map_lines_sort_by_role_then_recency_then_ids() {
        let line = |source: &str, target: &str, role: &str, rx: i64| MapLine {
            source_id: source.into(),
            target_id: target.into(),
            source: Coordinates { latitude: 0.0, longitude: 0.0 },
            target: Coordinates { latitude: 0.0, longitude: 0.0 },
            snr: None,
            rx_time: Some(rx),
            role: Some(role.into()),
        };
        let mut lines = vec![
            line("R", "X", "ROUTER", 1),
            line("B", "X", "CLIENT", 5),
            line("A", "Y", "CLIENT", 5),
            line("A", "X", "CLIENT", 5),
            line("C", "X", "CLIENT", 9),
        ];
        sort_map_lines(&mut lines);
        let order: Vec<_> = lines
            .iter()
            .map(|l| format!("{}{}", l.source_id, l.target_id))
            .collect();
        assert_eq!(order, vec!["CX", "AX", "AY", "BX", "RX"]);
    }

    #[test]
    fn numeric_only_edges_use_hex_ids() {
        let edges = vec![NeighborEdge {
            node_num: Some(0xaa),
            neighbor_num: Some(0xbb),
            ..Default::default()
        }];
        let links = best_links(&edges);
        assert_eq!(links[0].node_id, "!000000aa");
        assert_eq!(links[0].neighbor_id, "!000000bb");
    }

    #[test]
    fn links_sort_strongest_first() {
        let mut links = best_links(&[edge("A", "B", 1.0, 1), edge("A", "C", 7.0, 1)]);
        links.push(NeighborLink {
            node_id: "A".into(),
            neighbor_id: "D".into(),
            snr: None,
            rx_time: None,
            rx_iso: None,
            observations: 1,
        });
        sort_links_by_snr(&mut links);
        assert_eq!(links[0].neighbor_id, "C");
        assert_eq!(links[2].neighbor_id, "D");
    }

    #[test]
    fn mixed_id_num_and_case_edges_share_one_direction() {
        let by_id = |node: &str, neighbor: &str, rx: i64| NeighborEdge {
            node_id: Some(node.to_string()),
            neighbor_id: Some(neighbor.to_string()),
            rx_time: Some(rx),
            ..Default::default()
        };
        let edges = vec![
            by_id("!000000aa", "!000000bb", 1),
            NeighborEdge {
                node_num: Some(170),
                neighbor_num: Some(187),
                rx_time: Some(2),
                ..Default::default()
            },
            by_id(" !000000AA", "!000000BB", 3),
        ];

        let links = best_links(&edges);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].node_id, "!000000aa");
        assert_eq!(links[0].neighbor_id, "!000000bb");
        assert_eq!(links[0].observations, 3);
        assert_eq!(links[0].rx_time, Some(3));

        let index = IdentityIndex::build(vec![
            placed("!000000aa", "CLIENT", 1.0),
            placed("!000000bb", "ROUTER", 2.0),
        ]);
        let lines = map_lines(&edges, &index);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].rx_time, Some(1));
    }
}
