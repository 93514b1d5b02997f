//! Traceroute path stitching.
//!
//! A path only produces a segment between two consecutive hops that both
//! resolve to a placed node. An unresolved or unplaced hop breaks the chain;
//! the hops on either side are never joined directly.

use potatomesh_core::identity::{HopRef, IdentityIndex};
use potatomesh_core::node::{Coordinates, NodeAggregate};
use potatomesh_core::records::TraceRecord;
use serde::{Deserialize, Serialize};

/// A hop after resolution. `node` is `None` when the hop could not be read,
/// is unknown, or has no coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct StitchedHop<'a> {
    pub hop: Option<HopRef>,
    pub node: Option<(&'a NodeAggregate, Coordinates)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSegment {
    pub trace_id: Option<i64>,
    pub from_id: String,
    pub to_id: String,
    pub from: Coordinates,
    pub to: Coordinates,
    pub rx_time: Option<i64>,
}

/// Resolve every hop of `[src, hops…, dest]` against the cycle's index.
pub fn stitch_path<'a>(
    trace: &TraceRecord,
    index: &'a IdentityIndex<NodeAggregate>,
) -> Vec<StitchedHop<'a>> {
    trace
        .path()
        .into_iter()
        .map(|hop| {
            let node = hop
                .as_ref()
                .and_then(|h| index.resolve_hop(h))
                .and_then(|node| node.coordinates().map(|coords| (node, coords)));
            StitchedHop { hop, node }
        })
        .collect()
}

/// Drawable segments of one trace. Consecutive hops that resolve to the
/// same node yield nothing but do not break the chain.
pub fn trace_segments(
    trace: &TraceRecord,
    index: &IdentityIndex<NodeAggregate>,
) -> Vec<TraceSegment> {
    let hops = stitch_path(trace, index);
    hops.windows(2)
        .filter_map(|pair| {
            let (from_node, from) = pair[0].node?;
            let (to_node, to) = pair[1].node?;
            if std::ptr::eq(from_node, to_node) {
                return None;
            }
            Some(TraceSegment {
                trace_id: trace.id,
                from_id: from_node.display_id()?,
                to_id: to_node.display_id()?,
                from,
                to,
                rx_time: trace.rx_time,
            })
        })
        .collect()
}

/// Segments for every trace, in feed order.
pub fn network_segments(
    traces: &[TraceRecord],
    index: &IdentityIndex<NodeAggregate>,
) -> Vec<TraceSegment> {
    traces
        .iter()
        .flat_map(|trace| trace_segments(trace, index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use potatomesh_core::node::PositionBlock;
    use potatomesh_core::records::FeedRecord;
    use serde_json::json;

    fn node(num: u64, coords: Option<(f64, f64)>) -> NodeAggregate {
        NodeAggregate {
            node_num: Some(num),
            position: PositionBlock {
                latitude: coords.map(|c| c.0),
                longitude: coords.map(|c| c.1),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn trace(value: serde_json::Value) -> TraceRecord {
        TraceRecord::from_value(&value).unwrap()
    }

    #[test]
    fn unresolved_middle_hop_yields_no_segments() {
        let index = IdentityIndex::build(vec![node(100, Some((1.0, 1.0))), node(102, Some((3.0, 3.0)))]);
        let segments = trace_segments(&trace(json!({"src": 100, "hops": [101], "dest": 102})), &index);
        assert!(segments.is_empty());
    }

    #[test]
    fn gap_splits_chain_into_pieces() {
        let index = IdentityIndex::build(vec![
            node(1, Some((0.0, 0.0))),
            node(2, Some((0.0, 1.0))),
            node(3, None),
            node(4, Some((0.0, 3.0))),
            node(5, Some((0.0, 4.0))),
        ]);
        let segments = trace_segments(
            &trace(json!({"id": 7, "src": 1, "hops": [2, 3, 4], "dest": 5, "rx_time": 99})),
            &index,
        );
        let pairs: Vec<_> = segments
            .iter()
            .map(|s| (s.from_id.clone(), s.to_id.clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("!00000001".to_string(), "!00000002".to_string()),
                ("!00000004".to_string(), "!00000005".to_string()),
            ]
        );
        assert!(segments.iter().all(|s| s.trace_id == Some(7) && s.rx_time == Some(99)));
    }

    #[test]
    fn string_and_numeric_hops_resolve_alike() {
        let index = IdentityIndex::build(vec![node(0xa, Some((0.0, 0.0))), node(0xb, Some((1.0, 1.0)))]);
        let stitched = stitch_path(&trace(json!({"src": "!0000000a", "dest": 11})), &index);
        assert_eq!(stitched.len(), 2);
        assert!(stitched.iter().all(|h| h.node.is_some()));
        assert_eq!(trace_segments(&trace(json!({"src": "!0000000a", "dest": 11})), &index).len(), 1);
    }

    #[test]
    fn same_node_twice_does_not_draw_a_point_segment() {
        let index = IdentityIndex::build(vec![node(0xa, Some((0.0, 0.0))), node(0xb, Some((1.0, 1.0)))]);
        let segments = trace_segments(&trace(json!({"src": "!0000000a", "hops": [10], "dest": 11})), &index);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].to_id, "!0000000b");
    }
}
