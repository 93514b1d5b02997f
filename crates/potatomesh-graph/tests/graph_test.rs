use potatomesh_core::{FeedBundle, IdentityIndex, NeighborEdge, TraceRecord};
use potatomesh_core::{build_network, parse_records};
use potatomesh_graph::{best_links, map_lines, network_segments, sort_map_lines};
use serde_json::json;

#[test]
fn test_neighbor_resolvers_disagree_on_repeated_pairs() {
    let edges = NeighborEdge::from_feed(&[
        json!({"node_id": "A", "neighbor_id": "B", "snr": 5, "rx_time": 10}),
        json!({"node_id": "A", "neighbor_id": "B", "snr": 9, "rx_time": 20}),
    ]);

    let links = best_links(&edges);
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].snr, Some(9.0));
    assert_eq!(links[0].rx_time, Some(20));

    let feeds = FeedBundle::from_values(
        &[
            json!({"node_id": "A", "latitude": 1.0, "longitude": 1.0, "position_time": 1}),
            json!({"node_id": "B", "latitude": 2.0, "longitude": 2.0, "position_time": 1}),
        ],
        &[],
        &[],
        &[],
        &[],
    );
    let index = IdentityIndex::build(build_network(&feeds));
    let lines = map_lines(&edges, &index);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].snr, Some(5.0));
    assert_eq!(lines[0].rx_time, Some(10));
}

#[test]
fn test_trace_with_unknown_hop_draws_nothing() {
    let feeds = FeedBundle::from_values(
        &[
            json!({"node_num": 100, "lat": 1.0, "lon": 1.0, "position_time": 1}),
            json!({"node_num": 102, "lat": 2.0, "lon": 2.0, "position_time": 1}),
        ],
        &[],
        &[],
        &[],
        &[],
    );
    let index = IdentityIndex::build(build_network(&feeds));
    let traces: Vec<TraceRecord> = parse_records(&[json!({"hops": [100, 101, 102]})]);
    assert!(network_segments(&traces, &index).is_empty());
}

#[test]
fn test_map_lines_draw_routers_last() {
    let feeds = FeedBundle::from_values(
        &[
            json!({"node_id": "R", "role": "ROUTER", "latitude": 0.0, "longitude": 0.0, "position_time": 1}),
            json!({"node_id": "C", "latitude": 1.0, "longitude": 1.0, "position_time": 1}),
        ],
        &[],
        &[],
        &[],
        &[],
    );
    let index = IdentityIndex::build(build_network(&feeds));
    let edges = NeighborEdge::from_feed(&[
        json!({"node_id": "R", "neighbor_id": "C", "rx_time": 1}),
        json!({"node_id": "C", "neighbor_id": "R", "rx_time": 2}),
    ]);
    let mut lines = map_lines(&edges, &index);
    sort_map_lines(&mut lines);
    assert_eq!(lines[0].source_id, "C");
    assert_eq!(lines[1].source_id, "R");
}
