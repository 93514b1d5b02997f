//! Display names for nodes that never announced one.

use crate::node::NodeAggregate;

pub const LONG_NAME_PREFIX: &str = "Meshtastic";

fn is_blank(name: Option<&str>) -> bool {
    name.map_or(true, |n| n.trim().is_empty())
}

/// Last four characters of the identifier.
pub fn fallback_short_name(node_id: &str) -> String {
    let chars: Vec<char> = node_id.trim().chars().collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}

pub fn fallback_long_name(node_id: &str) -> String {
    format!("{} {}", LONG_NAME_PREFIX, node_id.trim())
}

/// Fill both names from the node's identifier when neither is usable.
///
/// Returns `true` when names were synthesized. Nodes that carry only a
/// number use its `!%08x` form.
pub fn synthesize_names(node: &mut NodeAggregate) -> bool {
    if !is_blank(node.short_name.as_deref()) || !is_blank(node.long_name.as_deref()) {
        return false;
    }
    let Some(id) = node.display_id().filter(|id| !id.trim().is_empty()) else {
        return false;
    };
    node.short_name = Some(fallback_short_name(&id));
    node.long_name = Some(fallback_long_name(&id));
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesizes_from_string_id() {
        let mut node = NodeAggregate {
            node_id: Some("!a1b2c3d4".into()),
            short_name: Some("   ".into()),
            ..Default::default()
        };
        assert!(synthesize_names(&mut node));
        assert_eq!(node.short_name.as_deref(), Some("c3d4"));
        let long = node.long_name.clone().unwrap();
        assert!(long.contains("!a1b2c3d4"));

        let exported = node.to_export_json();
        assert_eq!(exported["shortName"], "c3d4");
        assert_eq!(exported["longName"], exported["long_name"]);
    }

    #[test]
    fn keeps_existing_names() {
        let mut node = NodeAggregate {
            node_id: Some("!a1b2c3d4".into()),
            long_name: Some("Base Station".into()),
            ..Default::default()
        };
        assert!(!synthesize_names(&mut node));
        assert!(node.short_name.is_none());
    }

    #[test]
    fn numeric_only_nodes_use_hex_form() {
        let mut node = NodeAggregate {
            node_num: Some(2712847316),
            ..Default::default()
        };
        assert!(synthesize_names(&mut node));
        assert_eq!(node.short_name.as_deref(), Some("c3d4"));
        assert_eq!(node.long_name.as_deref(), Some("Meshtastic !a1b2c3d4"));
    }

    #[test]
    fn nothing_to_synthesize_without_identity() {
        let mut node = NodeAggregate::default();
        assert!(!synthesize_names(&mut node));
        assert!(node.short_name.is_none());
    }

    #[test]
    fn short_ids_are_used_whole() {
        assert_eq!(fallback_short_name("!ab"), "!ab");
    }
}
