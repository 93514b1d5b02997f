//! Draw order for map lines by device role.

use potatomesh_core::builder::DEFAULT_ROLE;

/// Lowest first. Lines from higher-priority roles are drawn later and end up
/// on top.
pub const ROLE_PRIORITY: &[&str] = &[
    "CLIENT_HIDDEN",
    "CLIENT_MUTE",
    "CLIENT",
    "CLIENT_BASE",
    "SENSOR",
    "TRACKER",
    "TAK",
    "TAK_TRACKER",
    "LOST_AND_FOUND",
    "ROUTER_LATE",
    "REPEATER",
    "ROUTER_CLIENT",
    "ROUTER",
];

/// Rank of `role` in [`ROLE_PRIORITY`]. Unknown or missing roles rank as
/// `CLIENT`.
pub fn role_priority(role: Option<&str>) -> usize {
    let normalized = role
        .map(|r| r.trim().to_uppercase())
        .filter(|r| !r.is_empty());
    let lookup = |name: &str| ROLE_PRIORITY.iter().position(|r| *r == name);
    normalized
        .as_deref()
        .and_then(lookup)
        .or_else(|| lookup(DEFAULT_ROLE))
        .unwrap_or(0)
}
