//! Logical cancellation for results that arrive after the caller moved on.
//!
//! Each UI anchor (a detail panel, an overlay, a chat pane) owns a counter.
//! Starting a request bumps it and hands back a token; a late result is
//! applied only if its token is still the anchor's current one.

use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestToken {
    anchor: String,
    generation: u64,
}

impl RequestToken {
    pub fn anchor(&self) -> &str {
        &self.anchor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
pub struct RequestGenerations {
    current: DashMap<String, u64>,
}

impl RequestGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request for `anchor`, superseding any earlier one.
    pub fn begin(&self, anchor: &str) -> RequestToken {
        let mut entry = self.current.entry(anchor.to_string()).or_insert(0);
        *entry += 1;
        RequestToken {
            anchor: anchor.to_string(),
            generation: *entry,
        }
    }

    pub fn is_current(&self, token: &RequestToken) -> bool {
        self.current
            .get(&token.anchor)
            .map_or(false, |generation| *generation == token.generation)
    }

    /// Hand `value` to `apply` only while `token` is current. Returns whether
    /// it was applied.
    pub fn apply<T, F>(&self, token: &RequestToken, value: T, apply: F) -> bool
    where
        F: FnOnce(T),
    {
        if !self.is_current(token) {
            debug!(
                anchor = %token.anchor,
                generation = token.generation,
                "Discarding stale result"
            );
            return false;
        }
        apply(value);
        true
    }

    /// Make every outstanding token for `anchor` stale.
    pub fn invalidate(&self, anchor: &str) {
        if let Some(mut generation) = self.current.get_mut(anchor) {
            *generation += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_request_supersedes_older() {
        let generations = RequestGenerations::new();
        let first = generations.begin("detail");
        let second = generations.begin("detail");
        assert!(!generations.is_current(&first));
        assert!(generations.is_current(&second));

        let mut applied = Vec::new();
        assert!(!generations.apply(&first, 1, |v| applied.push(v)));
        assert!(generations.apply(&second, 2, |v| applied.push(v)));
        assert_eq!(applied, vec![2]);
    }

    #[test]
    fn anchors_are_independent() {
        let generations = RequestGenerations::new();
        let map = generations.begin("map");
        let _chat = generations.begin("chat");
        assert!(generations.is_current(&map));

        generations.invalidate("map");
        assert!(!generations.is_current(&map));
    }
}
