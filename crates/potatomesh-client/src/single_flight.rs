//! At most one in-flight lookup per identifier.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use potatomesh_core::identity::canonical_node_id;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Outcome handed to every caller that joined a flight.
pub type SharedResult<T> = std::result::Result<T, Arc<ClientError>>;

type Flight<T> = Shared<BoxFuture<'static, SharedResult<T>>>;

/// Concurrent callers asking for the same key share one pending operation.
/// The entry is dropped as soon as the operation settles, successful or
/// not, so the next call starts a fresh lookup.
pub struct SingleFlight<T: Clone> {
    inflight: Arc<Mutex<HashMap<String, Flight<T>>>>,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// `!%08x` for anything that looks like a node identifier, otherwise the
/// trimmed input.
pub fn normalize_key(key: &str) -> String {
    canonical_node_id(&Value::String(key.to_string())).unwrap_or_else(|| key.trim().to_string())
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `operation` unless a flight for `key` is already pending, in
    /// which case its result is awaited instead.
    pub async fn run<F, Fut>(&self, key: &str, operation: F) -> SharedResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let key = normalize_key(key);
        let flight = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&key) {
                Some(flight) => {
                    debug!(%key, "Joining in-flight lookup");
                    flight.clone()
                }
                None => {
                    let registry = Arc::clone(&self.inflight);
                    let settle_key = key.clone();
                    let pending = operation();
                    let flight = async move {
                        let result = pending.await.map_err(Arc::new);
                        registry.lock().remove(&settle_key);
                        result
                    }
                    .boxed()
                    .shared();
                    inflight.insert(key, flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    async fn gated(
        flights: &SingleFlight<u32>,
        calls: Arc<AtomicUsize>,
        gate: Arc<Notify>,
    ) -> SharedResult<u32> {
        flights
            .run("!A1B2C3D4", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.notified().await;
                Ok(7)
            })
            .await
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_operation() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let first = gated(&flights, Arc::clone(&calls), Arc::clone(&gate));
        let second = gated(&flights, Arc::clone(&calls), Arc::clone(&gate));
        let release = async {
            tokio::task::yield_now().await;
            gate.notify_one();
        };
        let (a, b, _) = tokio::join!(first, second, release);

        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn failures_are_shared_and_then_forgotten() {
        let flights: SingleFlight<u32> = SingleFlight::new();
        let result = flights
            .run("!aa", || async {
                Err(ClientError::InvalidUrl("boom".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(flights.in_flight(), 0);

        let result = flights.run("!aa", || async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[test]
    fn keys_are_normalized() {
        assert_eq!(normalize_key(" !A1B2C3D4 "), "!a1b2c3d4");
        assert_eq!(normalize_key("2712847316"), "!a1b2c3d4");
        assert_eq!(normalize_key("^all"), "^all");
    }
}
