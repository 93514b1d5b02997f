//! Periodic refresh with lock-free publication of the latest snapshot.

use arc_swap::ArcSwapOption;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::error::Result;
use crate::refresh::{MeshSnapshot, RefreshCycle};

/// Shortest tick the poller accepts; `interval` rejects a zero period.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Readers call [`Poller::current`] at any time and get the last complete
/// snapshot. A failed cycle leaves the previous snapshot in place and records
/// the error.
pub struct Poller {
    cycle: RefreshCycle,
    period: Duration,
    current: ArcSwapOption<MeshSnapshot>,
    last_error: ArcSwapOption<String>,
}

impl Poller {
    pub fn new(cycle: RefreshCycle) -> Self {
        let period = Duration::from_secs(cycle.config().refresh.poll_interval_secs.max(1));
        Self::with_period(cycle, period)
    }

    /// Periods below [`MIN_PERIOD`] are raised to it.
    pub fn with_period(cycle: RefreshCycle, period: Duration) -> Self {
        Self {
            cycle,
            period: period.max(MIN_PERIOD),
            current: ArcSwapOption::empty(),
            last_error: ArcSwapOption::empty(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn current(&self) -> Option<Arc<MeshSnapshot>> {
        self.current.load_full()
    }

    /// Message of the most recent failed cycle, cleared by the next success.
    pub fn last_error(&self) -> Option<Arc<String>> {
        self.last_error.load_full()
    }

    /// Run one cycle and publish its snapshot.
    pub async fn refresh_once(&self) -> Result<Arc<MeshSnapshot>> {
        match self.cycle.run().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.current.store(Some(Arc::clone(&snapshot)));
                self.last_error.store(None);
                Ok(snapshot)
            }
            Err(e) => {
                error!("Refresh cycle failed: {}", e);
                self.last_error.store(Some(Arc::new(e.to_string())));
                Err(e)
            }
        }
    }

    /// Refresh on every tick until `shutdown` resolves. `on_snapshot` sees
    /// each newly published snapshot.
    pub async fn run<S, F>(&self, shutdown: S, mut on_snapshot: F)
    where
        S: Future<Output = ()>,
        F: FnMut(Arc<MeshSnapshot>),
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Ok(snapshot) = self.refresh_once().await {
                        on_snapshot(snapshot);
                    }
                }
            }
        }
    }

    /// Drive the poller on the runtime until `shutdown` resolves.
    pub fn spawn<S>(self: Arc<Self>, shutdown: S) -> JoinHandle<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move { self.run(shutdown, |_| {}).await })
    }
}
