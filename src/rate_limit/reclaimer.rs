use super::clock::Clock;
use super::store::WindowStore;
use crate::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Periodically evicts window records that have been expired for longer than
/// the staleness horizon, bounding memory to recently active clients.
#[derive(Clone)]
pub struct Reclaimer {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    stale_after: Duration,
    interval: Duration,
}

impl Reclaimer {
    pub fn new(
        store: Arc<dyn WindowStore>,
        clock: Arc<dyn Clock>,
        stale_after: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            stale_after,
            interval,
        }
    }

    /// Remove every record whose reset time is older than the staleness horizon
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_millis();
        let horizon = now.saturating_sub(self.stale_after.as_millis() as u64);

        let removed = self
            .store
            .retain(&mut |_, record| record.reset_at_ms >= horizon);
        let remaining = self.store.len();

        metrics::record_reclaimed(removed, remaining);

        if removed > 0 {
            info!(removed, remaining, "Reclaimed stale rate limit records");
        } else {
            debug!(remaining, "Reclaimer sweep found nothing stale");
        }

        removed
    }

    /// Run `sweep` on a fixed interval in a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                interval_secs = self.interval.as_secs(),
                stale_after_secs = self.stale_after.as_secs(),
                "Started rate limit reclaimer"
            );

            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}
