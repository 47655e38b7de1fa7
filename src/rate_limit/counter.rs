use super::clock::{Clock, SystemClock};
use super::store::{InMemoryWindowStore, StoreKey, WindowStore};
use super::types::{Decision, PolicyEntry, WindowRecord};
use std::sync::Arc;
use tracing::{debug, trace};

/// Fixed-window request counter over a [`WindowStore`].
///
/// Each (client key, path) pair gets one window. When the clock passes the
/// window's reset time the next request opens a fresh, full-size window, so
/// up to twice the limit can pass around a window boundary.
#[derive(Clone)]
pub struct WindowCounter {
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
}

impl WindowCounter {
    pub fn new(store: Arc<dyn WindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// In-memory store with the system clock
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryWindowStore::new()), Arc::new(SystemClock))
    }

    pub fn store(&self) -> &Arc<dyn WindowStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Count a request against `policy` and decide whether it may proceed
    pub fn check_and_increment(&self, key: &StoreKey, policy: PolicyEntry) -> Decision {
        let now = self.clock.now_millis();
        let mut record = WindowRecord::open(now, policy.window_secs);
        let mut allowed = false;

        self.store.update(key, &mut |slot| {
            let current = slot.get_or_insert_with(|| WindowRecord::open(now, policy.window_secs));

            if current.is_expired(now) {
                trace!(key = %key, "Window expired, opening a fresh one");
                *current = WindowRecord::open(now, policy.window_secs);
            }

            allowed = current.count < policy.limit;
            if allowed {
                current.count += 1;
            }
            record = *current;
        });

        let remaining = policy.limit.saturating_sub(record.count);
        let retry_after_secs = if allowed {
            0
        } else {
            record.reset_at_ms.saturating_sub(now).div_ceil(1000)
        };

        debug!(
            key = %key,
            allowed,
            count = record.count,
            limit = policy.limit,
            remaining,
            "Window counter checked"
        );

        Decision {
            allowed,
            limit: policy.limit,
            remaining,
            reset_at_ms: record.reset_at_ms,
            retry_after_secs,
        }
    }

    /// Refund one request counted in the window identified by `window_reset_at_ms`.
    ///
    /// No-op when the record is gone, already at zero, or belongs to a newer
    /// window. Returns whether a refund happened.
    pub fn decrement(&self, key: &StoreKey, window_reset_at_ms: u64) -> bool {
        let mut refunded = false;

        self.store.update(key, &mut |slot| {
            if let Some(record) = slot.as_mut() {
                if record.reset_at_ms == window_reset_at_ms && record.count > 0 {
                    record.count -= 1;
                    refunded = true;
                }
            }
        });

        if !refunded {
            debug!(key = %key, "Decrement skipped, window no longer current");
        }

        refunded
    }

    /// Current record for a key, if any
    pub fn record(&self, key: &StoreKey) -> Option<WindowRecord> {
        self.store.get(key)
    }

    /// Drop the record for a key
    pub fn reset(&self, key: &StoreKey) {
        self.store.delete(key);
    }

    /// Number of tracked records
    pub fn active_records(&self) -> usize {
        self.store.len()
    }
}
